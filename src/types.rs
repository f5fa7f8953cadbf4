use crate::agent::VoiceAgent;
use crate::config::Config;
use crate::ledger::{Ledger, OrderStatus};
use crate::places::PlaceSearch;
use crate::telephony::Telephony;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub ledger: Ledger,
    pub telephony: Arc<dyn Telephony>,
    pub places: Arc<dyn PlaceSearch>,
    pub agent: Arc<dyn VoiceAgent>,
}

/// Who we are calling.  Set once per order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Restaurant {
    pub name: String,
    pub address: String,
    /// E.164
    pub phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
}

fn default_payment_method() -> String {
    "cash".to_string()
}

fn default_customer_name() -> String {
    "Alex".to_string()
}

fn default_order_type() -> String {
    "pickup".to_string()
}

fn default_special_instructions() -> String {
    "None".to_string()
}

/// Body of `POST /start-order`.
#[derive(Clone, Debug, Deserialize)]
pub struct OrderRequest {
    #[serde(default)]
    pub restaurant_query: String,
    #[serde(default)]
    pub order_items: String,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    #[serde(default = "default_customer_name")]
    pub customer_name: String,
    #[serde(default = "default_order_type")]
    pub order_type: String,
    #[serde(default)]
    pub delivery_address: String,
    #[serde(default)]
    pub phone_override: String,
    /// Phone to call first so its owner can listen in.
    #[serde(default)]
    pub user_phone: String,
    #[serde(default = "default_special_instructions")]
    pub special_instructions: String,
}

#[derive(Debug, Serialize)]
pub struct OrderAccepted {
    pub order_id: String,
    pub restaurant: Restaurant,
    pub status: OrderStatus,
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub order_id: String,
    pub status: OrderStatus,
    pub restaurant: Option<Restaurant>,
    pub recording_url: Option<String>,
    pub listener_recording_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Recordings {
    pub recording_url: Option<String>,
    pub listener_recording_url: Option<String>,
}

/// What the voice agent needs to run one target leg.
#[derive(Clone, Debug)]
pub struct AgentSession {
    pub order_id: String,
    pub stream_id: String,
    pub call_id: String,
    pub system_prompt: String,
    pub order_type: String,
}
