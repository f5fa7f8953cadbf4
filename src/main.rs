mod agent;
mod config;
mod error;
mod handlers;
mod ledger;
mod media;
mod mulaw;
mod orchestrator;
mod places;
mod places_types;
mod plivo_types;
mod tasks;
mod tee;
mod telephony;
#[cfg(test)]
mod testing;
mod types;
mod utils;

use crate::agent::PassiveAgent;
use crate::config::Config;
use crate::ledger::Ledger;
use crate::places::GooglePlaces;
use crate::telephony::PlivoClient;
use crate::types::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;

pub mod consts {
    pub const SAMPLE_RATE: u32 = 8_000;
    pub const TICK_MILLIS: u64 = 100;
    /// One byte per mulaw sample.
    pub const TICK_BYTES: usize = (SAMPLE_RATE as u64 * TICK_MILLIS / 1_000) as usize;
    pub const START_EVENT_TIMEOUT_SECS: u64 = 10;
    pub const RECORDING_TIME_LIMIT_SECS: u32 = 600;
    pub const LISTENER_CHANNEL_DEPTH: usize = 64;
    pub const MULAW_CONTENT_TYPE: &str = "audio/x-mulaw";
    pub const STREAM_CONTENT_TYPE: &str = "audio/x-mulaw;rate=8000";
    pub const LISTENER_GREETING: &str =
        "Connecting you as a listener. You will hear the conversation shortly.";
}

pub fn app(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/start-order", post(handlers::start_order))
        .route("/order/:order_id", get(handlers::get_order))
        .route("/recording/:order_id", get(handlers::get_recording))
        .route("/plivo/answer", get(handlers::plivo_answer).post(handlers::plivo_answer))
        .route("/plivo/hangup", post(handlers::plivo_hangup))
        .route(
            "/plivo/recording-callback",
            post(handlers::plivo_recording_callback),
        )
        .route("/plivo/ws", get(handlers::plivo_ws_handler))
        .route(
            "/plivo/answer-listener",
            get(handlers::plivo_answer_listener).post(handlers::plivo_answer_listener),
        )
        .route("/plivo/hangup-listener", post(handlers::plivo_hangup_listener))
        .route(
            "/plivo/recording-callback-listener",
            post(handlers::plivo_recording_callback_listener),
        )
        .route("/plivo/ws-listener", get(handlers::plivo_ws_listener_handler))
        .with_state(app_state)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(true)
                .with_line_number(true),
        )
        .with(tracing_subscriber::filter::Targets::new().with_targets([
            ("hyper", tracing_subscriber::filter::LevelFilter::OFF),
            ("orderline", tracing_subscriber::filter::LevelFilter::DEBUG),
        ]));
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let config = Config::from_env().unwrap_or_else(|e| panic!("{e}"));
    if config.google_places_api_key.is_empty() {
        info!("GOOGLE_PLACES_API_KEY not set; restaurant search will fail without a phone_override");
    }
    let bind_addr: SocketAddr = config
        .bind_addr
        .parse()
        .unwrap_or_else(|e| panic!("bad BIND_ADDR {}: {e}", config.bind_addr));

    let http_client = reqwest::Client::new();
    let telephony = Arc::new(PlivoClient::new(
        http_client.clone(),
        config.plivo_auth_id.clone(),
        config.plivo_auth_token.clone(),
        config.plivo_phone_number.clone(),
    ));
    let places = Arc::new(GooglePlaces::new(
        http_client,
        config.google_places_api_key.clone(),
    ));

    let app_state = Arc::new(AppState {
        config,
        ledger: Ledger::new(),
        telephony,
        places,
        agent: Arc::new(PassiveAgent),
    });

    info!(addr=%bind_addr, "listening");
    axum::Server::bind(&bind_addr)
        .serve(app(app_state).into_make_service())
        .await
        .unwrap();
}
