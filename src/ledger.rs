//! In-memory record of every order and the rules for moving it through its call lifecycle.
//!
//! Records are individually locked; nothing here awaits while a record is held.

use crate::plivo_types::PlivoOutbound;
use crate::types::{OrderView, Recordings, Restaurant};
use crate::utils::short_id;

use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Searching,
    CallingListener,
    Calling,
    ListenerConnected,
    InProgress,
    Completed,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Leg {
    Target,
    Listener,
}

/// Work handed to an order's worker task.
#[derive(Debug)]
pub enum OrderCommand {
    /// The listener is on the line; place the target leg.
    DialTarget,
}

pub struct OrderRecord {
    pub status: OrderStatus,
    pub restaurant: Option<Restaurant>,
    pub user_phone: String,
    pub order_type: String,
    pub system_prompt: String,
    /// Provider request id from creating the target leg
    pub target_request_id: Option<String>,
    /// Provider call id from the target leg's answer webhook
    pub target_call_id: Option<String>,
    target_dialed: bool,
    pub listener_request_id: Option<String>,
    pub listener_call_id: Option<String>,
    pub recording_url: Option<String>,
    pub listener_recording_url: Option<String>,
    /// Outbound side of the live listener socket.  Weak: the listener socket task owns it.
    pub listener_sink: Option<mpsc::WeakSender<PlivoOutbound>>,
    pub listener_stream_id: Option<String>,
    /// Mailbox of the order's worker task, if it has one
    pub commands: Option<mpsc::Sender<OrderCommand>>,
}

impl OrderRecord {
    pub fn new(order_type: String, user_phone: String) -> Self {
        Self {
            status: OrderStatus::Searching,
            restaurant: None,
            user_phone,
            order_type,
            system_prompt: String::new(),
            target_request_id: None,
            target_call_id: None,
            target_dialed: false,
            listener_request_id: None,
            listener_call_id: None,
            recording_url: None,
            listener_recording_url: None,
            listener_sink: None,
            listener_stream_id: None,
            commands: None,
        }
    }

    pub fn set_restaurant(&mut self, restaurant: Restaurant) -> bool {
        if self.restaurant.is_some() {
            return false;
        }
        self.restaurant = Some(restaurant);
        true
    }

    /// Terminal.  Drops the worker mailbox so the worker winds down.
    pub fn fail(&mut self) {
        self.status = OrderStatus::Error;
        self.commands = None;
    }

    pub fn begin_listener_call(&mut self) {
        if self.status == OrderStatus::Searching {
            self.status = OrderStatus::CallingListener;
        }
    }

    /// Claim the one and only target dial.  Returns the number to dial, or `None` when the
    /// target leg was already placed or the order is not in a state to place it.
    pub fn begin_target_call(&mut self) -> Option<String> {
        if self.target_dialed {
            return None;
        }
        let phone = self.restaurant.as_ref()?.phone_number.clone();
        match self.status {
            OrderStatus::Searching => self.status = OrderStatus::Calling,
            OrderStatus::ListenerConnected => {}
            _ => return None,
        }
        self.target_dialed = true;
        Some(phone)
    }

    /// Listener media socket is up.  True the first time, which is when the target leg should
    /// be dialed.
    pub fn attach_listener(
        &mut self,
        stream_id: String,
        sink: mpsc::WeakSender<PlivoOutbound>,
    ) -> bool {
        if matches!(self.status, OrderStatus::Completed | OrderStatus::Error) {
            return false;
        }
        self.listener_sink = Some(sink);
        self.listener_stream_id = Some(stream_id);
        if self.status == OrderStatus::CallingListener {
            self.status = OrderStatus::ListenerConnected;
            return true;
        }
        false
    }

    pub fn detach_listener(&mut self) {
        self.listener_sink = None;
    }

    /// Live listener tap, if there is one.
    pub fn listener_tap(&self) -> Option<(mpsc::WeakSender<PlivoOutbound>, String)> {
        let sink = self.listener_sink.clone()?;
        let stream_id = self.listener_stream_id.clone()?;
        Some((sink, stream_id))
    }

    /// True the first time the listener leg answers.
    pub fn listener_answered(&mut self, call_id: &str) -> bool {
        if self.listener_call_id.is_some() || call_id.is_empty() {
            return false;
        }
        self.listener_call_id = Some(call_id.to_string());
        true
    }

    /// True when this answer moved the order into `InProgress`; repeats are no-ops.
    pub fn target_answered(&mut self, call_id: &str) -> bool {
        match self.status {
            OrderStatus::Calling | OrderStatus::ListenerConnected => {
                self.status = OrderStatus::InProgress;
            }
            _ => return false,
        }
        if self.target_call_id.is_none() && !call_id.is_empty() {
            self.target_call_id = Some(call_id.to_string());
        }
        true
    }

    /// Target leg ended.  Hands back the listener call to hang up, at most once.
    pub fn target_hung_up(&mut self) -> Option<String> {
        if matches!(
            self.status,
            OrderStatus::Calling | OrderStatus::ListenerConnected | OrderStatus::InProgress
        ) {
            self.status = OrderStatus::Completed;
        }
        self.commands = None;
        self.listener_call_id.take()
    }

    pub fn target_media_closed(&mut self) {
        if self.status == OrderStatus::InProgress {
            self.status = OrderStatus::Completed;
        }
    }

    /// Status is left alone; only the listener's traces are cleared.
    pub fn listener_hung_up(&mut self) {
        self.listener_sink = None;
        self.listener_call_id = None;
        if self.status == OrderStatus::CallingListener {
            // the target leg will never be dialed now
            self.commands = None;
        }
    }

    /// Last write wins.  True if the stored url changed.
    pub fn set_recording(&mut self, leg: Leg, url: &str) -> bool {
        let slot = match leg {
            Leg::Target => &mut self.recording_url,
            Leg::Listener => &mut self.listener_recording_url,
        };
        if url.is_empty() || slot.as_deref() == Some(url) {
            return false;
        }
        *slot = Some(url.to_string());
        true
    }

    pub fn view(&self, order_id: &str) -> OrderView {
        OrderView {
            order_id: order_id.to_string(),
            status: self.status,
            restaurant: self.restaurant.clone(),
            recording_url: self.recording_url.clone(),
            listener_recording_url: self.listener_recording_url.clone(),
        }
    }

    pub fn recordings(&self) -> Option<Recordings> {
        if self.recording_url.is_none() && self.listener_recording_url.is_none() {
            return None;
        }
        Some(Recordings {
            recording_url: self.recording_url.clone(),
            listener_recording_url: self.listener_recording_url.clone(),
        })
    }
}

/// Shared table of orders.  The table lock is only held to find a record; each record then has
/// its own lock.
#[derive(Default)]
pub struct Ledger {
    orders: Mutex<HashMap<String, Arc<Mutex<OrderRecord>>>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new record under a fresh id.
    pub fn create(&self, record: OrderRecord) -> String {
        let mut orders = self.orders.lock().unwrap_or_else(PoisonError::into_inner);
        let record = Arc::new(Mutex::new(record));
        loop {
            let order_id = short_id();
            if let Entry::Vacant(slot) = orders.entry(order_id.clone()) {
                slot.insert(record);
                break order_id;
            }
        }
    }

    fn get(&self, order_id: &str) -> Option<Arc<Mutex<OrderRecord>>> {
        let orders = self.orders.lock().unwrap_or_else(PoisonError::into_inner);
        orders.get(order_id).cloned()
    }

    /// Apply `f` to the record while holding its lock.  `None` for unknown orders.
    pub fn update<R>(&self, order_id: &str, f: impl FnOnce(&mut OrderRecord) -> R) -> Option<R> {
        let record = self.get(order_id)?;
        let mut guard: MutexGuard<'_, OrderRecord> =
            record.lock().unwrap_or_else(PoisonError::into_inner);
        Some(f(&mut guard))
    }

    pub fn read<R>(&self, order_id: &str, f: impl FnOnce(&OrderRecord) -> R) -> Option<R> {
        self.update(order_id, |record| f(record))
    }
}
