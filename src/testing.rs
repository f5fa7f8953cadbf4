//! Test doubles for the provider, the place search and media sockets.

use crate::agent::PassiveAgent;
use crate::config::Config;
use crate::error::AppError;
use crate::ledger::Ledger;
use crate::media::MediaConnection;
use crate::places::PlaceSearch;
use crate::plivo_types::{OutboundMediaMeta, PlivoOutbound};
use crate::telephony::{CallRequest, Telephony};
use crate::types::{AppState, Restaurant};

use async_trait::async_trait;
use axum::extract::ws::Message;
use base64::{engine, Engine};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn test_config() -> Config {
    Config {
        public_host: "calls.example.test".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        plivo_auth_id: "MAXXXX".to_string(),
        plivo_auth_token: "token".to_string(),
        plivo_phone_number: "+15550000000".to_string(),
        google_places_api_key: String::new(),
    }
}

pub fn test_state(telephony: Arc<MockTelephony>, places: Arc<MockPlaces>) -> Arc<AppState> {
    Arc::new(AppState {
        config: test_config(),
        ledger: Ledger::new(),
        telephony,
        places,
        agent: Arc::new(PassiveAgent),
    })
}

/// Poll `done` until it holds; panics after a second.
pub async fn wait_for(done: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub fn media_frame(audio: &[u8]) -> String {
    serde_json::json!({
        "event": "media",
        "streamId": "target-stream",
        "media": {
            "track": "inbound",
            "timestamp": "0",
            "chunk": 1,
            "payload": engine::general_purpose::STANDARD.encode(audio),
        }
    })
    .to_string()
}

pub fn play_audio_frame(audio: &[u8], stream_id: &str) -> String {
    serde_json::to_string(&PlivoOutbound::PlayAudio {
        media: OutboundMediaMeta {
            content_type: "audio/x-mulaw".to_string(),
            sample_rate: 8000,
            payload: engine::general_purpose::STANDARD.encode(audio),
        },
        stream_id: Some(stream_id.to_string()),
    })
    .unwrap()
}

#[derive(Default)]
pub struct MockTelephony {
    created: Mutex<Vec<CallRequest>>,
    recordings: Mutex<Vec<String>>,
    hangups: Mutex<Vec<String>>,
    fail_to: Option<String>,
}

impl MockTelephony {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Refuses to dial `number`.
    pub fn failing_for(number: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_to: Some(number.to_string()),
            ..Default::default()
        })
    }

    pub fn created(&self) -> Vec<CallRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn recordings(&self) -> Vec<String> {
        self.recordings.lock().unwrap().clone()
    }

    pub fn hangups(&self) -> Vec<String> {
        self.hangups.lock().unwrap().clone()
    }
}

#[async_trait]
impl Telephony for MockTelephony {
    async fn create_call(&self, request: &CallRequest) -> Result<String, AppError> {
        if self.fail_to.as_deref() == Some(request.to.as_str()) {
            return Err(AppError::Provider("number rejected".to_string()));
        }
        let mut created = self.created.lock().unwrap();
        created.push(request.clone());
        Ok(format!("request-{}", created.len()))
    }

    async fn start_recording(&self, call_id: &str, _callback_url: &str) -> Result<(), AppError> {
        self.recordings.lock().unwrap().push(call_id.to_string());
        Ok(())
    }

    async fn hangup(&self, call_id: &str) -> Result<(), AppError> {
        self.hangups.lock().unwrap().push(call_id.to_string());
        Ok(())
    }
}

pub struct MockPlaces {
    result: Option<Restaurant>,
    searches: AtomicUsize,
}

impl MockPlaces {
    pub fn tonys() -> Arc<Self> {
        Arc::new(Self {
            result: Some(Restaurant {
                name: "Tony's Pizza".to_string(),
                address: "1 Main St".to_string(),
                phone_number: "+14155550100".to_string(),
                place_id: Some("place-1".to_string()),
            }),
            searches: AtomicUsize::new(0),
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            result: None,
            searches: AtomicUsize::new(0),
        })
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaceSearch for MockPlaces {
    async fn search(&self, _query: &str) -> Result<Option<Restaurant>, AppError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

/// Plays back a fixed list of frames and records what gets sent.
pub struct ScriptedConnection {
    incoming: VecDeque<Message>,
    hang_when_empty: bool,
    sent: Arc<Mutex<Vec<Message>>>,
    open: bool,
}

impl ScriptedConnection {
    /// Ends the stream after the last frame.
    pub fn new(incoming: Vec<Message>) -> Self {
        Self {
            incoming: incoming.into(),
            hang_when_empty: false,
            sent: Arc::new(Mutex::new(vec![])),
            open: true,
        }
    }

    /// Never ends the stream; reads after the last frame wait forever.
    pub fn pending(incoming: Vec<Message>) -> Self {
        Self {
            hang_when_empty: true,
            ..Self::new(incoming)
        }
    }

    pub fn sent(&self) -> Arc<Mutex<Vec<Message>>> {
        self.sent.clone()
    }
}

#[async_trait]
impl MediaConnection for ScriptedConnection {
    async fn recv(&mut self) -> Option<Result<Message, axum::Error>> {
        match self.incoming.pop_front() {
            Some(msg) => Some(Ok(msg)),
            None if self.hang_when_empty => std::future::pending().await,
            None => {
                self.open = false;
                None
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), axum::Error> {
        self.sent.lock().unwrap().push(Message::Text(text));
        Ok(())
    }

    async fn send_bytes(&mut self, data: Vec<u8>) -> Result<(), axum::Error> {
        self.sent.lock().unwrap().push(Message::Binary(data));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), axum::Error> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
