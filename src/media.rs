use crate::consts::START_EVENT_TIMEOUT_SECS;
use crate::error::AppError;
use crate::plivo_types::{PlivoMessage, StartMeta};
use crate::utils::short_id;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, trace};

/// The duplex media socket contract the voice agent is written against.  Both a raw socket and
/// an `AudioTee` wrapping one implement it, so the agent cannot tell them apart.
#[async_trait]
pub trait MediaConnection: Send {
    async fn recv(&mut self) -> Option<Result<Message, axum::Error>>;
    async fn send_text(&mut self, text: String) -> Result<(), axum::Error>;
    async fn send_bytes(&mut self, data: Vec<u8>) -> Result<(), axum::Error>;
    async fn close(&mut self) -> Result<(), axum::Error>;
    fn is_open(&self) -> bool;
}

pub struct WsConnection {
    socket: WebSocket,
    open: bool,
}

impl WsConnection {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket, open: true }
    }

    pub fn into_inner(self) -> WebSocket {
        self.socket
    }
}

#[async_trait]
impl MediaConnection for WsConnection {
    async fn recv(&mut self) -> Option<Result<Message, axum::Error>> {
        let msg = self.socket.recv().await;
        if matches!(msg, None | Some(Ok(Message::Close(_)))) {
            self.open = false;
        }
        msg
    }

    async fn send_text(&mut self, text: String) -> Result<(), axum::Error> {
        self.socket.send(Message::Text(text)).await
    }

    async fn send_bytes(&mut self, data: Vec<u8>) -> Result<(), axum::Error> {
        self.socket.send(Message::Binary(data)).await
    }

    async fn close(&mut self) -> Result<(), axum::Error> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.socket.send(Message::Close(None)).await
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Capture the `start` frame from the beginning of a Plivo media stream for the stream and call
/// ids.  Gives up after `START_EVENT_TIMEOUT_SECS`.
pub async fn read_start_meta<C: MediaConnection + ?Sized>(
    conn: &mut C,
) -> Result<StartMeta, AppError> {
    timeout(
        Duration::from_secs(START_EVENT_TIMEOUT_SECS),
        first_text_frame(conn),
    )
    .await
    .map_err(|_| AppError::Protocol("Timed out waiting for the start frame"))?
    .and_then(|text| parse_start_meta(&text))
}

async fn first_text_frame<C: MediaConnection + ?Sized>(conn: &mut C) -> Result<String, AppError> {
    loop {
        match conn.recv().await {
            Some(Ok(Message::Text(text))) => break Ok(text),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(_)) => {
                break Err(AppError::Protocol(
                    "Got unexpected websocket message type from Plivo!",
                ))
            }
            Some(Err(e)) => {
                error!(error=%e, "failed to receive message from Plivo");
                break Err(AppError::Protocol("Failed to receive start frame"));
            }
            None => break Err(AppError::Protocol("End of stream")),
        }
    }
}

/// A first frame that is not `start` still names the stream at the top level; older streams did
/// this.  Without one we make up a stream id.
fn parse_start_meta(text: &str) -> Result<StartMeta, AppError> {
    trace!(frame=%text, "first media frame");
    if let Ok(PlivoMessage::Start { start }) = serde_json::from_str::<PlivoMessage>(text) {
        return Ok(start);
    }
    let value: serde_json::Value = serde_json::from_str(text).map_err(|e| {
        error!(error=%e, "failed to deserialize Plivo text message");
        AppError::Protocol("Error deserializing Plivo text message")
    })?;
    let field = |name: &str| value.get(name).and_then(|v| v.as_str()).map(str::to_string);
    Ok(StartMeta {
        stream_id: field("streamId").unwrap_or_else(short_id),
        call_id: field("callId").unwrap_or_default(),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedConnection;

    #[tokio::test]
    async fn reads_start_frame() {
        let mut conn = ScriptedConnection::new(vec![Message::Text(
            r#"{"event":"start","start":{"streamId":"s-1","callId":"c-1"}}"#.to_string(),
        )]);
        let meta = read_start_meta(&mut conn).await.unwrap();
        assert_eq!(meta.stream_id, "s-1");
        assert_eq!(meta.call_id, "c-1");
    }

    #[tokio::test]
    async fn falls_back_to_top_level_ids() {
        let mut conn = ScriptedConnection::new(vec![
            Message::Ping(vec![1]),
            Message::Text(r#"{"event":"connected","streamId":"s-2"}"#.to_string()),
        ]);
        let meta = read_start_meta(&mut conn).await.unwrap();
        assert_eq!(meta.stream_id, "s-2");
        assert_eq!(meta.call_id, "");
    }

    #[tokio::test]
    async fn garbage_first_frame_is_a_protocol_error() {
        let mut conn = ScriptedConnection::new(vec![Message::Text("not json".to_string())]);
        assert!(matches!(
            read_start_meta(&mut conn).await,
            Err(AppError::Protocol(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_socket_times_out() {
        let mut conn = ScriptedConnection::pending(vec![]);
        assert!(matches!(
            read_start_meta(&mut conn).await,
            Err(AppError::Protocol(_))
        ));
    }
}
