use crate::error::AppError;
use crate::media::MediaConnection;
use crate::plivo_types::PlivoMessage;
use crate::types::AgentSession;

use async_trait::async_trait;
use axum::extract::ws::Message;
use tracing::{debug, info, warn};

/// The speech/LLM/speech pipeline that talks on the target leg.  It gets the leg's media
/// connection, which may or may not be teed to a listener.
#[async_trait]
pub trait VoiceAgent: Send + Sync {
    async fn run(
        &self,
        connection: Box<dyn MediaConnection>,
        session: AgentSession,
    ) -> Result<(), AppError>;
}

/// Keeps the leg open without speaking until Plivo stops the stream.  Used when no pipeline is
/// plugged in.
pub struct PassiveAgent;

#[async_trait]
impl VoiceAgent for PassiveAgent {
    async fn run(
        &self,
        mut connection: Box<dyn MediaConnection>,
        session: AgentSession,
    ) -> Result<(), AppError> {
        info!(order=%session.order_id, stream=%session.stream_id, "agent attached to call");
        loop {
            match connection.recv().await {
                Some(Ok(Message::Text(json))) => {
                    if let Ok(PlivoMessage::Stop {}) = serde_json::from_str(&json) {
                        debug!(order=%session.order_id, "got stop message");
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(order=%session.order_id, "end of plivo stream");
                    break;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!(error=%e, "failed to receive message from Plivo");
                    return Err(AppError::Protocol(
                        "Failed to receive message from Plivo stream",
                    ));
                }
            }
        }
        if connection.is_open() {
            let _ = connection.close().await;
        }
        Ok(())
    }
}
