use crate::error::AppError;
use crate::plivo_types::{PlivoMessage, PlivoOutbound};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Task that is the funnel of all PlivoOutbound messages going to the listener's socket.
pub async fn send_plivo_ws_messages(
    mut plivo_outbound_stream: mpsc::Receiver<PlivoOutbound>,
    mut plivo_ws_sink: SplitSink<WebSocket, Message>,
) -> Result<(), AppError> {
    while let Some(plivo_outbound) = plivo_outbound_stream.recv().await {
        let json = serde_json::to_string(&plivo_outbound).map_err(|e| {
            error!(error=%e, "failed to serialize Plivo outbound");
            AppError::Protocol("Plivo message serialization error")
        })?;
        plivo_ws_sink.send(Message::Text(json)).await.map_err(|e| {
            error!(error=%e, "failed to send message to Plivo");
            AppError::Protocol("Failed to send message to Plivo")
        })?;
    }

    Ok(())
}

/// Task that reads and discards everything the listener leg sends until the socket closes.  The
/// listener only hears; anything it says goes nowhere.
pub async fn drain_listener_stream(
    mut plivo_stream: SplitStream<WebSocket>,
) -> Result<(), AppError> {
    loop {
        match plivo_stream.next().await {
            Some(msg) => match msg {
                Ok(Message::Text(json)) => match serde_json::from_str(&json) {
                    Ok(PlivoMessage::Stop {}) => {
                        debug!("got stop message on listener stream");
                        break Ok(());
                    }
                    Ok(_) => trace!("discarding listener frame"),
                    Err(e) => trace!(error=%e, "unparsed listener frame"),
                },
                Ok(Message::Close(_)) => {
                    info!("listener closed the socket");
                    break Ok(());
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(error=%e, "failed to receive message from listener");
                    break Err(AppError::Protocol(
                        "Failed to receive message from listener stream",
                    ));
                }
            },
            None => {
                info!("end of listener stream");
                break Ok(());
            }
        }
    }
}
