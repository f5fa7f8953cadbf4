use crate::consts::{TICK_BYTES, TICK_MILLIS};
use crate::media::MediaConnection;
use crate::mulaw;
use crate::plivo_types::{PlivoMessage, PlivoOutbound};
use crate::utils::{b64_decode, mulaw2plivo};

use async_trait::async_trait;
use axum::extract::ws::Message;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, warn};

/// Audio captured from both directions of the target leg, waiting to be mixed.
#[derive(Default)]
pub struct TeeBuffers {
    /// restaurant side
    inbound: VecDeque<u8>,
    /// agent side
    outbound: VecDeque<u8>,
}

impl TeeBuffers {
    pub fn push_inbound(&mut self, chunk: &[u8]) {
        self.inbound.extend(chunk);
    }

    pub fn push_outbound(&mut self, chunk: &[u8]) {
        self.outbound.extend(chunk);
    }

    /// Take at most `budget` bytes from each side and fold them into one chunk.  `None` when
    /// both sides are dry.
    pub fn drain_tick(&mut self, budget: usize) -> Option<Vec<u8>> {
        let take = self.inbound.len().min(budget);
        let inbound: Vec<u8> = self.inbound.drain(..take).collect();
        let take = self.outbound.len().min(budget);
        let outbound: Vec<u8> = self.outbound.drain(..take).collect();

        match (inbound.is_empty(), outbound.is_empty()) {
            (true, true) => None,
            (false, true) => Some(inbound),
            (true, false) => Some(outbound),
            (false, false) => Some(mulaw::mix(&inbound, &outbound)),
        }
    }
}

/// Duplex proxy around the target leg's media connection.  Everything passes through untouched;
/// a copy of each direction is buffered and a cadence task mixes one tick of audio at a time
/// down to the listener leg, which keeps the listener at 1x real time.
pub struct AudioTee<C: MediaConnection> {
    inner: C,
    buffers: Arc<Mutex<TeeBuffers>>,
    alive: Arc<AtomicBool>,
    cadence: JoinHandle<()>,
}

impl<C: MediaConnection> AudioTee<C> {
    pub fn new(
        inner: C,
        listener: mpsc::WeakSender<PlivoOutbound>,
        listener_stream_id: String,
    ) -> Self {
        let buffers = Arc::new(Mutex::new(TeeBuffers::default()));
        let alive = Arc::new(AtomicBool::new(true));
        let cadence = tokio::spawn(run_cadence(
            buffers.clone(),
            alive.clone(),
            listener,
            listener_stream_id,
        ));
        Self {
            inner,
            buffers,
            alive,
            cadence,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn buffers(&self) -> MutexGuard<'_, TeeBuffers> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Untagged media counts as inbound; other tracks are our own audio echoed back.
    fn capture_inbound(&self, text: &str) {
        if let Ok(PlivoMessage::Media { media }) = serde_json::from_str(text) {
            if media.track.as_deref().map_or(false, |track| track != "inbound") {
                return;
            }
            if let Ok(chunk) = b64_decode(&media.payload) {
                self.buffers().push_inbound(&chunk);
            }
        }
    }

    fn capture_outbound(&self, text: &str) {
        if let Ok(PlivoOutbound::PlayAudio { media, .. }) = serde_json::from_str(text) {
            if let Ok(chunk) = b64_decode(&media.payload) {
                self.buffers().push_outbound(&chunk);
            }
        }
    }
}

#[async_trait]
impl<C: MediaConnection> MediaConnection for AudioTee<C> {
    async fn recv(&mut self) -> Option<Result<Message, axum::Error>> {
        let msg = self.inner.recv().await;
        if let Some(Ok(Message::Text(text))) = &msg {
            if self.is_alive() {
                self.capture_inbound(text);
            }
        }
        msg
    }

    async fn send_text(&mut self, text: String) -> Result<(), axum::Error> {
        let capture = self.is_alive().then(|| text.clone());
        self.inner.send_text(text).await?;
        if let Some(text) = capture {
            self.capture_outbound(&text);
        }
        Ok(())
    }

    async fn send_bytes(&mut self, data: Vec<u8>) -> Result<(), axum::Error> {
        self.inner.send_bytes(data).await
    }

    async fn close(&mut self) -> Result<(), axum::Error> {
        self.cadence.abort();
        self.alive.store(false, Ordering::Release);
        self.inner.close().await
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

impl<C: MediaConnection> Drop for AudioTee<C> {
    fn drop(&mut self) {
        self.cadence.abort();
    }
}

/// Every tick, move one tick's worth of mixed audio to the listener.  Exits quietly when the
/// listener goes away; the target leg carries on without it.
async fn run_cadence(
    buffers: Arc<Mutex<TeeBuffers>>,
    alive: Arc<AtomicBool>,
    listener: mpsc::WeakSender<PlivoOutbound>,
    listener_stream_id: String,
) {
    let tick = Duration::from_millis(TICK_MILLIS);
    let mut ticker = interval_at(Instant::now() + tick, tick);
    loop {
        ticker.tick().await;
        if !alive.load(Ordering::Acquire) {
            break;
        }
        let Some(sink) = listener.upgrade() else {
            debug!(stream=%listener_stream_id, "listener gone; stopping tee");
            alive.store(false, Ordering::Release);
            break;
        };
        let chunk = buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain_tick(TICK_BYTES);
        let Some(chunk) = chunk else {
            continue;
        };
        if let Err(e) = sink.send(mulaw2plivo(&chunk, &listener_stream_id)).await {
            warn!(error=%e, "listener sender loop failed");
            alive.store(false, Ordering::Release);
            break;
        }
    }
}
