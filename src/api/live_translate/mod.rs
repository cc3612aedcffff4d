//! Live speech-to-speech translation over the Gemini Live API
//!
//! `RemoteSession` wraps whatever `LiveTransport` is in use and holds it to the
//! session contract: one `Opened` before any audio, at most one terminal event,
//! silence afterwards. `GeminiLiveTransport` is the production transport; it
//! runs one worker thread per session that owns the websocket.

pub mod types;
pub mod websocket;
pub mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;

pub use types::{
    LiveTransport, RemoteEvent, RemoteEventSink, SessionConfig, TransportHandle, DEFAULT_VOICE,
    LIVE_TRANSLATE_MODEL,
};

use crate::audio::EncodedChunk;
use crate::error::{LiveError, LiveResult};
use types::Outbound;
use worker::{run_session_worker, WorkerParams};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemotePhase {
    /// `connect` returned, waiting for `Opened`
    Opening,
    Open,
    /// Terminal event seen or closed locally
    Terminated,
}

/// One remote translation session and its immutable configuration
pub struct RemoteSession {
    config: SessionConfig,
    phase: RemotePhase,
    handle: Option<Box<dyn TransportHandle>>,
}

impl RemoteSession {
    /// Start opening a session. Failure to even begin is a `ConnectFailed`.
    pub fn open<T>(transport: &T, config: SessionConfig, events: RemoteEventSink) -> LiveResult<Self>
    where
        T: LiveTransport + ?Sized,
    {
        let handle = transport.connect(&config, events).map_err(|e| match e {
            LiveError::ConnectFailed(_) => e,
            other => LiveError::ConnectFailed(other.to_string()),
        })?;

        Ok(Self {
            config,
            phase: RemotePhase::Opening,
            handle: Some(handle),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> RemotePhase {
        self.phase
    }

    pub fn is_open(&self) -> bool {
        self.phase == RemotePhase::Open
    }

    /// Filter a raw transport event through the session contract.
    ///
    /// Returns the event if the session should act on it, `None` if it is out
    /// of order (audio before `Opened`, a second `Opened`, anything after a
    /// terminal event).
    pub fn accept(&mut self, event: RemoteEvent) -> Option<RemoteEvent> {
        let terminal = event.is_terminal();
        match self.phase {
            RemotePhase::Terminated => None,
            _ if terminal => {
                self.phase = RemotePhase::Terminated;
                Some(event)
            }
            RemotePhase::Opening if matches!(event, RemoteEvent::Opened) => {
                self.phase = RemotePhase::Open;
                Some(event)
            }
            RemotePhase::Open if matches!(event, RemoteEvent::Message(_)) => Some(event),
            phase => {
                log::warn!("[GeminiLive] Ignoring {} while {:?}", event_name(&event), phase);
                None
            }
        }
    }

    /// Hand a chunk to the transport. A no-op outside the open window.
    pub fn send(&mut self, chunk: EncodedChunk) -> bool {
        if self.phase != RemotePhase::Open {
            return false;
        }
        let Some(handle) = self.handle.as_mut() else {
            return false;
        };
        match handle.send(chunk) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[GeminiLive] Send failed: {}", e);
                false
            }
        }
    }

    /// Idempotent
    pub fn close(&mut self) {
        self.phase = RemotePhase::Terminated;
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn event_name(event: &RemoteEvent) -> &'static str {
    match event {
        RemoteEvent::Opened => "Opened",
        RemoteEvent::Message(_) => "Message",
        RemoteEvent::Error(_) => "Error",
        RemoteEvent::Closed => "Closed",
    }
}

// ============================================================================
// GEMINI LIVE TRANSPORT
// ============================================================================

/// Production transport: one websocket per session, served by a worker thread
pub struct GeminiLiveTransport {
    api_key: String,
    model: String,
}

impl GeminiLiveTransport {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

impl LiveTransport for GeminiLiveTransport {
    fn connect(
        &self,
        config: &SessionConfig,
        events: RemoteEventSink,
    ) -> LiveResult<Box<dyn TransportHandle>> {
        if self.api_key.trim().is_empty() {
            return Err(LiveError::ConnectFailed(
                "No Gemini API key configured".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let params = WorkerParams {
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            config: config.clone(),
            events,
            outbound: rx,
            shutdown: shutdown.clone(),
        };

        std::thread::Builder::new()
            .name("gemini-live".to_string())
            .spawn(move || run_session_worker(params))
            .map_err(|e| LiveError::ConnectFailed(format!("Failed to spawn worker: {}", e)))?;

        Ok(Box::new(GeminiSessionHandle {
            outbound: tx,
            shutdown,
        }))
    }
}

struct GeminiSessionHandle {
    outbound: Sender<Outbound>,
    shutdown: Arc<AtomicBool>,
}

impl TransportHandle for GeminiSessionHandle {
    fn send(&mut self, chunk: EncodedChunk) -> LiveResult<()> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.outbound
            .send(Outbound::Audio(chunk))
            .map_err(|_| LiveError::TransportError("Socket worker has exited".to_string()))
    }

    fn close(&mut self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            let _ = self.outbound.send(Outbound::Close);
        }
    }
}
