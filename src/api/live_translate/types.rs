//! Types for the live translation session

use crate::audio::EncodedChunk;
use crate::error::LiveResult;

/// Native audio model used for speech-to-speech translation
pub const LIVE_TRANSLATE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";

/// Prebuilt voice used when none is configured
pub const DEFAULT_VOICE: &str = "Aoede";

/// Per-session settings sent to the service at connect time.
///
/// Fixed for the lifetime of the session; changing any of them means a new session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Spoken language hint, or "auto"
    pub source_language: String,
    pub target_language: String,
    /// Prebuilt voice name (e.g. "Aoede", "Puck")
    pub voice: String,
    /// Free-text tone/style instructions appended to the system prompt
    pub instructions: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            source_language: "auto".to_string(),
            target_language: "English".to_string(),
            voice: DEFAULT_VOICE.to_string(),
            instructions: String::new(),
        }
    }
}

/// Events emitted by a remote session
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteEvent {
    /// Service acknowledged setup; audio may flow
    Opened,
    /// Synthesized speech from the service
    Message(EncodedChunk),
    /// Transport failure; terminal
    Error(String),
    /// Graceful close; terminal
    Closed,
}

impl RemoteEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteEvent::Error(_) | RemoteEvent::Closed)
    }
}

/// Receives transport events, usually from a worker thread
pub type RemoteEventSink = Box<dyn Fn(RemoteEvent) + Send + 'static>;

/// A duplex streaming service that can host a translation session
pub trait LiveTransport {
    /// Begin opening a session. Returns immediately; `Opened` (or a terminal
    /// event) arrives later through `events`.
    fn connect(
        &self,
        config: &SessionConfig,
        events: RemoteEventSink,
    ) -> LiveResult<Box<dyn TransportHandle>>;
}

/// Outbound half of an open transport
pub trait TransportHandle {
    fn send(&mut self, chunk: EncodedChunk) -> LiveResult<()>;

    /// Request shutdown. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Work for the socket worker
pub(crate) enum Outbound {
    Audio(EncodedChunk),
    Close,
}
