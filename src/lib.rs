//! Live, bidirectional speech translation.
//!
//! Microphone audio is sliced into frames and streamed to the Gemini Live API;
//! the translated speech that comes back is scheduled for gapless playback.
//! `LiveSessionController` owns the whole session lifecycle.

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod session;

pub use api::live_translate::{GeminiLiveTransport, SessionConfig};
pub use audio::CpalBackend;
pub use config::Config;
pub use error::{LiveError, LiveResult};
pub use session::{LifecycleState, LiveSessionController, SessionSettings, SessionStatus};
