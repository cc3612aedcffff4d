//! Lifecycle states, settings and the events feeding the controller

use std::time::Duration;

use crate::api::live_translate::RemoteEvent;
use crate::audio::{AudioFrame, SourceId};
use crate::config::Config;
use crate::error::{LiveError, LiveResult};

/// Lifecycle of the single live session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// No resources held
    #[default]
    Idle,
    /// Devices acquired, waiting for the service to open the session
    Connecting,
    /// Audio flowing both ways
    Active,
    /// Tearing down after stop or a graceful remote close
    Closing,
    /// Tearing down after a failure
    Erroring,
}

impl LifecycleState {
    pub fn is_idle(&self) -> bool {
        *self == LifecycleState::Idle
    }
}

/// What a control surface shows: idle, connecting/active, or the last error
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Active,
    Error(String),
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "Idle"),
            SessionStatus::Connecting => write!(f, "Connecting..."),
            SessionStatus::Active => write!(f, "Live"),
            SessionStatus::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}

/// Local pipeline settings, fixed per controller
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSettings {
    /// Samples per outbound frame
    pub frame_size: usize,
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
    /// Give up on a session the service never opens. `None` waits forever.
    pub connect_timeout: Option<Duration>,
}

impl SessionSettings {
    /// Reject settings no device could be opened with
    pub fn validate(&self) -> LiveResult<()> {
        if self.frame_size == 0 {
            return Err(LiveError::Config("frame size must be at least 1 sample".to_string()));
        }
        if self.capture_sample_rate == 0 || self.playback_sample_rate == 0 {
            return Err(LiveError::Config("sample rates must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Config::default().settings()
    }
}

/// Counters for the current session
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SessionStats {
    pub frames_sent: u64,
    pub chunks_scheduled: u64,
    pub chunks_dropped: u64,
    pub active_sources: usize,
    /// Next permissible playback start, seconds on the output clock
    pub playback_cursor: f64,
}

/// Everything that reaches the controller from other threads.
///
/// Each event is tagged with the generation of the session that produced it;
/// events from any other generation are stale and dropped.
#[derive(Debug)]
pub enum ControllerEvent {
    Remote { generation: u64, event: RemoteEvent },
    Frame { generation: u64, frame: AudioFrame },
    PlaybackEnded { generation: u64, source: SourceId },
}

impl ControllerEvent {
    pub fn generation(&self) -> u64 {
        match self {
            ControllerEvent::Remote { generation, .. }
            | ControllerEvent::Frame { generation, .. }
            | ControllerEvent::PlaybackEnded { generation, .. } => *generation,
        }
    }
}
