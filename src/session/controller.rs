//! The lifecycle controller.
//!
//! Owns every resource of the active session and is the only thing that
//! mutates them. Device callbacks and the transport worker never touch the
//! session directly: they post `ControllerEvent`s into a single queue, which
//! the owning thread drains with `pump`.

use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use super::state::{ControllerEvent, LifecycleState, SessionSettings, SessionStats, SessionStatus};
use crate::api::live_translate::{LiveTransport, RemoteEvent, RemoteSession, SessionConfig};
use crate::audio::{
    encode_frame, AudioBackend, CaptureNode, InputContext, MicrophoneStream, PlaybackScheduler,
};
use crate::error::{LiveError, LiveResult};

/// Everything one session acquired. Fields fill in as acquisition proceeds,
/// so a half-built session releases exactly what it got.
struct Session {
    generation: u64,
    capture: CaptureNode,
    microphone: Option<Box<dyn MicrophoneStream>>,
    input: Option<Box<dyn InputContext>>,
    playback: Option<PlaybackScheduler>,
    remote: Option<RemoteSession>,
    connect_deadline: Option<Instant>,
    frames_sent: u64,
}

impl Session {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            capture: CaptureNode::new(),
            microphone: None,
            input: None,
            playback: None,
            remote: None,
            connect_deadline: None,
            frames_sent: 0,
        }
    }

    /// Release everything, in order, continuing past failures.
    /// Returns what went wrong along the way. Safe to call twice.
    fn release(&mut self) -> Vec<LiveError> {
        let mut failures = Vec::new();

        // Capture node first so no callback can produce another frame
        self.capture.disconnect();

        if let Some(mut microphone) = self.microphone.take() {
            if let Err(e) = microphone.stop_tracks() {
                failures.push(e);
            }
        }
        if let Some(mut input) = self.input.take() {
            if let Err(e) = input.close() {
                failures.push(e);
            }
        }
        if let Some(playback) = self.playback.take() {
            if let Err(e) = playback.close() {
                failures.push(e);
            }
        }
        if let Some(mut remote) = self.remote.take() {
            remote.close();
        }

        failures
    }

    fn stats(&self) -> SessionStats {
        let mut stats = SessionStats {
            frames_sent: self.frames_sent,
            ..Default::default()
        };
        if let Some(playback) = &self.playback {
            let playback_stats = playback.stats();
            stats.chunks_scheduled = playback_stats.scheduled;
            stats.chunks_dropped = playback_stats.dropped;
            stats.active_sources = playback.active_sources();
            stats.playback_cursor = playback.cursor();
        }
        stats
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for e in self.release() {
            log::warn!("[LiveSession] Release failed: {}", e);
        }
    }
}

/// What an event asks the controller to do once the session borrow is over
enum Transition {
    Stay,
    Activate,
    Close,
    Fail(LiveError),
}

/// Drives capture, the remote session and playback for at most one session
pub struct LiveSessionController<B: AudioBackend, T: LiveTransport> {
    backend: B,
    transport: T,
    settings: SessionSettings,
    events_tx: Sender<ControllerEvent>,
    events_rx: Receiver<ControllerEvent>,
    state: LifecycleState,
    generation: u64,
    session: Option<Session>,
    last_error: Option<LiveError>,
    subscribers: Vec<Sender<SessionStatus>>,
}

impl<B: AudioBackend, T: LiveTransport> LiveSessionController<B, T> {
    pub fn new(backend: B, transport: T, settings: SessionSettings) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            backend,
            transport,
            settings,
            events_tx,
            events_rx,
            state: LifecycleState::Idle,
            generation: 0,
            session: None,
            last_error: None,
            subscribers: Vec::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn status(&self) -> SessionStatus {
        match self.state {
            LifecycleState::Connecting => SessionStatus::Connecting,
            LifecycleState::Active => SessionStatus::Active,
            LifecycleState::Idle | LifecycleState::Closing | LifecycleState::Erroring => {
                match &self.last_error {
                    Some(e) => SessionStatus::Error(e.to_string()),
                    None => SessionStatus::Idle,
                }
            }
        }
    }

    pub fn last_error(&self) -> Option<&LiveError> {
        self.last_error.as_ref()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Receive every status change from now on
    pub fn subscribe(&mut self) -> Receiver<SessionStatus> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Sender for feeding events from outside (device callbacks, tests)
    pub fn event_sender(&self) -> Sender<ControllerEvent> {
        self.events_tx.clone()
    }

    /// Generation of the current (or most recent) session
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Counters for the live session, if there is one
    pub fn stats(&self) -> Option<SessionStats> {
        self.session.as_ref().map(Session::stats)
    }

    /// Microphone RMS level of the live session, 0.0 when idle
    pub fn input_level(&self) -> f32 {
        self.session
            .as_ref()
            .map(|s| s.capture.level())
            .unwrap_or(0.0)
    }

    fn set_state(&mut self, state: LifecycleState) {
        if self.state == state {
            return;
        }
        log::debug!("[LiveSession] {:?} -> {:?}", self.state, state);
        self.state = state;

        // Closing/Erroring are transient; observers only see where they settle
        if matches!(state, LifecycleState::Closing | LifecycleState::Erroring) {
            return;
        }
        let status = self.status();
        self.subscribers.retain(|tx| tx.send(status.clone()).is_ok());
    }

    /// Start a session. Rejected without side effects if one is already running.
    ///
    /// Device and permission failures are returned here. Failures of the remote
    /// open that happen later surface through `status()` and `subscribe()`.
    pub fn start(&mut self, config: SessionConfig) -> LiveResult<()> {
        if !self.state.is_idle() {
            log::warn!("[LiveSession] Start rejected: session is {:?}", self.state);
            return Err(LiveError::AlreadyActive);
        }
        self.settings.validate()?;

        self.generation += 1;
        self.last_error = None;
        self.set_state(LifecycleState::Connecting);
        log::info!(
            "[LiveSession] Starting session {} ({} -> {}, voice {})",
            self.generation,
            config.source_language,
            config.target_language,
            config.voice
        );

        match self.acquire(self.generation, config) {
            Ok(session) => {
                self.session = Some(session);
                Ok(())
            }
            Err(e) => {
                // Partially acquired resources were released when the session dropped
                log::error!("[LiveSession] Start failed: {}", e);
                self.last_error = Some(e.clone());
                self.set_state(LifecycleState::Idle);
                Err(e)
            }
        }
    }

    fn acquire(&self, generation: u64, config: SessionConfig) -> LiveResult<Session> {
        let mut session = Session::new(generation);

        let events = self.events_tx.clone();
        let output = self.backend.open_output(
            self.settings.playback_sample_rate,
            Box::new(move |source| {
                let _ = events.send(ControllerEvent::PlaybackEnded { generation, source });
            }),
        )?;
        session.playback = Some(PlaybackScheduler::new(
            output,
            self.settings.playback_sample_rate,
        ));

        let input = session
            .input
            .insert(self.backend.open_input(self.settings.capture_sample_rate)?);

        let events = self.events_tx.clone();
        let sink = session.capture.sink(
            self.settings.frame_size,
            input.sample_rate(),
            move |frame| {
                let _ = events.send(ControllerEvent::Frame { generation, frame });
            },
        );
        session.microphone = Some(input.acquire_microphone(sink)?);

        let events = self.events_tx.clone();
        session.remote = Some(RemoteSession::open(
            &self.transport,
            config,
            Box::new(move |event| {
                let _ = events.send(ControllerEvent::Remote { generation, event });
            }),
        )?);

        session.connect_deadline = self.settings.connect_timeout.map(|t| Instant::now() + t);
        Ok(session)
    }

    /// Stop the session. The controller is `Idle` when this returns.
    pub fn stop(&mut self) {
        if self.session.is_none() && self.state.is_idle() {
            return;
        }
        log::info!("[LiveSession] Stopping session {}", self.generation);
        self.close_session();
    }

    /// Start when idle, stop otherwise
    pub fn toggle(&mut self, config: SessionConfig) -> LiveResult<()> {
        if self.state.is_idle() {
            self.start(config)
        } else {
            self.stop();
            Ok(())
        }
    }

    fn close_session(&mut self) {
        self.set_state(LifecycleState::Closing);
        self.teardown();
        self.set_state(LifecycleState::Idle);
    }

    fn fail_session(&mut self, error: LiveError) {
        log::error!("[LiveSession] Session {} failed: {}", self.generation, error);
        self.set_state(LifecycleState::Erroring);
        self.teardown();
        self.last_error = Some(error);
        self.set_state(LifecycleState::Idle);
    }

    fn teardown(&mut self) {
        // Taking the session invalidates it: late events no longer match
        if let Some(mut session) = self.session.take() {
            for e in session.release() {
                log::warn!("[LiveSession] Release failed: {}", e);
            }
        }
    }

    /// Apply one event on the controller thread
    pub fn handle_event(&mut self, event: ControllerEvent) {
        let generation = event.generation();
        let state = self.state;
        let Some(session) = self
            .session
            .as_mut()
            .filter(|s| s.generation == generation)
        else {
            log::trace!("[LiveSession] Dropping stale event from session {}", generation);
            return;
        };

        let transition = match event {
            ControllerEvent::Frame { frame, .. } => {
                if state == LifecycleState::Active {
                    if let Some(remote) = session.remote.as_mut() {
                        if remote.send(encode_frame(frame)) {
                            session.frames_sent += 1;
                        }
                    }
                }
                Transition::Stay
            }
            ControllerEvent::PlaybackEnded { source, .. } => {
                if let Some(playback) = session.playback.as_mut() {
                    playback.on_source_ended(source);
                }
                Transition::Stay
            }
            ControllerEvent::Remote { event, .. } => {
                let accepted = session.remote.as_mut().and_then(|r| r.accept(event));
                match accepted {
                    None => Transition::Stay,
                    Some(RemoteEvent::Opened) => Transition::Activate,
                    Some(RemoteEvent::Message(chunk)) => match session.playback.as_mut() {
                        Some(playback) => match playback.on_chunk_received(&chunk) {
                            Ok(_) => Transition::Stay,
                            Err(e) if !e.is_fatal() => {
                                log::warn!("[LiveSession] {}", e);
                                Transition::Stay
                            }
                            Err(e) => Transition::Fail(e),
                        },
                        None => Transition::Stay,
                    },
                    Some(RemoteEvent::Error(msg)) => {
                        if state == LifecycleState::Connecting {
                            Transition::Fail(LiveError::ConnectFailed(msg))
                        } else {
                            Transition::Fail(LiveError::TransportError(msg))
                        }
                    }
                    Some(RemoteEvent::Closed) => {
                        if state == LifecycleState::Connecting {
                            Transition::Fail(LiveError::ConnectFailed(
                                "Service closed the connection before the session opened"
                                    .to_string(),
                            ))
                        } else {
                            Transition::Close
                        }
                    }
                }
            }
        };

        match transition {
            Transition::Stay => {}
            Transition::Activate => {
                if let Some(session) = self.session.as_mut() {
                    session.connect_deadline = None;
                    session.capture.connect();
                }
                log::info!("[LiveSession] Session {} is live", generation);
                self.set_state(LifecycleState::Active);
            }
            Transition::Close => {
                log::info!("[LiveSession] Service closed session {}", generation);
                self.close_session();
            }
            Transition::Fail(e) => self.fail_session(e),
        }
    }

    /// Fail a session the service has not opened by its deadline
    pub fn check_connect_timeout(&mut self, now: Instant) {
        if self.state != LifecycleState::Connecting {
            return;
        }
        let expired = self
            .session
            .as_ref()
            .and_then(|s| s.connect_deadline)
            .is_some_and(|deadline| now >= deadline);
        if expired {
            self.fail_session(LiveError::ConnectFailed(
                "Timed out waiting for the service to open the session".to_string(),
            ));
        }
    }

    /// Wait up to `timeout` for events, then handle everything queued.
    /// Returns the number of events handled.
    pub fn pump(&mut self, timeout: Duration) -> usize {
        let mut handled = 0;
        if let Ok(event) = self.events_rx.recv_timeout(timeout) {
            self.handle_event(event);
            handled += 1;
        }
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        self.check_connect_timeout(Instant::now());
        handled
    }
}

impl<B: AudioBackend, T: LiveTransport> Drop for LiveSessionController<B, T> {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.close_session();
        }
    }
}
