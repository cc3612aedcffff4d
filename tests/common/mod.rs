//! In-memory devices and transport for driving the controller in tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use live_interpreter::api::live_translate::{
    LiveTransport, RemoteEvent, RemoteEventSink, SessionConfig, TransportHandle,
};
use live_interpreter::audio::{
    AudioBackend, AudioFormat, CompletionSink, DecodedAudioBuffer, EncodedChunk, InputContext,
    MicrophoneStream, OutputContext, SampleSink, SourceId,
};
use live_interpreter::{LiveError, LiveResult, LiveSessionController, SessionSettings};

// ============================================================================
// DEVICES
// ============================================================================

#[derive(Default)]
pub struct DeviceLog {
    /// Output device clock, seconds
    pub now: f64,
    /// (source, start, duration)
    pub scheduled: Vec<(SourceId, f64, f64)>,
    pub outputs_opened: usize,
    pub outputs_closed: usize,
    pub inputs_opened: usize,
    pub inputs_closed: usize,
    pub mics_acquired: usize,
    pub mics_stopped: usize,
    pub mic_sink: Option<SampleSink>,
    pub completion: Option<CompletionSink>,

    pub fail_output: bool,
    pub fail_input: bool,
    pub deny_microphone: bool,
    pub fail_output_close: bool,
}

#[derive(Clone, Default)]
pub struct MockDevices(pub Rc<RefCell<DeviceLog>>);

impl MockDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver samples as the microphone callback would
    pub fn capture(&self, samples: &[i16]) {
        let sink = self.0.borrow_mut().mic_sink.take();
        if let Some(mut sink) = sink {
            sink(samples);
            self.0.borrow_mut().mic_sink = Some(sink);
        }
    }

    /// Report a finished source as the output device would
    pub fn finish(&self, source: SourceId) {
        if let Some(sink) = self.0.borrow().completion.as_ref() {
            sink(source);
        }
    }

    pub fn set_now(&self, now: f64) {
        self.0.borrow_mut().now = now;
    }

    pub fn scheduled(&self) -> Vec<(SourceId, f64, f64)> {
        self.0.borrow().scheduled.clone()
    }

    /// Every acquired device has been released
    pub fn all_released(&self) -> bool {
        let log = self.0.borrow();
        log.outputs_closed == log.outputs_opened
            && log.inputs_closed == log.inputs_opened
            && log.mics_stopped == log.mics_acquired
    }
}

struct MockOutput(Rc<RefCell<DeviceLog>>);

impl OutputContext for MockOutput {
    fn current_time(&self) -> f64 {
        self.0.borrow().now
    }

    fn schedule(&mut self, buffer: DecodedAudioBuffer, start_at: f64) -> LiveResult<SourceId> {
        let mut log = self.0.borrow_mut();
        let id = log.scheduled.len() as SourceId + 1;
        log.scheduled.push((id, start_at, buffer.duration_secs()));
        Ok(id)
    }

    fn close(&mut self) -> LiveResult<()> {
        let mut log = self.0.borrow_mut();
        log.outputs_closed += 1;
        if log.fail_output_close {
            return Err(LiveError::DeviceUnavailable("output wedged".to_string()));
        }
        Ok(())
    }
}

struct MockInput(Rc<RefCell<DeviceLog>>, u32);

impl InputContext for MockInput {
    fn sample_rate(&self) -> u32 {
        self.1
    }

    fn acquire_microphone(&mut self, sink: SampleSink) -> LiveResult<Box<dyn MicrophoneStream>> {
        let mut log = self.0.borrow_mut();
        if log.deny_microphone {
            return Err(LiveError::PermissionDenied("user said no".to_string()));
        }
        log.mics_acquired += 1;
        log.mic_sink = Some(sink);
        Ok(Box::new(MockMicrophone {
            log: self.0.clone(),
            stopped: false,
        }))
    }

    fn close(&mut self) -> LiveResult<()> {
        self.0.borrow_mut().inputs_closed += 1;
        Ok(())
    }
}

struct MockMicrophone {
    log: Rc<RefCell<DeviceLog>>,
    stopped: bool,
}

impl MicrophoneStream for MockMicrophone {
    fn stop_tracks(&mut self) -> LiveResult<()> {
        if !self.stopped {
            self.stopped = true;
            self.log.borrow_mut().mics_stopped += 1;
        }
        Ok(())
    }
}

impl AudioBackend for MockDevices {
    fn open_output(
        &self,
        _sample_rate: u32,
        on_complete: CompletionSink,
    ) -> LiveResult<Box<dyn OutputContext>> {
        let mut log = self.0.borrow_mut();
        if log.fail_output {
            return Err(LiveError::DeviceUnavailable("no speakers".to_string()));
        }
        log.outputs_opened += 1;
        log.completion = Some(on_complete);
        Ok(Box::new(MockOutput(self.0.clone())))
    }

    fn open_input(&self, sample_rate: u32) -> LiveResult<Box<dyn InputContext>> {
        let mut log = self.0.borrow_mut();
        if log.fail_input {
            return Err(LiveError::DeviceUnavailable("no microphone".to_string()));
        }
        log.inputs_opened += 1;
        Ok(Box::new(MockInput(self.0.clone(), sample_rate)))
    }
}

// ============================================================================
// TRANSPORT
// ============================================================================

#[derive(Default)]
pub struct WireLog {
    pub connects: usize,
    pub configs: Vec<SessionConfig>,
    pub sent: Vec<EncodedChunk>,
    pub closes: usize,
    /// Event sinks of every session ever opened, oldest first
    pub sinks: Vec<RemoteEventSink>,
    pub refuse: bool,
}

#[derive(Clone, Default)]
pub struct MockTransport(pub Rc<RefCell<WireLog>>);

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an event from the most recent session
    pub fn emit(&self, event: RemoteEvent) {
        let log = self.0.borrow();
        let sink = log.sinks.last().expect("no session opened");
        sink(event);
    }

    /// Emit an event from an earlier session
    pub fn emit_from(&self, session: usize, event: RemoteEvent) {
        let log = self.0.borrow();
        (log.sinks[session])(event);
    }

    pub fn sent(&self) -> usize {
        self.0.borrow().sent.len()
    }
}

struct MockHandle(Rc<RefCell<WireLog>>);

impl TransportHandle for MockHandle {
    fn send(&mut self, chunk: EncodedChunk) -> LiveResult<()> {
        self.0.borrow_mut().sent.push(chunk);
        Ok(())
    }

    fn close(&mut self) {
        self.0.borrow_mut().closes += 1;
    }
}

impl LiveTransport for MockTransport {
    fn connect(
        &self,
        config: &SessionConfig,
        events: RemoteEventSink,
    ) -> LiveResult<Box<dyn TransportHandle>> {
        let mut log = self.0.borrow_mut();
        if log.refuse {
            return Err(LiveError::ConnectFailed("refused".to_string()));
        }
        log.connects += 1;
        log.configs.push(config.clone());
        log.sinks.push(events);
        Ok(Box::new(MockHandle(self.0.clone())))
    }
}

// ============================================================================
// HELPERS
// ============================================================================

pub type TestController = LiveSessionController<MockDevices, MockTransport>;

pub fn settings() -> SessionSettings {
    SessionSettings {
        frame_size: 4096,
        capture_sample_rate: 16000,
        playback_sample_rate: 24000,
        connect_timeout: Some(Duration::from_secs(15)),
    }
}

pub fn controller() -> (TestController, MockDevices, MockTransport) {
    controller_with(settings())
}

pub fn controller_with(settings: SessionSettings) -> (TestController, MockDevices, MockTransport) {
    let devices = MockDevices::new();
    let transport = MockTransport::new();
    let controller = LiveSessionController::new(devices.clone(), transport.clone(), settings);
    (controller, devices, transport)
}

/// Start a session and let the service open it
pub fn active_controller() -> (TestController, MockDevices, MockTransport) {
    let (mut controller, devices, transport) = controller();
    controller.start(SessionConfig::default()).unwrap();
    transport.emit(RemoteEvent::Opened);
    controller.pump(Duration::ZERO);
    (controller, devices, transport)
}

/// Inbound chunk of 24kHz speech lasting `secs`
pub fn speech(secs: f64) -> EncodedChunk {
    let samples = (secs * 24000.0).round() as usize;
    EncodedChunk::new(vec![0; samples * 2], AudioFormat::pcm16(24000))
}
