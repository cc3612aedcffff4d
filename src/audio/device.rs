//! Device boundary: the audio contexts and microphone stream a session acquires.
//!
//! These handles live on the controller thread only. Device callbacks reach the
//! controller through the `Send` sinks handed in at acquisition time.

use super::codec::DecodedAudioBuffer;
use crate::error::LiveResult;

/// Handle for one buffer scheduled on an output context
pub type SourceId = u64;

/// Called from the device thread when a scheduled buffer finishes playing
pub type CompletionSink = Box<dyn Fn(SourceId) + Send + 'static>;

/// Called from the device thread with each block of captured mono samples
pub type SampleSink = Box<dyn FnMut(&[i16]) + Send + 'static>;

/// Factory for the two audio device contexts a session needs
pub trait AudioBackend {
    fn open_output(
        &self,
        sample_rate: u32,
        on_complete: CompletionSink,
    ) -> LiveResult<Box<dyn OutputContext>>;

    fn open_input(&self, sample_rate: u32) -> LiveResult<Box<dyn InputContext>>;
}

/// Output mixing context with its own clock, in seconds
pub trait OutputContext {
    fn current_time(&self) -> f64;

    /// Play `buffer` starting at `start_at` on this context's clock
    fn schedule(&mut self, buffer: DecodedAudioBuffer, start_at: f64) -> LiveResult<SourceId>;

    fn close(&mut self) -> LiveResult<()>;
}

/// Capture context; owns access to the microphone device
pub trait InputContext {
    fn sample_rate(&self) -> u32;

    /// Ask for the microphone and start delivering samples to `sink`
    fn acquire_microphone(&mut self, sink: SampleSink) -> LiveResult<Box<dyn MicrophoneStream>>;

    fn close(&mut self) -> LiveResult<()>;
}

pub trait MicrophoneStream {
    /// Stop capturing and release the device. Safe to call twice.
    fn stop_tracks(&mut self) -> LiveResult<()>;
}
