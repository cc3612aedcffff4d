//! Audio side of a live session: codec helpers, capture, playback, devices.

pub mod capture;
pub mod codec;
pub mod cpal_device;
pub mod device;
pub mod playback;
pub mod resample;

pub use capture::{CaptureNode, FrameSlicer};
pub use codec::{
    decode_chunk, encode_frame, AudioEncoding, AudioFormat, AudioFrame, DecodedAudioBuffer,
    EncodedChunk,
};
pub use cpal_device::CpalBackend;
pub use device::{
    AudioBackend, CompletionSink, InputContext, MicrophoneStream, OutputContext, SampleSink,
    SourceId,
};
pub use playback::{PlaybackCursor, PlaybackScheduler, PlaybackStats, ScheduledPlayback};
pub use resample::{resample, LinearResampler};
