//! Capture pipeline: microphone samples sliced into fixed-size frames

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc,
};

use super::codec::{rms_level, AudioFrame};
use super::device::SampleSink;

/// Accumulates device callbacks of any size and yields exact `frame_size` frames
pub struct FrameSlicer {
    frame_size: usize,
    sample_rate: u32,
    pending: Vec<i16>,
}

impl FrameSlicer {
    pub fn new(frame_size: usize, sample_rate: u32) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            sample_rate,
            pending: Vec::with_capacity(frame_size * 2),
        }
    }

    /// Append samples and return every frame completed by them, oldest first
    pub fn push(&mut self, samples: &[i16]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);

        let complete = self.pending.len() / self.frame_size;
        let mut frames = Vec::with_capacity(complete);
        for _ in 0..complete {
            let rest = self.pending.split_off(self.frame_size);
            let samples = std::mem::replace(&mut self.pending, rest);
            frames.push(AudioFrame {
                samples,
                sample_rate: self.sample_rate,
            });
        }
        frames
    }

    /// Samples waiting for the next frame
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

/// The frame-processing node between the microphone and the session.
///
/// While disconnected every microphone callback is a no-op, so nothing captured
/// before `connect` or after `disconnect` ever leaves the device thread.
pub struct CaptureNode {
    connected: Arc<AtomicBool>,
    level: Arc<AtomicU32>,
}

impl CaptureNode {
    pub fn new() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(false)),
            level: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Build the microphone callback feeding `on_frame`
    pub fn sink<F>(&self, frame_size: usize, sample_rate: u32, mut on_frame: F) -> SampleSink
    where
        F: FnMut(AudioFrame) + Send + 'static,
    {
        let connected = self.connected.clone();
        let level = self.level.clone();
        let mut slicer = FrameSlicer::new(frame_size, sample_rate);

        Box::new(move |samples: &[i16]| {
            if !connected.load(Ordering::SeqCst) {
                return;
            }

            level.store(rms_level(samples).to_bits(), Ordering::Relaxed);

            for frame in slicer.push(samples) {
                // Re-check per frame: disconnect may land mid-callback
                if !connected.load(Ordering::SeqCst) {
                    return;
                }
                on_frame(frame);
            }
        })
    }

    pub fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.level.store(0, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Most recent input RMS level, for a volume meter
    pub fn level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }
}

impl Default for CaptureNode {
    fn default() -> Self {
        Self::new()
    }
}
