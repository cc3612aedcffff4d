//! cpal implementation of the device boundary

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use super::codec::DecodedAudioBuffer;
use super::resample::{resample, LinearResampler};
use super::device::{
    AudioBackend, CompletionSink, InputContext, MicrophoneStream, OutputContext, SampleSink,
    SourceId,
};
use crate::error::{LiveError, LiveResult};

fn default_host() -> cpal::Host {
    // Use WASAPI explicitly on Windows for better compatibility
    #[cfg(target_os = "windows")]
    let host = cpal::host_from_id(cpal::HostId::Wasapi).unwrap_or(cpal::default_host());
    #[cfg(not(target_os = "windows"))]
    let host = cpal::default_host();
    host
}

/// Classify a device error string: permission problems vs. everything else
fn device_error(context: &str, err: impl std::fmt::Display) -> LiveError {
    let msg = format!("{}: {}", context, err);
    let lower = msg.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        LiveError::PermissionDenied(msg)
    } else {
        LiveError::DeviceUnavailable(msg)
    }
}

/// Only F32 and I16 streams are built
fn unsupported_format(kind: &str, format: cpal::SampleFormat) -> LiveError {
    LiveError::DeviceUnavailable(format!("Unsupported {} format {:?}", kind, format))
}

/// Rate to open a device at: the session's rate if the device supports it in its
/// default format, otherwise the device's native rate
fn stream_rate<I>(ranges: Option<I>, default: &cpal::SupportedStreamConfig, wanted: u32) -> u32
where
    I: Iterator<Item = cpal::SupportedStreamConfigRange>,
{
    let supported = ranges.is_some_and(|mut ranges| {
        ranges.any(|range| {
            range.channels() == default.channels()
                && range.sample_format() == default.sample_format()
                && range.min_sample_rate() <= wanted
                && wanted <= range.max_sample_rate()
        })
    });
    if supported {
        wanted
    } else {
        default.sample_rate()
    }
}

/// Audio devices of the default cpal host
#[derive(Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    fn open_output(
        &self,
        sample_rate: u32,
        on_complete: CompletionSink,
    ) -> LiveResult<Box<dyn OutputContext>> {
        Ok(Box::new(CpalOutput::open(sample_rate, on_complete)?))
    }

    fn open_input(&self, sample_rate: u32) -> LiveResult<Box<dyn InputContext>> {
        Ok(Box::new(CpalInput::open(sample_rate)?))
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

struct Voice {
    id: SourceId,
    start_frame: u64,
    samples: Vec<f32>,
}

/// Everything the output callback touches
struct Timeline {
    voices: Vec<Voice>,
    mix: Vec<f32>,
}

/// Output context: a frame counter is the clock, voices are mixed onto it.
///
/// Buffers arrive at the session rate and are converted to the device rate
/// when scheduled; the clock still reads in seconds.
pub struct CpalOutput {
    device_rate: u32,
    frames_played: Arc<AtomicU64>,
    timeline: Arc<Mutex<Timeline>>,
    stream: Option<cpal::Stream>,
    next_id: SourceId,
}

impl CpalOutput {
    pub fn open(sample_rate: u32, on_complete: CompletionSink) -> LiveResult<Self> {
        let host = default_host();
        let device = host.default_output_device().ok_or_else(|| {
            LiveError::DeviceUnavailable("No audio output device available".to_string())
        })?;
        let default_config = device
            .default_output_config()
            .map_err(|e| device_error("Output device", e))?;

        let channels = default_config.channels().max(1);
        let device_rate = stream_rate(
            device.supported_output_configs().ok(),
            &default_config,
            sample_rate,
        );
        let config = cpal::StreamConfig {
            channels,
            sample_rate: device_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let frames_played = Arc::new(AtomicU64::new(0));
        let timeline = Arc::new(Mutex::new(Timeline {
            voices: Vec::new(),
            mix: Vec::new(),
        }));
        let err_fn = |err| log::error!("[Playback] Audio stream error: {}", err);

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::I16 => {
                let render = renderer::<i16>(
                    channels as usize,
                    frames_played.clone(),
                    timeline.clone(),
                    on_complete,
                );
                device.build_output_stream(&config, render, err_fn, None)
            }
            cpal::SampleFormat::F32 => {
                let render = renderer::<f32>(
                    channels as usize,
                    frames_played.clone(),
                    timeline.clone(),
                    on_complete,
                );
                device.build_output_stream(&config, render, err_fn, None)
            }
            other => return Err(unsupported_format("output", other)),
        }
        .map_err(|e| device_error("Output stream", e))?;

        stream.play().map_err(|e| device_error("Output stream", e))?;

        log::info!(
            "[Playback] Output opened at {}Hz ({}Hz session audio), {} channel(s)",
            device_rate,
            sample_rate,
            channels
        );

        Ok(Self {
            device_rate,
            frames_played,
            timeline,
            stream: Some(stream),
            next_id: 1,
        })
    }
}

/// Build the device callback: mix overlapping voices, advance the clock, retire finished voices
fn renderer<T>(
    channels: usize,
    frames_played: Arc<AtomicU64>,
    timeline: Arc<Mutex<Timeline>>,
    on_complete: CompletionSink,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        let frames = data.len() / channels;
        let origin = frames_played.load(Ordering::SeqCst);
        let end = origin + frames as u64;
        let mut finished = Vec::new();

        if let Ok(mut timeline) = timeline.lock() {
            let Timeline { voices, mix } = &mut *timeline;
            mix.clear();
            mix.resize(frames, 0.0);

            for voice in voices.iter() {
                let voice_end = voice.start_frame + voice.samples.len() as u64;
                let from = voice.start_frame.max(origin);
                let to = voice_end.min(end);
                for t in from..to {
                    mix[(t - origin) as usize] += voice.samples[(t - voice.start_frame) as usize];
                }
            }

            voices.retain(|voice| {
                let done = voice.start_frame + voice.samples.len() as u64 <= end;
                if done {
                    finished.push(voice.id);
                }
                !done
            });

            for (frame, sample) in data.chunks_mut(channels).zip(mix.iter()) {
                let value = T::from_sample(sample.clamp(-1.0, 1.0));
                for out in frame.iter_mut() {
                    *out = value;
                }
            }
        } else {
            for out in data.iter_mut() {
                *out = T::EQUILIBRIUM;
            }
        }

        frames_played.store(end, Ordering::SeqCst);
        for id in finished {
            on_complete(id);
        }
    }
}

impl OutputContext for CpalOutput {
    fn current_time(&self) -> f64 {
        self.frames_played.load(Ordering::SeqCst) as f64 / self.device_rate as f64
    }

    fn schedule(&mut self, buffer: DecodedAudioBuffer, start_at: f64) -> LiveResult<SourceId> {
        if self.stream.is_none() {
            return Err(LiveError::DeviceUnavailable(
                "Output context is closed".to_string(),
            ));
        }

        let id = self.next_id;
        self.next_id += 1;
        let start_frame = (start_at.max(0.0) * self.device_rate as f64).round() as u64;
        let samples = if buffer.sample_rate == self.device_rate {
            buffer.samples
        } else {
            resample(&buffer.samples, buffer.sample_rate, self.device_rate)
        };

        let mut timeline = self
            .timeline
            .lock()
            .map_err(|_| LiveError::DeviceUnavailable("Output timeline poisoned".to_string()))?;
        timeline.voices.push(Voice {
            id,
            start_frame,
            samples,
        });
        Ok(id)
    }

    fn close(&mut self) -> LiveResult<()> {
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.voices.clear();
        }
        if let Some(stream) = self.stream.take() {
            let result = stream.pause();
            drop(stream);
            result.map_err(|e| device_error("Output stream", e))?;
            log::debug!("[Playback] Output closed");
        }
        Ok(())
    }
}

// ============================================================================
// INPUT
// ============================================================================

/// Input context bound to the default microphone. Samples reach the sink mono
/// and at `sample_rate`, whatever the device runs at.
pub struct CpalInput {
    sample_rate: u32,
    device: Option<cpal::Device>,
}

impl CpalInput {
    pub fn open(sample_rate: u32) -> LiveResult<Self> {
        let host = default_host();
        let device = host.default_input_device().ok_or_else(|| {
            LiveError::DeviceUnavailable(
                "No microphone available. Please connect a microphone.".to_string(),
            )
        })?;
        Ok(Self {
            sample_rate,
            device: Some(device),
        })
    }
}

impl InputContext for CpalInput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn acquire_microphone(&mut self, mut sink: SampleSink) -> LiveResult<Box<dyn MicrophoneStream>> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| LiveError::DeviceUnavailable("Input context is closed".to_string()))?;
        let default_config = device
            .default_input_config()
            .map_err(|e| device_error("Microphone", e))?;

        let channels = default_config.channels().max(1) as usize;
        let device_rate = stream_rate(
            device.supported_input_configs().ok(),
            &default_config,
            self.sample_rate,
        );
        let config = cpal::StreamConfig {
            channels: channels as u16,
            sample_rate: device_rate,
            buffer_size: cpal::BufferSize::Default,
        };
        let err_fn = |err| log::error!("[Capture] Audio stream error: {}", err);

        let mut resampler = LinearResampler::new(device_rate, self.sample_rate);
        let mut mono = Vec::new();
        let mut converted = Vec::new();
        let mut deliver = move |mono: &[f32], converted: &mut Vec<f32>| {
            converted.clear();
            resampler.process(mono, converted);
            let samples: Vec<i16> = converted
                .iter()
                .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .collect();
            if !samples.is_empty() {
                sink(&samples);
            }
        };

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &_| {
                    mono.clear();
                    mono.extend(
                        data.chunks(channels)
                            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
                    );
                    deliver(&mono, &mut converted);
                },
                err_fn,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &_| {
                    mono.clear();
                    mono.extend(data.chunks(channels).map(|frame| {
                        let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                        sum as f32 / channels as f32 / 32768.0
                    }));
                    deliver(&mono, &mut converted);
                },
                err_fn,
                None,
            ),
            other => return Err(unsupported_format("microphone", other)),
        }
        .map_err(|e| device_error("Microphone", e))?;

        stream.play().map_err(|e| device_error("Microphone", e))?;

        log::info!(
            "[Capture] Microphone opened at {}Hz ({}Hz session audio), {} channel(s)",
            device_rate,
            self.sample_rate,
            channels
        );

        Ok(Box::new(CpalMicrophone {
            stream: Some(stream),
        }))
    }

    fn close(&mut self) -> LiveResult<()> {
        self.device = None;
        Ok(())
    }
}

pub struct CpalMicrophone {
    stream: Option<cpal::Stream>,
}

impl MicrophoneStream for CpalMicrophone {
    fn stop_tracks(&mut self) -> LiveResult<()> {
        if let Some(stream) = self.stream.take() {
            let result = stream.pause();
            drop(stream);
            result.map_err(|e| device_error("Microphone", e))?;
            log::debug!("[Capture] Microphone stopped");
        }
        Ok(())
    }
}
