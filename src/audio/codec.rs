//! Wire-format helpers: raw 16-bit PCM frames in, 16-bit PCM chunks out.

use crate::error::{LiveError, LiveResult};

/// Output rate of the native audio model, used when a chunk omits `rate=`
pub const SERVICE_OUTPUT_SAMPLE_RATE: u32 = 24000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioEncoding {
    /// Signed 16-bit little-endian PCM, mono
    Pcm16Le,
}

/// Format descriptor carried alongside every chunk on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    pub encoding: AudioEncoding,
    pub sample_rate: u32,
}

impl AudioFormat {
    pub fn pcm16(sample_rate: u32) -> Self {
        Self {
            encoding: AudioEncoding::Pcm16Le,
            sample_rate,
        }
    }

    /// e.g. `audio/pcm;rate=16000`
    pub fn to_mime(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }

    /// Parse a mime type such as `audio/pcm;rate=24000`
    pub fn from_mime(mime: &str) -> LiveResult<Self> {
        let mut parts = mime.split(';').map(str::trim);
        let base = parts.next().unwrap_or_default().to_ascii_lowercase();
        if base != "audio/pcm" && base != "audio/l16" {
            return Err(LiveError::DecodeFailure(format!(
                "unsupported audio format '{}'",
                mime
            )));
        }

        let mut sample_rate = SERVICE_OUTPUT_SAMPLE_RATE;
        for param in parts {
            if let Some(rate) = param.strip_prefix("rate=") {
                sample_rate = rate.parse().map_err(|_| {
                    LiveError::DecodeFailure(format!("bad sample rate in '{}'", mime))
                })?;
            }
        }

        Ok(Self::pcm16(sample_rate))
    }
}

/// One fixed-length block of captured mono samples
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Encoded audio as it travels over the duplex stream
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedChunk {
    data: Vec<u8>,
    format: AudioFormat,
}

impl EncodedChunk {
    pub fn new(data: Vec<u8>, format: AudioFormat) -> Self {
        Self { data, format }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// PCM samples ready for the output device
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedAudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudioBuffer {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Encode a captured frame as little-endian 16-bit PCM
pub fn encode_frame(frame: AudioFrame) -> EncodedChunk {
    let mut bytes = Vec::with_capacity(frame.samples.len() * 2);
    for sample in &frame.samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    EncodedChunk::new(bytes, AudioFormat::pcm16(frame.sample_rate))
}

/// Decode an inbound chunk for playback at `playback_rate`.
///
/// No resampling happens here: a chunk at any other rate is rejected.
pub fn decode_chunk(chunk: &EncodedChunk, playback_rate: u32) -> LiveResult<DecodedAudioBuffer> {
    let data = chunk.data();
    if data.is_empty() {
        return Err(LiveError::DecodeFailure("empty audio payload".to_string()));
    }
    if data.len() % 2 != 0 {
        return Err(LiveError::DecodeFailure(format!(
            "odd payload length {} for 16-bit PCM",
            data.len()
        )));
    }
    if chunk.format().sample_rate != playback_rate {
        return Err(LiveError::DecodeFailure(format!(
            "chunk rate {}Hz does not match playback rate {}Hz",
            chunk.format().sample_rate,
            playback_rate
        )));
    }

    let samples = data
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();

    Ok(DecodedAudioBuffer {
        samples,
        sample_rate: playback_rate,
    })
}

/// Root-mean-square level of a block of samples, 0.0..=1.0
pub fn rms_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64 / 32768.0).powi(2)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}
