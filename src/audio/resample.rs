//! Linear rate conversion at the device boundary.
//!
//! Devices often run only at 44.1/48 kHz. The cpal adapter opens them at a rate
//! they support and converts here, so the session keeps seeing its own rates.

/// Streaming linear resampler. Carries the last input sample and the fractional
/// read position between calls, so splitting the input anywhere gives the same
/// output as one call.
#[derive(Clone, Debug)]
pub struct LinearResampler {
    /// Input samples advanced per output sample
    step: f64,
    /// Read position, relative to `prev` when there is one
    pos: f64,
    prev: Option<f32>,
}

impl LinearResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            step: from_rate.max(1) as f64 / to_rate.max(1) as f64,
            pos: 0.0,
            prev: None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.step == 1.0
    }

    /// Convert `input`, appending to `out`
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        if self.is_passthrough() {
            out.extend_from_slice(input);
            return;
        }
        if input.is_empty() {
            return;
        }

        let prev = self.prev;
        let offset = usize::from(prev.is_some());
        let len = input.len() + offset;
        let sample = |i: usize| match prev {
            Some(p) if i == 0 => p,
            _ => input[i - offset],
        };

        while (self.pos as usize) + 1 < len {
            let idx = self.pos as usize;
            let frac = (self.pos - idx as f64) as f32;
            let s0 = sample(idx);
            let s1 = sample(idx + 1);
            out.push(s0 + (s1 - s0) * frac);
            self.pos += self.step;
        }

        self.prev = Some(input[input.len() - 1]);
        self.pos -= (len - 1) as f64;
    }
}

/// One-shot conversion of a whole buffer
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    let mut resampler = LinearResampler::new(from_rate, to_rate);
    let mut out = Vec::with_capacity(
        (samples.len() as f64 * to_rate.max(1) as f64 / from_rate.max(1) as f64) as usize + 1,
    );
    resampler.process(samples, &mut out);
    out
}
