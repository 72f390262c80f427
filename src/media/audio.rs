use serde::{Deserialize, Serialize};

/// Decoded PCM audio held in memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioBuffer {
    /// Audio samples (interleaved for stereo, mono for single channel)
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Silence of the given length
    pub fn silence(sample_rate: u32, channels: u16, seconds: f64) -> Self {
        let channels = channels.max(1);
        let frames = (seconds.max(0.0) * sample_rate as f64).round() as usize;
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    /// Number of sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Copy out the `[start, end)` range, in seconds
    pub fn slice(&self, start: f64, end: f64) -> AudioBuffer {
        let ch = self.channels as usize;
        let first = ((start.max(0.0) * self.sample_rate as f64).round() as usize).min(self.frames());
        let last = ((end.max(0.0) * self.sample_rate as f64).round() as usize).clamp(first, self.frames());
        AudioBuffer::new(
            self.samples[first * ch..last * ch].to_vec(),
            self.sample_rate,
            self.channels,
        )
    }

    /// Append another buffer, converting it to this buffer's layout first
    pub fn append(&mut self, other: &AudioBuffer) {
        let converted = other.convert(self.sample_rate, self.channels);
        self.samples.extend_from_slice(&converted.samples);
    }

    /// Extend with silence up to `seconds`
    pub fn pad_to(&mut self, seconds: f64) {
        let target = (seconds * self.sample_rate as f64).round() as usize;
        if target > self.frames() {
            self.samples.resize(target * self.channels as usize, 0.0);
        }
    }

    /// Resample and remix into the requested layout
    pub fn convert(&self, sample_rate: u32, channels: u16) -> AudioBuffer {
        self.remix(channels).resample(sample_rate)
    }

    /// Change the channel count
    ///
    /// Down-mixing averages input channel `i` into output channel `i % channels`,
    /// so every input channel contributes. Up-mixing from mono repeats the
    /// mono signal; otherwise output channel `c` copies input `c % self.channels`.
    pub fn remix(&self, channels: u16) -> AudioBuffer {
        let channels = channels.max(1);
        if channels == self.channels {
            return self.clone();
        }

        let out = channels as usize;
        let mut samples = Vec::with_capacity(self.frames() * out);
        for chunk in self.samples.chunks(self.channels as usize) {
            if out < chunk.len() {
                let mut sums = vec![0.0f32; out];
                let mut counts = vec![0u32; out];
                for (i, sample) in chunk.iter().enumerate() {
                    sums[i % out] += sample;
                    counts[i % out] += 1;
                }
                samples.extend(sums.iter().zip(&counts).map(|(sum, n)| sum / *n as f32));
            } else {
                samples.extend((0..out).map(|c| chunk[c % chunk.len()]));
            }
        }
        AudioBuffer::new(samples, self.sample_rate, channels)
    }

    /// Linear-interpolation resampler
    pub fn resample(&self, sample_rate: u32) -> AudioBuffer {
        if sample_rate == self.sample_rate || self.sample_rate == 0 || self.is_empty() {
            return AudioBuffer::new(self.samples.clone(), sample_rate, self.channels);
        }

        let out_frames = (self.duration() * sample_rate as f64).round() as usize;
        let ratio = self.sample_rate as f64 / sample_rate as f64;
        let ch = self.channels as usize;
        let mut samples = Vec::with_capacity(out_frames * ch);
        for i in 0..out_frames {
            let pos = i as f64 * ratio;
            for c in 0..ch {
                samples.push(self.sample_at(pos, c));
            }
        }
        AudioBuffer::new(samples, sample_rate, self.channels)
    }

    /// Interpolated sample at a fractional frame position
    pub fn sample_at(&self, position: f64, channel: usize) -> f32 {
        let frames = self.frames();
        if frames == 0 {
            return 0.0;
        }
        let ch = self.channels as usize;
        let base = (position.max(0.0).floor() as usize).min(frames - 1);
        let next = (base + 1).min(frames - 1);
        let frac = (position - base as f64).clamp(0.0, 1.0) as f32;
        let a = self.samples[base * ch + channel];
        let b = self.samples[next * ch + channel];
        a + (b - a) * frac
    }

    /// Highest absolute sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    /// Scale down so the peak does not exceed full scale
    pub fn normalize_headroom(&mut self) {
        let peak = self.peak();
        if peak > 1.0 {
            let gain = 1.0 / peak;
            self.samples.iter_mut().for_each(|s| *s *= gain);
        }
    }

    /// Re-time the audio: output second `t` plays input second `map(t)`
    pub fn remap<F>(&self, output_duration: f64, map: F) -> AudioBuffer
    where
        F: Fn(f64) -> f64,
    {
        let rate = self.sample_rate as f64;
        let out_frames = (output_duration.max(0.0) * rate).round() as usize;
        let ch = self.channels as usize;
        let mut samples = Vec::with_capacity(out_frames * ch);
        for i in 0..out_frames {
            let source_pos = map(i as f64 / rate) * rate;
            for c in 0..ch {
                samples.push(self.sample_at(source_pos, c));
            }
        }
        AudioBuffer::new(samples, self.sample_rate, self.channels)
    }
}

/// Sum buffers aligned at time zero, padding shorter ones with silence
///
/// The output takes the highest sample rate and channel count of the inputs.
/// Returns `None` for an empty slice.
pub fn mix_buffers(buffers: &[AudioBuffer], normalize: bool) -> Option<AudioBuffer> {
    let sample_rate = buffers.iter().map(|b| b.sample_rate).max()?;
    let channels = buffers.iter().map(|b| b.channels).max()?;

    let converted: Vec<AudioBuffer> = buffers.iter().map(|b| b.convert(sample_rate, channels)).collect();
    let len = converted.iter().map(|b| b.samples.len()).max().unwrap_or(0);

    let mut samples = vec![0.0f32; len];
    for buffer in &converted {
        for (out, s) in samples.iter_mut().zip(&buffer.samples) {
            *out += s;
        }
    }

    let mut mixed = AudioBuffer::new(samples, sample_rate, channels);
    if normalize {
        mixed.normalize_headroom();
    }
    Some(mixed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(seconds: f64, value: f32) -> AudioBuffer {
        let frames = (seconds * 8000.0) as usize;
        AudioBuffer::new(vec![value; frames], 8000, 1)
    }

    #[test]
    fn test_mix_pads_to_longest() {
        let mixed = mix_buffers(&[tone(5.0, 0.25), tone(3.0, 0.25)], true).unwrap();
        assert!((mixed.duration() - 5.0).abs() < 1e-9);
        assert!((mixed.samples[0] - 0.5).abs() < 1e-6);
        assert!((mixed.samples[mixed.samples.len() - 1] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_mix_normalizes_clipping() {
        let mixed = mix_buffers(&[tone(1.0, 0.8), tone(1.0, 0.8)], true).unwrap();
        assert!((mixed.peak() - 1.0).abs() < 1e-6);

        let raw = mix_buffers(&[tone(1.0, 0.8), tone(1.0, 0.8)], false).unwrap();
        assert!((raw.peak() - 1.6).abs() < 1e-6);
    }

    #[test]
    fn test_mix_empty_is_none() {
        assert!(mix_buffers(&[], true).is_none());
    }

    #[test]
    fn test_remix_and_resample() {
        let stereo = AudioBuffer::new(vec![1.0, 0.0, 1.0, 0.0], 4, 2);
        let mono = stereo.remix(1);
        assert_eq!(mono.samples, vec![0.5, 0.5]);

        let up = tone(1.0, 0.1).resample(16000);
        assert_eq!(up.frames(), 16000);
        assert_eq!(up.sample_rate, 16000);
    }

    #[test]
    fn test_mix_uses_widest_layout() {
        let mono = AudioBuffer::new(vec![0.1; 8000], 8000, 1);
        let stereo = AudioBuffer::new(vec![0.1; 2 * 16000], 16000, 2);
        let mixed = mix_buffers(&[mono, stereo], false).unwrap();
        assert_eq!((mixed.sample_rate, mixed.channels), (16000, 2));
        assert!((mixed.duration() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_surround_downmix_keeps_every_channel() {
        // One 6-channel frame: only the centre (index 2) and right surround (index 5) carry signal
        let surround = AudioBuffer::new(vec![0.0, 0.0, 0.6, 0.0, 0.0, 0.9], 4, 6);
        let stereo = surround.remix(2);
        assert_eq!(stereo.channels, 2);
        assert!((stereo.samples[0] - 0.2).abs() < 1e-6);
        assert!((stereo.samples[1] - 0.3).abs() < 1e-6);

        let up = AudioBuffer::new(vec![0.25], 4, 1).remix(2);
        assert_eq!(up.samples, vec![0.25, 0.25]);
    }

    #[test]
    fn test_slice_and_pad() {
        let buffer = tone(2.0, 0.3);
        let mut part = buffer.slice(0.5, 1.5);
        assert!((part.duration() - 1.0).abs() < 1e-9);
        part.pad_to(3.0);
        assert!((part.duration() - 3.0).abs() < 1e-9);
    }
}
