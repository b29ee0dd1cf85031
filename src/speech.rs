use std::time::Duration;

/// Sample rate of synthesized LINEAR16 narration audio
pub const SPEECH_SAMPLE_RATE: u32 = 16_000;

/// Mono PCM clip ready for playback, samples normalised to [-1.0, 1.0).
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechClip {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SpeechClip {
    /// Decode little-endian signed 16-bit PCM. A trailing odd byte is ignored.
    pub fn from_linear16(bytes: &[u8], sample_rate: u32) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect();
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}
