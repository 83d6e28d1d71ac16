//! Decoded narration audio
//!
//! The speech service returns raw little-endian 16-bit mono PCM at 24 kHz,
//! base64 encoded. This module turns that payload into an immutable buffer of
//! normalized `f32` samples that the playback controller owns.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

/// Sample rate of synthesized speech
pub const SAMPLE_RATE: u32 = 24_000;

/// Errors that can occur while decoding a synthesis payload
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Audio payload is empty")]
    Empty,

    #[error("Audio payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Audio payload has an odd byte count ({0}), expected 16-bit samples")]
    OddByteCount(usize),
}

/// Fully decoded mono audio at a fixed sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl PcmBuffer {
    /// Wrap already-normalized samples
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decode a base64 string of little-endian i16 PCM at [`SAMPLE_RATE`]
    pub fn from_base64(payload: &str) -> Result<Self, DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError::Empty);
        }

        let bytes = STANDARD.decode(payload)?;
        Self::from_pcm16_le(&bytes)
    }

    /// Reinterpret raw bytes as little-endian i16 samples
    pub fn from_pcm16_le(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        if bytes.len() % 2 != 0 {
            return Err(DecodeError::OddByteCount(bytes.len()));
        }

        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect();

        Ok(Self::from_samples(samples, SAMPLE_RATE))
    }

    #[cfg(test)]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Sample at a fractional frame position, linearly interpolated.
    /// Positions outside the buffer read as silence.
    #[inline]
    pub fn sample_at(&self, frame: f64) -> f32 {
        if frame < 0.0 {
            return 0.0;
        }
        let index = frame as usize;
        let Some(&a) = self.samples.get(index) else {
            return 0.0;
        };
        let b = self.samples.get(index + 1).copied().unwrap_or(0.0);
        let t = (frame - index as f64) as f32;
        a + (b - a) * t
    }

    /// Peak envelope downsampled to roughly `points` entries, for the seek bar
    pub fn overview(&self, points: usize) -> Vec<f32> {
        if self.is_empty() || points == 0 {
            return Vec::new();
        }

        let step = (self.samples.len() / points).max(1);
        self.samples
            .chunks(step)
            .map(|chunk| chunk.iter().fold(0.0_f32, |peak, s| peak.max(s.abs())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(samples: &[f32]) -> String {
        let bytes: Vec<u8> = samples
            .iter()
            .flat_map(|s| ((s * 32768.0).round().clamp(-32768.0, 32767.0) as i16).to_le_bytes())
            .collect();
        STANDARD.encode(bytes)
    }

    #[test]
    fn test_decode_reproduces_samples() {
        let original = [0.0, 0.5, -0.5, 0.25, -1.0, 0.999, -0.123_456];
        let buffer = PcmBuffer::from_base64(&encode(&original)).unwrap();

        assert_eq!(buffer.len(), original.len());
        assert_eq!(buffer.sample_rate(), SAMPLE_RATE);
        for (decoded, expected) in buffer.samples().iter().zip(original.iter()) {
            assert!((decoded - expected).abs() <= 1.0 / 32768.0);
        }
    }

    #[test]
    fn test_decode_normalizes_extremes() {
        let bytes = [0x00, 0x80, 0xFF, 0x7F];
        let buffer = PcmBuffer::from_pcm16_le(&bytes).unwrap();
        assert_eq!(buffer.samples()[0], -1.0);
        assert!(buffer.samples()[1] < 1.0);
        assert!(buffer.samples()[1] > 0.999);
    }

    #[test]
    fn test_duration() {
        let buffer = PcmBuffer::from_samples(vec![0.0; 48_000], SAMPLE_RATE);
        assert!((buffer.duration() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_payload() {
        assert!(matches!(PcmBuffer::from_base64(""), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_malformed_base64() {
        assert!(matches!(
            PcmBuffer::from_base64("not*base64!"),
            Err(DecodeError::Base64(_))
        ));
    }

    #[test]
    fn test_odd_byte_count() {
        let payload = STANDARD.encode([1u8, 2, 3]);
        assert!(matches!(
            PcmBuffer::from_base64(&payload),
            Err(DecodeError::OddByteCount(3))
        ));
    }

    #[test]
    fn test_interpolation() {
        let buffer = PcmBuffer::from_samples(vec![0.0, 1.0], SAMPLE_RATE);
        assert!((buffer.sample_at(0.5) - 0.5).abs() < 1e-6);
        assert_eq!(buffer.sample_at(5.0), 0.0);
        assert_eq!(buffer.sample_at(-1.0), 0.0);
    }

    #[test]
    fn test_overview_peaks() {
        let buffer = PcmBuffer::from_samples(vec![0.1, -0.8, 0.3, 0.2], SAMPLE_RATE);
        assert_eq!(buffer.overview(2), vec![0.8, 0.3]);
        assert!(PcmBuffer::from_samples(Vec::new(), SAMPLE_RATE)
            .overview(10)
            .is_empty());
    }
}
