//! Audio module - narration decoding and playback
//!
//! This module provides:
//! - Decoding of synthesized PCM payloads
//! - The output primitive (one-shot voices on a running clock)
//! - The playback controller with pause, seek and rate control

mod controller;
mod output;
mod pcm;

pub use controller::{PlaybackController, PlaybackError, SeekPolicy};
pub use output::{AudioOutput, CpalOutput};
pub use pcm::{PcmBuffer, SAMPLE_RATE};

#[cfg(test)]
pub(crate) use controller::tests::FakeOutput;
