//! Audio output
//!
//! The playback primitive is deliberately small: an output owns a running
//! clock and can start one-shot voices bound to a buffer at an offset and
//! rate. A voice cannot pause or seek; it can only be stopped or have its
//! rate changed. Every voice reports end-of-stream exactly once, whether it
//! ran out of samples or was stopped, so listeners must check which session
//! a report belongs to.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapRb,
};
use thiserror::Error;

use super::pcm::PcmBuffer;

/// Pending end-of-stream reports the audio thread can queue between polls
const ENDED_QUEUE_CAPACITY: usize = 64;

/// Errors that can occur while opening or driving the output device
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("No audio output device available")]
    NoDevice,

    #[error("Failed to query output config: {0}")]
    Config(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to build output stream: {0}")]
    Build(String),

    #[error("Failed to start output stream: {0}")]
    Play(String),

    #[error("Audio output has been closed")]
    Closed,
}

/// Identity of one playback run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// A sound-producing unit bound to one buffer
pub trait Voice {
    /// Silence the voice immediately. Idempotent.
    fn stop(&mut self);

    /// Change the playback rate without restarting
    fn set_rate(&mut self, rate: f32);
}

/// Something that can play voices against a running clock
pub trait AudioOutput {
    type Voice: Voice;

    /// Seconds elapsed on the output's clock
    fn now(&self) -> f64;

    /// Start a voice at `offset` seconds into `buffer`, advancing at `rate`
    fn start_voice(
        &mut self,
        buffer: Arc<PcmBuffer>,
        offset: f64,
        rate: f32,
        session: SessionId,
    ) -> Result<Self::Voice, OutputError>;

    /// Sessions whose voice reported end-of-stream since the last call
    fn take_ended(&mut self) -> Vec<SessionId>;

    /// Release the output device. Idempotent.
    fn close(&mut self);
}

/// Voice state shared with the audio thread
struct VoiceSlot {
    session: SessionId,
    buffer: Arc<PcmBuffer>,
    /// Read position in source frames
    cursor: f64,
    rate: Arc<AtomicU32>,
    stopped: Arc<AtomicBool>,
}

/// State touched by the output callback
struct Mixer {
    voices: Vec<VoiceSlot>,
    ended: ringbuf::HeapProd<SessionId>,
    device_rate: u32,
}

impl Mixer {
    /// Render one block of interleaved frames into `out` (mono duplicated)
    fn render(&mut self, out: &mut [f32], channels: usize) {
        out.iter_mut().for_each(|s| *s = 0.0);

        for voice in self.voices.iter_mut() {
            if voice.stopped.load(Ordering::Acquire) {
                continue;
            }

            let rate = f32::from_bits(voice.rate.load(Ordering::Relaxed)) as f64;
            let step = rate * voice.buffer.sample_rate() as f64 / self.device_rate as f64;
            let len = voice.buffer.len() as f64;

            for frame in out.chunks_mut(channels) {
                if voice.cursor >= len {
                    break;
                }
                let value = voice.buffer.sample_at(voice.cursor);
                for ch in frame.iter_mut() {
                    *ch += value;
                }
                voice.cursor += step;
            }
        }

        let ended = &mut self.ended;
        self.voices.retain(|voice| {
            let finished = voice.stopped.load(Ordering::Acquire)
                || voice.cursor >= voice.buffer.len() as f64;
            if finished {
                // Queue full means nobody is polling; the report is dropped.
                let _ = ended.try_push(voice.session);
            }
            !finished
        });
    }
}

/// Handle to a voice playing on a [`CpalOutput`]
pub struct CpalVoice {
    rate: Arc<AtomicU32>,
    stopped: Arc<AtomicBool>,
}

impl Voice for CpalVoice {
    fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn set_rate(&mut self, rate: f32) {
        self.rate.store(rate.to_bits(), Ordering::Relaxed);
    }
}

/// Output device stream with a frame-counting clock
///
/// The stream keeps running (rendering silence) while no voice is active so
/// the clock advances continuously, like a browser audio context.
pub struct CpalOutput {
    stream: Option<cpal::Stream>,
    mixer: Arc<Mutex<Mixer>>,
    ended: ringbuf::HeapCons<SessionId>,
    frames_rendered: Arc<AtomicU64>,
    device_rate: u32,
    pub device_name: String,
}

impl CpalOutput {
    /// Open the default output device
    pub fn open() -> Result<Self, OutputError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(OutputError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let config = device
            .default_output_config()
            .map_err(|e| OutputError::Config(e.to_string()))?;
        log::info!("Using output device: {} ({:?})", device_name, config);

        let device_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let (prod, cons) = HeapRb::<SessionId>::new(ENDED_QUEUE_CAPACITY).split();
        let mixer = Arc::new(Mutex::new(Mixer {
            voices: Vec::new(),
            ended: prod,
            device_rate,
        }));
        let frames_rendered = Arc::new(AtomicU64::new(0));

        let stream_config: cpal::StreamConfig = config.config();
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(
                &device,
                &stream_config,
                channels,
                Arc::clone(&mixer),
                Arc::clone(&frames_rendered),
            ),
            cpal::SampleFormat::I16 => build_stream::<i16>(
                &device,
                &stream_config,
                channels,
                Arc::clone(&mixer),
                Arc::clone(&frames_rendered),
            ),
            cpal::SampleFormat::U16 => build_stream::<u16>(
                &device,
                &stream_config,
                channels,
                Arc::clone(&mixer),
                Arc::clone(&frames_rendered),
            ),
            format => return Err(OutputError::UnsupportedFormat(format!("{:?}", format))),
        }?;

        stream
            .play()
            .map_err(|e| OutputError::Play(e.to_string()))?;

        Ok(Self {
            stream: Some(stream),
            mixer,
            ended: cons,
            frames_rendered,
            device_rate,
            device_name,
        })
    }
}

/// Frames in an interleaved block of `samples` values
fn frames_in(samples: usize, channels: usize) -> u64 {
    (samples / channels.max(1)) as u64
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    mixer: Arc<Mutex<Mixer>>,
    frames_rendered: Arc<AtomicU64>,
) -> Result<cpal::Stream, OutputError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);

                // Never block the audio thread; a contended block plays silence.
                // The clock only counts blocks the mixer rendered, so it stays
                // in step with the voice cursors.
                let rendered = match mixer.try_lock() {
                    Ok(mut mixer) => {
                        mixer.render(&mut scratch, channels);
                        true
                    }
                    Err(_) => {
                        scratch.iter_mut().for_each(|s| *s = 0.0);
                        false
                    }
                };

                for (out, value) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(value.clamp(-1.0, 1.0));
                }

                if rendered {
                    frames_rendered.fetch_add(frames_in(data.len(), channels), Ordering::Relaxed);
                }
            },
            |err| log::error!("Audio output error: {}", err),
            None,
        )
        .map_err(|e| OutputError::Build(e.to_string()))
}

impl AudioOutput for CpalOutput {
    type Voice = CpalVoice;

    fn now(&self) -> f64 {
        self.frames_rendered.load(Ordering::Relaxed) as f64 / self.device_rate as f64
    }

    fn start_voice(
        &mut self,
        buffer: Arc<PcmBuffer>,
        offset: f64,
        rate: f32,
        session: SessionId,
    ) -> Result<CpalVoice, OutputError> {
        if self.stream.is_none() {
            return Err(OutputError::Closed);
        }

        let rate_atomic = Arc::new(AtomicU32::new(rate.to_bits()));
        let stopped = Arc::new(AtomicBool::new(false));
        let cursor = offset.max(0.0) * buffer.sample_rate() as f64;

        let slot = VoiceSlot {
            session,
            buffer,
            cursor,
            rate: Arc::clone(&rate_atomic),
            stopped: Arc::clone(&stopped),
        };

        match self.mixer.lock() {
            Ok(mut mixer) => mixer.voices.push(slot),
            Err(poisoned) => poisoned.into_inner().voices.push(slot),
        }

        Ok(CpalVoice {
            rate: rate_atomic,
            stopped,
        })
    }

    fn take_ended(&mut self) -> Vec<SessionId> {
        let mut ended = Vec::new();
        while let Some(session) = self.ended.try_pop() {
            ended.push(session);
        }
        ended
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            log::info!("Closed audio output: {}", self.device_name);
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}
