//! Playback controller for the narrated audio guide
//!
//! The output only knows how to start one-shot voices, so pause, resume,
//! seek and scrubbing are all expressed as "stop the current voice and start
//! a new one at the right offset". Position is never counted up by a timer:
//! it is recomputed from the active session's start offset, the clock reading
//! when it started and the rate.

use std::sync::Arc;

use thiserror::Error;

use super::output::{AudioOutput, OutputError, SessionId, Voice};
use super::pcm::{DecodeError, PcmBuffer};

/// Slack allowed between the computed position and the end of the buffer
/// when a voice reports end-of-stream.
pub const END_TOLERANCE_SECS: f64 = 0.2;

/// Errors returned by transport operations
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("No audio loaded")]
    NotReady,

    #[error("Invalid playback rate: {0}")]
    InvalidRate(f32),

    #[error("Player has been disposed")]
    Disposed,

    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Player lifecycle
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PlayerState {
    #[default]
    Idle,
    Decoding,
    /// Loaded and paused at `position()`
    Ready,
    Playing,
    Error(String),
}

/// What a seek does when playback is paused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum SeekPolicy {
    /// Seeking always (re)starts playback
    #[default]
    AlwaysPlay,
    /// Seeking while paused only moves the resume point
    PreservePaused,
}

impl SeekPolicy {
    pub fn all() -> &'static [SeekPolicy] {
        &[Self::AlwaysPlay, Self::PreservePaused]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AlwaysPlay => "Seek resumes playback",
            Self::PreservePaused => "Seek keeps paused",
        }
    }
}

/// One continuous playback run
#[derive(Debug, Clone, Copy)]
struct PlaybackSession {
    id: SessionId,
    /// Buffer position when this run started
    start_offset: f64,
    /// Buffer position and clock reading at the last rate change
    anchor_offset: f64,
    anchor_time: f64,
}

/// Transport over a single decoded buffer
pub struct PlaybackController<O: AudioOutput> {
    output: O,
    buffer: Option<Arc<PcmBuffer>>,
    voice: Option<O::Voice>,
    session: Option<PlaybackSession>,
    next_session: u64,
    /// Resume point while not playing
    logical_offset: f64,
    rate: f32,
    state: PlayerState,
    seek_policy: SeekPolicy,
    disposed: bool,
}

impl<O: AudioOutput> PlaybackController<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            buffer: None,
            voice: None,
            session: None,
            next_session: 0,
            logical_offset: 0.0,
            rate: 1.0,
            state: PlayerState::Idle,
            seek_policy: SeekPolicy::default(),
            disposed: false,
        }
    }

    pub fn set_seek_policy(&mut self, policy: SeekPolicy) {
        self.seek_policy = policy;
    }

    /// Decode a synthesis payload and make it the current buffer.
    ///
    /// Any previous buffer is discarded. On failure the player is left in
    /// [`PlayerState::Error`] with nothing to play.
    pub fn load(&mut self, payload: &str) -> Result<(), DecodeError> {
        self.stop_voice();
        self.buffer = None;
        self.logical_offset = 0.0;
        self.state = PlayerState::Decoding;

        match PcmBuffer::from_base64(payload) {
            Ok(buffer) => {
                self.load_buffer(buffer);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to decode narration audio: {}", e);
                self.state = PlayerState::Error(e.to_string());
                Err(e)
            }
        }
    }

    /// Replace the current buffer with an already decoded one
    pub fn load_buffer(&mut self, buffer: PcmBuffer) {
        self.stop_voice();
        log::info!(
            "Loaded narration: {} samples, {:.1}s",
            buffer.len(),
            buffer.duration()
        );
        self.buffer = Some(Arc::new(buffer));
        self.logical_offset = 0.0;
        self.state = PlayerState::Ready;
    }

    /// Drop the current buffer and return to idle
    pub fn unload(&mut self) {
        self.stop_voice();
        self.buffer = None;
        self.logical_offset = 0.0;
        self.state = PlayerState::Idle;
    }

    #[cfg(test)]
    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayerState::Playing
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, PlayerState::Ready | PlayerState::Playing)
    }

    pub fn buffer(&self) -> Option<&PcmBuffer> {
        self.buffer.as_deref()
    }

    pub fn duration(&self) -> f64 {
        self.buffer.as_ref().map(|b| b.duration()).unwrap_or(0.0)
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Current position in seconds, always within `[0, duration]`
    pub fn position(&self) -> f64 {
        let duration = self.duration();
        match self.session {
            Some(session) if self.state == PlayerState::Playing => {
                self.session_position(&session).clamp(0.0, duration)
            }
            _ => self.logical_offset.clamp(0.0, duration),
        }
    }

    fn session_position(&self, session: &PlaybackSession) -> f64 {
        session.anchor_offset + (self.output.now() - session.anchor_time) * self.rate as f64
    }

    /// Start playing from `offset` seconds, replacing any running voice
    fn start_at(&mut self, offset: f64) -> Result<(), PlaybackError> {
        if self.disposed {
            return Err(PlaybackError::Disposed);
        }
        let buffer = self.buffer.clone().ok_or(PlaybackError::NotReady)?;
        let offset = if offset.is_nan() {
            0.0
        } else {
            offset.clamp(0.0, buffer.duration())
        };

        self.stop_voice();

        let id = SessionId(self.next_session);
        self.next_session += 1;

        match self.output.start_voice(buffer, offset, self.rate, id) {
            Ok(voice) => {
                let now = self.output.now();
                self.voice = Some(voice);
                self.session = Some(PlaybackSession {
                    id,
                    start_offset: offset,
                    anchor_offset: offset,
                    anchor_time: now,
                });
                self.logical_offset = offset;
                self.state = PlayerState::Playing;
                log::debug!("Started session {:?} at {:.2}s x{}", id, offset, self.rate);
                Ok(())
            }
            Err(e) => {
                self.logical_offset = offset;
                self.state = PlayerState::Ready;
                Err(e.into())
            }
        }
    }

    fn stop_voice(&mut self) {
        if let Some(mut voice) = self.voice.take() {
            voice.stop();
        }
        self.session = None;
    }

    /// Resume from the stored offset. No-op while playing.
    pub fn play(&mut self) -> Result<(), PlaybackError> {
        if self.is_playing() {
            return Ok(());
        }
        self.start_at(self.logical_offset)
    }

    /// Freeze the position as the resume point. No-op unless playing.
    pub fn pause(&mut self) {
        if !self.is_playing() {
            return;
        }
        let position = self.position();
        self.stop_voice();
        self.logical_offset = position;
        self.state = PlayerState::Ready;
    }

    pub fn toggle_play(&mut self) -> Result<(), PlaybackError> {
        if self.is_playing() {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Move by `delta` seconds relative to the current position
    pub fn seek(&mut self, delta: f64) -> Result<(), PlaybackError> {
        if self.buffer.is_none() {
            return Err(PlaybackError::NotReady);
        }
        self.seek_to(self.position() + delta)
    }

    /// Move to an absolute position, clamped to the buffer
    pub fn seek_to(&mut self, position: f64) -> Result<(), PlaybackError> {
        let duration = self.buffer.as_ref().ok_or(PlaybackError::NotReady)?.duration();
        let target = if position.is_nan() {
            0.0
        } else {
            position.clamp(0.0, duration)
        };

        if self.seek_policy == SeekPolicy::PreservePaused && !self.is_playing() {
            if self.disposed {
                return Err(PlaybackError::Disposed);
            }
            self.stop_voice();
            self.logical_offset = target;
            self.state = PlayerState::Ready;
            return Ok(());
        }

        self.start_at(target)
    }

    /// Change the playback rate. A running voice is retuned in place.
    pub fn set_rate(&mut self, rate: f32) -> Result<(), PlaybackError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(PlaybackError::InvalidRate(rate));
        }

        if let Some(session) = self.session {
            if self.is_playing() {
                // Re-anchor so time already played keeps the old rate.
                let anchor_offset = self.session_position(&session);
                let anchor_time = self.output.now();
                self.session = Some(PlaybackSession {
                    anchor_offset,
                    anchor_time,
                    ..session
                });
            }
        }
        if let Some(voice) = self.voice.as_mut() {
            voice.set_rate(rate);
        }

        self.rate = rate;
        Ok(())
    }

    /// Handle end-of-stream reports from the output.
    ///
    /// Call this from the UI refresh tick. Reports from superseded sessions
    /// are dropped; a report from the active session only ends playback when
    /// the computed position actually reached the end of the buffer.
    pub fn poll(&mut self) {
        for id in self.output.take_ended() {
            let Some(session) = self.session else {
                log::debug!("Ignoring end-of-stream from {:?}: no active session", id);
                continue;
            };
            if session.id != id {
                log::debug!(
                    "Ignoring end-of-stream from {:?}: superseded by {:?}",
                    id,
                    session.id
                );
                continue;
            }

            let final_position = self.session_position(&session);
            if final_position >= self.duration() - END_TOLERANCE_SECS {
                log::info!(
                    "Narration finished (session {:?}, started at {:.2}s)",
                    id,
                    session.start_offset
                );
                self.voice = None;
                self.session = None;
                self.logical_offset = 0.0;
                self.state = PlayerState::Ready;
            } else {
                log::debug!(
                    "Ignoring early end-of-stream from {:?} at {:.2}s",
                    id,
                    final_position
                );
            }
        }
    }

    /// Stop playback and release the output. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if self.is_playing() {
            self.pause();
        }
        self.stop_voice();
        self.output.close();
        self.disposed = true;
    }
}

impl<O: AudioOutput> Drop for PlaybackController<O> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::audio::pcm::SAMPLE_RATE;

    #[derive(Debug)]
    pub(crate) struct FakeVoiceRecord {
        pub session: SessionId,
        pub offset: f64,
        pub rate: f32,
        pub stopped: bool,
    }

    #[derive(Debug, Default)]
    pub(crate) struct FakeShared {
        pub now: f64,
        pub voices: Vec<FakeVoiceRecord>,
        pub ended: Vec<SessionId>,
        pub closed: bool,
    }

    /// Output with a manual clock that records every voice it starts
    #[derive(Clone, Default)]
    pub(crate) struct FakeOutput {
        pub shared: Rc<RefCell<FakeShared>>,
    }

    impl FakeOutput {
        pub fn advance(&self, secs: f64) {
            self.shared.borrow_mut().now += secs;
        }

        /// Let a voice run out of samples on its own
        pub fn finish(&self, index: usize) {
            let mut shared = self.shared.borrow_mut();
            let shared = &mut *shared;
            let record = &mut shared.voices[index];
            if !record.stopped {
                record.stopped = true;
                shared.ended.push(record.session);
            }
        }

        pub fn active_voices(&self) -> usize {
            self.shared.borrow().voices.iter().filter(|v| !v.stopped).count()
        }

        pub fn voice_count(&self) -> usize {
            self.shared.borrow().voices.len()
        }
    }

    pub(crate) struct FakeVoice {
        shared: Rc<RefCell<FakeShared>>,
        index: usize,
    }

    impl Voice for FakeVoice {
        fn stop(&mut self) {
            let mut shared = self.shared.borrow_mut();
            let shared = &mut *shared;
            let record = &mut shared.voices[self.index];
            if !record.stopped {
                record.stopped = true;
                shared.ended.push(record.session);
            }
        }

        fn set_rate(&mut self, rate: f32) {
            self.shared.borrow_mut().voices[self.index].rate = rate;
        }
    }

    impl AudioOutput for FakeOutput {
        type Voice = FakeVoice;

        fn now(&self) -> f64 {
            self.shared.borrow().now
        }

        fn start_voice(
            &mut self,
            _buffer: Arc<PcmBuffer>,
            offset: f64,
            rate: f32,
            session: SessionId,
        ) -> Result<FakeVoice, OutputError> {
            let mut shared = self.shared.borrow_mut();
            if shared.closed {
                return Err(OutputError::Closed);
            }
            shared.voices.push(FakeVoiceRecord {
                session,
                offset,
                rate,
                stopped: false,
            });
            Ok(FakeVoice {
                shared: Rc::clone(&self.shared),
                index: shared.voices.len() - 1,
            })
        }

        fn take_ended(&mut self) -> Vec<SessionId> {
            std::mem::take(&mut self.shared.borrow_mut().ended)
        }

        fn close(&mut self) {
            self.shared.borrow_mut().closed = true;
        }
    }

    pub(crate) fn silence(secs: f64) -> PcmBuffer {
        PcmBuffer::from_samples(vec![0.0; (secs * SAMPLE_RATE as f64) as usize], SAMPLE_RATE)
    }

    fn player(secs: f64) -> (PlaybackController<FakeOutput>, FakeOutput) {
        let output = FakeOutput::default();
        let mut player = PlaybackController::new(output.clone());
        player.load_buffer(silence(secs));
        (player, output)
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_position_tracks_clock_and_rate() {
        let (mut player, output) = player(30.0);
        player.play().unwrap();

        output.advance(2.0);
        assert_close(player.position(), 2.0);

        player.set_rate(2.0).unwrap();
        output.advance(1.5);
        assert_close(player.position(), 5.0);

        // Rate changes retune the running voice instead of restarting it
        assert_eq!(output.voice_count(), 1);
        assert_eq!(output.shared.borrow().voices[0].rate, 2.0);
    }

    #[test]
    fn test_position_never_exceeds_duration() {
        let (mut player, output) = player(10.0);
        player.play().unwrap();
        output.advance(25.0);
        assert_close(player.position(), 10.0);
    }

    #[test]
    fn test_pause_resume_is_continuous() {
        let (mut player, output) = player(30.0);
        player.play().unwrap();
        output.advance(3.0);

        player.pause();
        assert!(!player.is_playing());
        assert_close(player.position(), 3.0);

        output.advance(5.0);
        assert_close(player.position(), 3.0);

        player.play().unwrap();
        assert_close(player.position(), 3.0);
        assert_close(output.shared.borrow().voices[1].offset, 3.0);

        output.advance(1.0);
        assert_close(player.position(), 4.0);
    }

    #[test]
    fn test_pause_and_play_are_idempotent() {
        let (mut player, output) = player(30.0);
        player.pause();
        assert_eq!(output.voice_count(), 0);

        player.play().unwrap();
        player.play().unwrap();
        assert_eq!(output.voice_count(), 1);
    }

    #[test]
    fn test_seek_clamps_to_buffer() {
        let (mut player, output) = player(30.0);
        player.play().unwrap();

        player.seek_to(-5.0).unwrap();
        assert_close(player.position(), 0.0);

        player.seek_to(40.0).unwrap();
        assert_close(player.position(), 30.0);

        player.seek_to(12.0).unwrap();
        output.advance(3.0);
        player.seek(-20.0).unwrap();
        assert_close(player.position(), 0.0);

        player.seek(10.0).unwrap();
        assert_close(player.position(), 10.0);
    }

    #[test]
    fn test_seek_restarts_playback_by_default() {
        let (mut player, output) = player(30.0);
        player.seek(10.0).unwrap();
        assert!(player.is_playing());
        assert_close(output.shared.borrow().voices[0].offset, 10.0);
    }

    #[test]
    fn test_seek_can_preserve_pause() {
        let (mut player, output) = player(30.0);
        player.set_seek_policy(SeekPolicy::PreservePaused);

        player.seek(10.0).unwrap();
        assert!(!player.is_playing());
        assert_close(player.position(), 10.0);
        assert_eq!(output.voice_count(), 0);

        player.play().unwrap();
        player.seek(5.0).unwrap();
        assert!(player.is_playing());
        assert_close(player.position(), 15.0);
    }

    #[test]
    fn test_only_one_voice_active() {
        let (mut player, output) = player(30.0);
        player.play().unwrap();
        player.seek(5.0).unwrap();
        player.seek(-2.0).unwrap();
        player.play().unwrap();

        assert_eq!(output.voice_count(), 3);
        assert_eq!(output.active_voices(), 1);
    }

    #[test]
    fn test_stale_end_of_stream_ignored() {
        let (mut player, output) = player(10.0);
        player.play().unwrap();
        output.advance(9.9);

        // Seek stops the first voice, which reports end-of-stream late
        player.seek_to(2.0).unwrap();
        output.advance(0.5);
        player.poll();

        assert!(player.is_playing());
        assert_close(player.position(), 2.5);
    }

    #[test]
    fn test_stale_end_of_stream_near_tail_ignored() {
        let (mut player, output) = player(10.0);
        player.play().unwrap();
        output.advance(1.0);

        // The new run sits inside the end tolerance, so only the session
        // identity keeps the first voice's report from ending it.
        player.seek_to(9.9).unwrap();
        player.poll();

        assert!(player.is_playing());
        assert_close(player.position(), 9.9);
        assert_eq!(output.active_voices(), 1);
    }

    #[test]
    fn test_end_of_track_resets_to_start() {
        let (mut player, output) = player(10.0);
        player.play().unwrap();

        output.advance(10.0);
        output.finish(0);
        player.poll();

        assert!(!player.is_playing());
        assert!(player.is_ready());
        assert_close(player.position(), 0.0);

        player.play().unwrap();
        assert_close(output.shared.borrow().voices[1].offset, 0.0);
    }

    #[test]
    fn test_end_within_tolerance_counts_as_finished() {
        let (mut player, output) = player(10.0);
        player.play().unwrap();
        output.advance(9.85);
        output.finish(0);
        player.poll();
        assert!(!player.is_playing());
    }

    #[test]
    fn test_early_end_of_stream_ignored() {
        let (mut player, output) = player(10.0);
        player.play().unwrap();
        output.advance(4.0);
        output.finish(0);
        player.poll();

        assert!(player.is_playing());
        assert_close(player.position(), 4.0);
    }

    #[test]
    fn test_transport_requires_buffer() {
        let mut player = PlaybackController::new(FakeOutput::default());
        assert!(matches!(player.play(), Err(PlaybackError::NotReady)));
        assert!(matches!(player.seek(5.0), Err(PlaybackError::NotReady)));
        assert_close(player.position(), 0.0);
        assert_close(player.duration(), 0.0);
    }

    #[test]
    fn test_decode_failure_leaves_nothing_to_play() {
        let output = FakeOutput::default();
        let mut player = PlaybackController::new(output.clone());
        assert!(player.load("%%%").is_err());
        assert!(matches!(player.state(), PlayerState::Error(_)));
        assert!(matches!(player.play(), Err(PlaybackError::NotReady)));
        assert_eq!(output.voice_count(), 0);
    }

    #[test]
    fn test_load_replaces_buffer_and_stops_voice() {
        let (mut player, output) = player(30.0);
        player.play().unwrap();
        output.advance(4.0);

        player.load_buffer(silence(5.0));
        assert_eq!(output.active_voices(), 0);
        assert_eq!(*player.state(), PlayerState::Ready);
        assert_close(player.duration(), 5.0);
        assert_close(player.position(), 0.0);
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let (mut player, _output) = player(30.0);
        assert!(matches!(player.set_rate(0.0), Err(PlaybackError::InvalidRate(_))));
        assert!(matches!(player.set_rate(-1.0), Err(PlaybackError::InvalidRate(_))));
        assert!(player.set_rate(f32::NAN).is_err());
        assert_eq!(player.rate(), 1.0);
    }

    #[test]
    fn test_rate_applies_to_next_run() {
        let (mut player, output) = player(30.0);
        player.set_rate(1.5).unwrap();
        player.play().unwrap();
        assert_eq!(output.shared.borrow().voices[0].rate, 1.5);

        output.advance(2.0);
        assert_close(player.position(), 3.0);
    }

    #[test]
    fn test_dispose_without_playback() {
        let output = FakeOutput::default();
        let mut player = PlaybackController::new(output.clone());
        player.dispose();
        player.dispose();
        assert!(output.shared.borrow().closed);
    }

    #[test]
    fn test_dispose_stops_voice_and_blocks_transport() {
        let (mut player, output) = player(30.0);
        player.play().unwrap();
        player.dispose();

        assert_eq!(output.active_voices(), 0);
        assert!(output.shared.borrow().closed);
        assert!(matches!(player.play(), Err(PlaybackError::Disposed)));
    }

    #[test]
    fn test_drop_releases_output() {
        let (mut player, output) = player(30.0);
        player.play().unwrap();
        drop(player);
        assert_eq!(output.active_voices(), 0);
        assert!(output.shared.borrow().closed);
    }
}
