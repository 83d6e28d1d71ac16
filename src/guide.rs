//! Audio guide - narration generation plus transport
//!
//! Owns the narration job and the playback controller for one study session
//! and exposes the operations the audio tab needs. Failures never escape as
//! errors: they become a one-shot notification and the guide returns to a
//! state where the user can try again.

use std::sync::Arc;

use crate::audio::{AudioOutput, PcmBuffer, PlaybackController, PlaybackError, SeekPolicy};
use crate::service::jobs::{self, Job, JobEvent};
use crate::service::{ServiceError, StudyInput, StudyService, VoicePreset};

const GENERATION_FAILED: &str =
    "Something went wrong with the audio generation. Please try again in a few moments.";

pub struct AudioGuide<O: AudioOutput> {
    player: PlaybackController<O>,
    service: Arc<dyn StudyService>,
    input: StudyInput,
    voice: VoicePreset,
    job: Option<Job<String>>,
    status: Option<&'static str>,
    notification: Option<String>,
}

impl<O: AudioOutput> AudioGuide<O> {
    pub fn new(output: O, service: Arc<dyn StudyService>, input: StudyInput) -> Self {
        Self {
            player: PlaybackController::new(output),
            service,
            input,
            voice: VoicePreset::default(),
            job: None,
            status: None,
            notification: None,
        }
    }

    /// Generate narration for the session input with `voice`, replacing any
    /// previous narration or in-flight generation.
    pub fn generate(&mut self, voice: VoicePreset) {
        self.cancel_job();
        self.player.unload();
        self.voice = voice;
        self.notification = None;

        log::info!("Generating narration with voice {}", voice.api_name());
        self.job = Some(jobs::narrate(
            Arc::clone(&self.service),
            self.input.clone(),
            voice,
        ));
        self.status = Some(jobs::PipelineStage::DraftingScript.status());
    }

    /// Pick a voice. Existing narration is discarded if the voice changes.
    pub fn select_voice(&mut self, voice: VoicePreset) {
        if voice == self.voice {
            return;
        }
        self.voice = voice;
        if self.is_generating() || self.player.is_ready() {
            self.cancel_job();
            self.player.unload();
        }
    }

    fn cancel_job(&mut self) {
        if let Some(job) = self.job.take() {
            job.cancel();
        }
        self.status = None;
    }

    /// Drain job progress and playback events. Call once per UI frame.
    pub fn poll(&mut self) {
        let events = match self.job.as_mut() {
            Some(job) => job.poll(),
            None => Vec::new(),
        };

        for event in events {
            match event {
                JobEvent::Stage(stage) => self.status = Some(stage.status()),
                JobEvent::Finished(result) => {
                    self.job = None;
                    self.finish_generation(result);
                }
            }
        }

        self.player.poll();
    }

    fn finish_generation(&mut self, result: Result<String, ServiceError>) {
        match result {
            Ok(payload) => {
                match self.player.load(&payload) {
                    Ok(()) => {
                        if let Err(e) = self.player.play() {
                            log::error!("Failed to start narration: {}", e);
                            self.notification = Some(format!("Playback failed: {}", e));
                        }
                    }
                    Err(_) => self.notification = Some(GENERATION_FAILED.to_string()),
                }
            }
            Err(ServiceError::Cancelled) => {}
            Err(ServiceError::MissingApiKey) => {
                self.notification = Some(ServiceError::MissingApiKey.to_string());
            }
            Err(_) => self.notification = Some(GENERATION_FAILED.to_string()),
        }
        self.status = None;
    }

    fn report(&mut self, result: Result<(), PlaybackError>) {
        if let Err(e) = result {
            log::warn!("Transport action failed: {}", e);
            self.notification = Some(e.to_string());
        }
    }

    pub fn toggle_play(&mut self) {
        let result = self.player.toggle_play();
        self.report(result);
    }

    pub fn pause(&mut self) {
        self.player.pause();
    }

    pub fn seek(&mut self, delta_secs: f64) {
        let result = self.player.seek(delta_secs);
        self.report(result);
    }

    pub fn seek_to(&mut self, position_secs: f64) {
        let result = self.player.seek_to(position_secs);
        self.report(result);
    }

    pub fn set_rate(&mut self, rate: f32) {
        let result = self.player.set_rate(rate);
        self.report(result);
    }

    pub fn set_seek_policy(&mut self, policy: SeekPolicy) {
        self.player.set_seek_policy(policy);
    }

    pub fn is_generating(&self) -> bool {
        self.job.is_some()
    }

    /// Progress message while generating
    pub fn status(&self) -> Option<&'static str> {
        self.status
    }

    /// One-shot message for the user; cleared once taken
    pub fn take_notification(&mut self) -> Option<String> {
        self.notification.take()
    }

    pub fn voice(&self) -> VoicePreset {
        self.voice
    }

    pub fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    pub fn is_ready(&self) -> bool {
        self.player.is_ready()
    }

    pub fn current_time(&self) -> f64 {
        self.player.position()
    }

    pub fn duration(&self) -> f64 {
        self.player.duration()
    }

    pub fn rate(&self) -> f32 {
        self.player.rate()
    }

    pub fn buffer(&self) -> Option<&PcmBuffer> {
        self.player.buffer()
    }

    /// Stop everything and release the audio output
    pub fn dispose(&mut self) {
        self.cancel_job();
        self.player.dispose();
    }
}
