//! Background generation jobs
//!
//! Service calls block for seconds, so each one runs on its own thread and
//! reports back over a channel that the UI drains every frame. Narration is
//! a single job spanning both the script and the speech call, with one
//! cancel token threaded through both.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

use super::{CancelToken, ServiceError, StudyInput, StudyService, VoicePreset};
use crate::study::{Flashcard, QuizQuestion};

/// Progress through the narration pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    DraftingScript,
    SynthesizingAudio,
    /// Audio received; about to be decoded and played
    Finalizing,
}

impl PipelineStage {
    pub fn status(&self) -> &'static str {
        match self {
            Self::DraftingScript => "Drafting educational script...",
            Self::SynthesizingAudio => "Converting script to high-quality audio...",
            Self::Finalizing => "Finalizing playback...",
        }
    }
}

#[derive(Debug)]
pub enum JobEvent<T> {
    Stage(PipelineStage),
    Finished(Result<T, ServiceError>),
}

/// Handed to the job body for progress reports and cancellation checks
pub struct JobContext<T> {
    tx: Sender<JobEvent<T>>,
    cancel: CancelToken,
}

impl<T> JobContext<T> {
    pub fn stage(&self, stage: PipelineStage) {
        let _ = self.tx.send(JobEvent::Stage(stage));
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

/// A running background job
///
/// Dropping the handle cancels the job; its result is discarded.
pub struct Job<T> {
    rx: Receiver<JobEvent<T>>,
    cancel: CancelToken,
    done: bool,
}

impl<T: Send + 'static> Job<T> {
    pub fn spawn<F>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(&JobContext<T>) -> Result<T, ServiceError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        let ctx = JobContext {
            tx,
            cancel: cancel.clone(),
        };

        log::info!("Starting {} job", name);
        thread::spawn(move || {
            let result = body(&ctx);
            let result = match result {
                Ok(_) if ctx.cancel.is_cancelled() => Err(ServiceError::Cancelled),
                other => other,
            };
            match &result {
                Ok(_) => log::info!("{} job finished", name),
                Err(ServiceError::Cancelled) => log::info!("{} job cancelled", name),
                Err(e) => log::error!("{} job failed: {}", name, e),
            }
            let _ = ctx.tx.send(JobEvent::Finished(result));
        });

        Self {
            rx,
            cancel,
            done: false,
        }
    }
}

impl<T> Job<T> {
    /// Drain events reported since the last poll
    pub fn poll(&mut self) -> Vec<JobEvent<T>> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    if matches!(event, JobEvent::Finished(_)) {
                        self.done = true;
                    }
                    events.push(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.done {
                        self.done = true;
                        events.push(JobEvent::Finished(Err(ServiceError::Generation(
                            "worker exited unexpectedly".to_string(),
                        ))));
                    }
                    break;
                }
            }
        }
        events
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl<T> Drop for Job<T> {
    fn drop(&mut self) {
        if !self.done {
            self.cancel.cancel();
        }
    }
}

/// Script then speech, as one cancellable job yielding base64 PCM
pub fn narrate(
    service: Arc<dyn StudyService>,
    input: StudyInput,
    voice: VoicePreset,
) -> Job<String> {
    Job::spawn("narration", move |ctx| {
        ctx.stage(PipelineStage::DraftingScript);
        let script = service.narration_script(&input, ctx.cancel_token())?;
        ctx.cancel_token().check()?;

        ctx.stage(PipelineStage::SynthesizingAudio);
        let audio = service.synthesize_speech(&script, voice, ctx.cancel_token())?;

        ctx.stage(PipelineStage::Finalizing);
        Ok(audio)
    })
}

/// Which study material to generate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    Summary,
    Flashcards,
    Quiz,
}

impl MaterialKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Flashcards => "flashcards",
            Self::Quiz => "quiz",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Material {
    Summary(Vec<String>),
    Flashcards(Vec<Flashcard>),
    Quiz(Vec<QuizQuestion>),
}

pub fn generate_material(
    service: Arc<dyn StudyService>,
    input: StudyInput,
    kind: MaterialKind,
) -> Job<Material> {
    Job::spawn(kind.name(), move |_ctx| match kind {
        MaterialKind::Summary => service.summary(&input).map(Material::Summary),
        MaterialKind::Flashcards => service.flashcards(&input).map(Material::Flashcards),
        MaterialKind::Quiz => service.quiz(&input).map(Material::Quiz),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Scripted service; `gate` holds the script call until released
    pub(crate) struct FakeService {
        pub audio: Result<String, String>,
        pub gate: Mutex<Option<Receiver<()>>>,
        pub script_calls: AtomicUsize,
        pub speech_calls: AtomicUsize,
    }

    impl FakeService {
        pub fn with_audio(audio: &str) -> Self {
            Self {
                audio: Ok(audio.to_string()),
                gate: Mutex::new(None),
                script_calls: AtomicUsize::new(0),
                speech_calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                audio: Err(message.to_string()),
                ..Self::with_audio("")
            }
        }
    }

    impl StudyService for FakeService {
        fn narration_script(
            &self,
            _input: &StudyInput,
            cancel: &CancelToken,
        ) -> Result<String, ServiceError> {
            self.script_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = self.gate.lock().unwrap().take() {
                let _ = gate.recv_timeout(Duration::from_secs(5));
            }
            cancel.check()?;
            Ok("A short script.".to_string())
        }

        fn synthesize_speech(
            &self,
            _script: &str,
            _voice: VoicePreset,
            cancel: &CancelToken,
        ) -> Result<String, ServiceError> {
            cancel.check()?;
            self.speech_calls.fetch_add(1, Ordering::SeqCst);
            self.audio.clone().map_err(ServiceError::Synthesis)
        }

        fn summary(&self, _input: &StudyInput) -> Result<Vec<String>, ServiceError> {
            Ok(vec!["Point one".to_string(), "Point two".to_string()])
        }

        fn flashcards(&self, _input: &StudyInput) -> Result<Vec<Flashcard>, ServiceError> {
            Err(ServiceError::Generation("quota exceeded".to_string()))
        }

        fn quiz(&self, _input: &StudyInput) -> Result<Vec<QuizQuestion>, ServiceError> {
            Ok(Vec::new())
        }
    }

    /// Poll until the job finishes, collecting every event
    pub(crate) fn wait<T>(job: &mut Job<T>) -> Vec<JobEvent<T>> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while !job.is_done() && Instant::now() < deadline {
            events.extend(job.poll());
            thread::sleep(Duration::from_millis(5));
        }
        events
    }

    fn text() -> StudyInput {
        StudyInput::Text("Photosynthesis converts light to energy.".to_string())
    }

    #[test]
    fn test_narration_reports_stages_in_order() {
        let service = Arc::new(FakeService::with_audio("AAAA"));
        let mut job = narrate(service.clone(), text(), VoicePreset::Kore);

        let events = wait(&mut job);
        assert!(matches!(events[0], JobEvent::Stage(PipelineStage::DraftingScript)));
        assert!(matches!(events[1], JobEvent::Stage(PipelineStage::SynthesizingAudio)));
        assert!(matches!(events[2], JobEvent::Stage(PipelineStage::Finalizing)));
        match events.last() {
            Some(JobEvent::Finished(Ok(audio))) => assert_eq!(audio, "AAAA"),
            other => panic!("unexpected final event: {:?}", other),
        }
    }

    #[test]
    fn test_cancel_skips_speech_call() {
        let (release, gate) = mpsc::channel();
        let service = Arc::new(FakeService::with_audio("AAAA"));
        *service.gate.lock().unwrap() = Some(gate);

        let mut job = narrate(service.clone(), text(), VoicePreset::Puck);
        job.cancel();
        release.send(()).unwrap();

        let events = wait(&mut job);
        assert!(matches!(
            events.last(),
            Some(JobEvent::Finished(Err(ServiceError::Cancelled)))
        ));
        assert_eq!(service.speech_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_synthesis_failure_is_reported() {
        let service = Arc::new(FakeService::failing("voice unavailable"));
        let mut job = narrate(service, text(), VoicePreset::Charon);

        let events = wait(&mut job);
        assert!(matches!(
            events.last(),
            Some(JobEvent::Finished(Err(ServiceError::Synthesis(_))))
        ));
        assert!(!events
            .iter()
            .any(|e| matches!(e, JobEvent::Stage(PipelineStage::Finalizing))));
    }

    #[test]
    fn test_material_jobs() {
        let service: Arc<dyn StudyService> = Arc::new(FakeService::with_audio(""));

        let mut summary = generate_material(service.clone(), text(), MaterialKind::Summary);
        match wait(&mut summary).pop() {
            Some(JobEvent::Finished(Ok(Material::Summary(items)))) => assert_eq!(items.len(), 2),
            other => panic!("unexpected: {:?}", other),
        }

        let mut cards = generate_material(service, text(), MaterialKind::Flashcards);
        assert!(matches!(
            wait(&mut cards).pop(),
            Some(JobEvent::Finished(Err(ServiceError::Generation(_))))
        ));
    }
}
