//! Generation service - everything produced by the hosted model
//!
//! The app treats the model as a black box behind [`StudyService`]: it turns
//! study input into a narration script, a script into speech, and study
//! input into summary, flashcards and a quiz.

pub mod gemini;
pub mod jobs;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::study::{Flashcard, QuizQuestion};

pub use gemini::GeminiClient;

/// Errors that can occur while talking to the generation service
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("No API key configured (set GEMINI_API_KEY)")]
    MissingApiKey,

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Cancelled")]
    Cancelled,
}

/// Material the user wants to study
#[derive(Debug, Clone)]
pub enum StudyInput {
    Text(String),
    Document {
        name: String,
        mime_type: String,
        data: Vec<u8>,
    },
}

impl StudyInput {
    /// Load a PDF from disk. Anything that is not a PDF is rejected.
    pub fn from_pdf(path: &Path) -> Result<Self, std::io::Error> {
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if !is_pdf {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Please upload a PDF file.",
            ));
        }

        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf")
            .to_string();

        Ok(Self::Document {
            name,
            mime_type: "application/pdf".to_string(),
            data,
        })
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Document { data, .. } => data.is_empty(),
        }
    }
}

/// Prebuilt narrator voices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VoicePreset {
    #[default]
    Kore,
    Puck,
    Charon,
    Zephyr,
}

impl VoicePreset {
    pub fn all() -> &'static [VoicePreset] {
        &[Self::Kore, Self::Puck, Self::Charon, Self::Zephyr]
    }

    /// Voice name understood by the speech model
    pub fn api_name(&self) -> &'static str {
        match self {
            Self::Kore => "Kore",
            Self::Puck => "Puck",
            Self::Charon => "Charon",
            Self::Zephyr => "Zephyr",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Kore => "Classic",
            Self::Puck => "Warm",
            Self::Charon => "Deep",
            Self::Zephyr => "Cheerful",
        }
    }
}

/// Shared cancellation flag passed through multi-step generation
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<(), ServiceError> {
        if self.is_cancelled() {
            Err(ServiceError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// The hosted model, seen from the app
pub trait StudyService: Send + Sync {
    /// Write a narration script for the material
    fn narration_script(
        &self,
        input: &StudyInput,
        cancel: &CancelToken,
    ) -> Result<String, ServiceError>;

    /// Speak a script; returns base64 little-endian 16-bit PCM at 24 kHz
    fn synthesize_speech(
        &self,
        script: &str,
        voice: VoicePreset,
        cancel: &CancelToken,
    ) -> Result<String, ServiceError>;

    fn summary(&self, input: &StudyInput) -> Result<Vec<String>, ServiceError>;

    fn flashcards(&self, input: &StudyInput) -> Result<Vec<Flashcard>, ServiceError>;

    fn quiz(&self, input: &StudyInput) -> Result<Vec<QuizQuestion>, ServiceError>;
}
