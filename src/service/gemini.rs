//! HTTP client for the hosted Gemini API
//!
//! Uses the blocking `generateContent` endpoint. Calls are made from worker
//! threads (see [`super::jobs`]), never from the UI thread.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{CancelToken, ServiceError, StudyInput, StudyService, VoicePreset};
use crate::audio::SAMPLE_RATE;
use crate::settings::ApiSettings;
use crate::study::{Flashcard, QuizQuestion};

const SCRIPT_PROMPT: &str = "Write a concise, engaging audio narration script summarizing this material for a student. Focus on explaining concepts clearly as if speaking to a listener.";

const SUMMARY_PROMPT: &str = "Create a comprehensive summary sheet of the main points in bullet points. Return as a JSON array of strings.";

const FLASHCARDS_PROMPT: &str = "Generate a minimum of 20 high-quality active recall flashcards based on this material. You must generate at least 20 cards. If the material is extensive, generate up to 50 flashcards. Focus on key concepts, definitions, and facts.";

const QUIZ_PROMPT: &str = "Generate 10 conceptual MCQs based on this material with detailed explanations.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    data: String,
}

impl InlineData {
    /// Reject audio the player cannot handle. The speech model labels its
    /// output like `audio/L16;codec=pcm;rate=24000`; a missing label is
    /// taken as the documented default.
    fn check_pcm_format(&self) -> Result<(), ServiceError> {
        let Some(mime) = self.mime_type.as_deref() else {
            return Ok(());
        };
        let mime = mime.to_ascii_lowercase();
        let mut params = mime.split(';').map(str::trim);
        let essence = params.next().unwrap_or_default();

        if essence != "audio/l16" && essence != "audio/pcm" {
            return Err(ServiceError::Synthesis(format!(
                "unsupported audio format {}",
                mime
            )));
        }

        for param in params {
            if let Some(rate) = param.strip_prefix("rate=") {
                if rate.parse::<u32>().ok() != Some(SAMPLE_RATE) {
                    return Err(ServiceError::Synthesis(format!(
                        "unsupported sample rate {} (expected {})",
                        rate, SAMPLE_RATE
                    )));
                }
            }
        }
        Ok(())
    }
}

impl GenerateResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|content| content.parts.iter())
    }

    /// Concatenated text of the first candidate, if any
    fn text(&self) -> Option<String> {
        let text: String = self.parts().filter_map(|p| p.text.as_deref()).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// First inline-data part with a non-empty payload
    fn inline_data(&self) -> Option<&InlineData> {
        self.parts()
            .filter_map(|p| p.inline_data.as_ref())
            .find(|d| !d.data.is_empty())
    }

    fn finish_reason(&self) -> &str {
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
            .unwrap_or("no candidates")
    }
}

/// Build the `parts` array for a prompt over the study input
fn content_parts(input: &StudyInput, prompt: &str) -> Value {
    match input {
        StudyInput::Text(text) => json!([{ "text": format!("{}\n\nContent:\n{}", prompt, text) }]),
        StudyInput::Document {
            mime_type, data, ..
        } => json!([
            { "text": prompt },
            { "inlineData": { "mimeType": mime_type, "data": STANDARD.encode(data) } }
        ]),
    }
}

fn summary_schema() -> Value {
    json!({ "type": "ARRAY", "items": { "type": "STRING" } })
}

fn flashcards_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "question": { "type": "STRING" },
                "answer": { "type": "STRING" }
            },
            "required": ["question", "answer"]
        }
    })
}

fn quiz_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "question": { "type": "STRING" },
                "options": {
                    "type": "OBJECT",
                    "properties": {
                        "A": { "type": "STRING" },
                        "B": { "type": "STRING" },
                        "C": { "type": "STRING" },
                        "D": { "type": "STRING" }
                    },
                    "required": ["A", "B", "C", "D"]
                },
                "correct_answer": { "type": "STRING" },
                "explanation": { "type": "STRING" }
            },
            "required": ["question", "options", "correct_answer", "explanation"]
        }
    })
}

fn speech_request(script: &str, voice: VoicePreset) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": script }] }],
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": voice.api_name() }
                }
            }
        }
    })
}

/// Blocking Gemini client
pub struct GeminiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    text_model: String,
    speech_model: String,
}

impl GeminiClient {
    pub fn new(settings: &ApiSettings, api_key: String) -> Result<Self, ServiceError> {
        if api_key.trim().is_empty() {
            return Err(ServiceError::MissingApiKey);
        }

        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            text_model: settings.text_model.clone(),
            speech_model: settings.speech_model.clone(),
        })
    }

    /// Create a client with the key from the environment
    pub fn from_env(settings: &ApiSettings) -> Result<Self, ServiceError> {
        let key = crate::settings::api_key_from_env().ok_or(ServiceError::MissingApiKey)?;
        Self::new(settings, key)
    }

    fn generate(&self, model: &str, body: &Value) -> Result<GenerateResponse, ServiceError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        log::debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()?
            .error_for_status()?;

        Ok(response.json()?)
    }

    fn generate_json<T: DeserializeOwned>(
        &self,
        input: &StudyInput,
        prompt: &str,
        schema: Value,
    ) -> Result<T, ServiceError> {
        let body = json!({
            "contents": [{ "parts": content_parts(input, prompt) }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema
            }
        });

        let response = self.generate(&self.text_model, &body)?;
        let text = response.text().ok_or_else(|| {
            ServiceError::Generation(format!("empty response ({})", response.finish_reason()))
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl StudyService for GeminiClient {
    fn narration_script(
        &self,
        input: &StudyInput,
        cancel: &CancelToken,
    ) -> Result<String, ServiceError> {
        cancel.check()?;
        let body = json!({ "contents": [{ "parts": content_parts(input, SCRIPT_PROMPT) }] });
        let response = self.generate(&self.text_model, &body)?;
        cancel.check()?;

        response.text().ok_or_else(|| {
            ServiceError::Generation(format!(
                "script generation returned no text ({})",
                response.finish_reason()
            ))
        })
    }

    fn synthesize_speech(
        &self,
        script: &str,
        voice: VoicePreset,
        cancel: &CancelToken,
    ) -> Result<String, ServiceError> {
        cancel.check()?;
        let response = self.generate(&self.speech_model, &speech_request(script, voice))?;
        cancel.check()?;

        let audio = response.inline_data().ok_or_else(|| {
            ServiceError::Synthesis(format!(
                "no audio in response ({})",
                response.finish_reason()
            ))
        })?;
        audio.check_pcm_format()?;
        Ok(audio.data.clone())
    }

    fn summary(&self, input: &StudyInput) -> Result<Vec<String>, ServiceError> {
        self.generate_json(input, SUMMARY_PROMPT, summary_schema())
    }

    fn flashcards(&self, input: &StudyInput) -> Result<Vec<Flashcard>, ServiceError> {
        self.generate_json(input, FLASHCARDS_PROMPT, flashcards_schema())
    }

    fn quiz(&self, input: &StudyInput) -> Result<Vec<QuizQuestion>, ServiceError> {
        self.generate_json(input, QUIZ_PROMPT, quiz_schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_parts_inline_content() {
        let parts = content_parts(&StudyInput::Text("cells".to_string()), "Summarize.");
        assert_eq!(parts[0]["text"], "Summarize.\n\nContent:\ncells");
        assert_eq!(parts.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_document_parts_carry_inline_data() {
        let input = StudyInput::Document {
            name: "notes.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            data: b"%PDF".to_vec(),
        };
        let parts = content_parts(&input, "Summarize.");
        assert_eq!(parts[0]["text"], "Summarize.");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "application/pdf");
        assert_eq!(parts[1]["inlineData"]["data"], STANDARD.encode(b"%PDF"));
    }

    #[test]
    fn test_speech_request_names_voice() {
        let body = speech_request("Hello", VoicePreset::Puck);
        assert_eq!(body["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            body["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Puck"
        );
    }

    #[test]
    fn test_response_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"world"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("Hello world"));
        assert!(response.inline_data().is_none());
    }

    #[test]
    fn test_response_inline_audio() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"inlineData":{"mimeType":"audio/L16;codec=pcm;rate=24000","data":"AAAA"}}]}}]}"#,
        )
        .unwrap();
        let audio = response.inline_data().unwrap();
        assert_eq!(audio.data, "AAAA");
        assert!(audio.check_pcm_format().is_ok());
        assert_eq!(response.text(), None);
    }

    fn inline(mime_type: Option<&str>) -> InlineData {
        InlineData {
            mime_type: mime_type.map(str::to_string),
            data: "AAAA".to_string(),
        }
    }

    #[test]
    fn test_audio_format_check() {
        assert!(inline(None).check_pcm_format().is_ok());
        assert!(inline(Some("audio/pcm")).check_pcm_format().is_ok());
        assert!(inline(Some("audio/L16; codec=pcm; rate=24000"))
            .check_pcm_format()
            .is_ok());

        assert!(matches!(
            inline(Some("audio/L16;codec=pcm;rate=44100")).check_pcm_format(),
            Err(ServiceError::Synthesis(_))
        ));
        assert!(matches!(
            inline(Some("audio/mpeg")).check_pcm_format(),
            Err(ServiceError::Synthesis(_))
        ));
    }

    #[test]
    fn test_empty_response() {
        let response: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.text(), None);
        assert_eq!(response.finish_reason(), "no candidates");
    }

    #[test]
    fn test_missing_api_key() {
        let settings = ApiSettings::default();
        assert!(matches!(
            GeminiClient::new(&settings, "  ".to_string()),
            Err(ServiceError::MissingApiKey)
        ));
    }
}
