use crate::config::Config;
use crate::model::PrescriptionDraft;
use anyhow::{Context, Result, anyhow, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{Duration as ChronoDuration, NaiveDate};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

const API_KEY_HEADER: &str = "x-goog-api-key";
const IMAGE_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("The function must be called by an authenticated user.")]
    Unauthenticated,
    #[error("prescription extraction is disabled (ai.enabled = false)")]
    Disabled,
    #[error("image must be a non-empty base64 string")]
    InvalidImage,
    #[error(
        "AI API key is missing. Set `RxReminder config set ai.api_key <KEY>` or `RXREMINDER_AI_API_KEY`."
    )]
    MissingApiKey,
    #[error("An error occurred while generating content: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionRequest {
    pub image: String,
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingContext {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimingContext {
    pub fn default_alarm_time(self) -> &'static str {
        match self {
            Self::Morning => "08:00",
            Self::Afternoon => "14:00",
            Self::Evening => "20:00",
            Self::Night => "22:00",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub context: TimingContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DosageSchedule {
    #[serde(default, alias = "start_date")]
    pub start_date: String,
    #[serde(default)]
    pub days: u32,
    #[serde(default)]
    pub timings: Vec<Timing>,
}

/// One medication read off a prescription image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedMedication {
    #[serde(alias = "medicine_name")]
    pub medicine_name: String,
    pub dosages: DosageSchedule,
}

impl ExtractedMedication {
    /// Form defaults for this medication. Dosage is left for the user to fill in.
    pub fn draft_defaults(&self, photo_uri: Option<String>) -> PrescriptionDraft {
        let mut alarm_times = self
            .dosages
            .timings
            .iter()
            .map(|timing| timing.context.default_alarm_time().to_string())
            .collect::<Vec<_>>();
        alarm_times.sort();
        alarm_times.dedup();

        let frequency = match self.dosages.timings.len() {
            0 => String::new(),
            count => format!(
                "{count}x/day ({})",
                self.dosages
                    .timings
                    .iter()
                    .map(|timing| format!("{:?}", timing.context))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };

        PrescriptionDraft {
            photo_uri,
            medication_name: self.medicine_name.trim().to_string(),
            dosage: String::new(),
            frequency,
            start_date: self.dosages.start_date.trim().to_string(),
            end_date: self.end_date().unwrap_or_default(),
            instructions: String::new(),
            alarm_times,
        }
    }

    /// Last day of the course, when the start date is a real date and the duration is known.
    pub fn end_date(&self) -> Option<String> {
        let start = NaiveDate::parse_from_str(self.dosages.start_date.trim(), "%Y-%m-%d").ok()?;
        let days = i64::from(self.dosages.days);
        (days > 0).then(|| {
            (start + ChronoDuration::days(days - 1))
                .format("%Y-%m-%d")
                .to_string()
        })
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    text: Option<String>,
}

pub fn encode_image_file(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read image file: {}", path.display()))?;
    if bytes.is_empty() {
        bail!("Image file is empty: {}", path.display());
    }

    Ok(STANDARD.encode(bytes))
}

pub fn extract_medications(
    config: &Config,
    request: &ExtractionRequest,
) -> Result<Vec<ExtractedMedication>, ExtractionError> {
    if !config.ai_enabled {
        return Err(ExtractionError::Disabled);
    }

    let image = request.image.trim();
    if image.is_empty() || STANDARD.decode(image).is_err() {
        return Err(ExtractionError::InvalidImage);
    }

    let api_key = resolve_api_key(config).ok_or(ExtractionError::MissingApiKey)?;
    let prompt = if request.prompt.trim().is_empty() {
        config.ai_prompt.clone()
    } else {
        request.prompt.clone()
    };

    let content = generate_content(config, &api_key, &prompt, image).map_err(|error| {
        error!(error = %error, model = %config.ai_model, "prescription extraction call failed");
        ExtractionError::Internal(error.to_string())
    })?;

    let medications = parse_medications(&content).map_err(|error| {
        error!(error = %error, "prescription extraction returned an unreadable payload");
        ExtractionError::Internal(error.to_string())
    })?;

    info!(count = medications.len(), "medications extracted from image");
    Ok(medications)
}

pub fn has_api_key(config: &Config) -> bool {
    resolve_api_key(config).is_some()
}

fn resolve_api_key(config: &Config) -> Option<String> {
    ["RXREMINDER_AI_API_KEY", "GEMINI_API_KEY"]
        .iter()
        .find_map(|name| {
            std::env::var(name)
                .ok()
                .filter(|value| !value.trim().is_empty())
        })
        .or_else(|| {
            config
                .ai_api_key
                .clone()
                .filter(|value| !value.trim().is_empty())
        })
}

fn generate_content(config: &Config, api_key: &str, prompt: &str, image: &str) -> Result<String> {
    let base_url = config.ai_api_base_url.clone();
    let model = config.ai_model.clone();
    let timeout_seconds = config.ai_timeout_seconds.max(5);
    let api_key = api_key.to_string();
    let body = request_body(prompt, image);

    std::thread::spawn(move || {
        generate_content_blocking(&base_url, &model, timeout_seconds, &api_key, &body)
    })
    .join()
    .map_err(|_| anyhow!("AI worker thread panicked"))?
}

fn generate_content_blocking(
    base_url: &str,
    model: &str,
    timeout_seconds: u64,
    api_key: &str,
    body: &Value,
) -> Result<String> {
    let endpoint = format!(
        "{}/models/{}:generateContent",
        base_url.trim_end_matches('/'),
        model
    );

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        HeaderName::from_static(API_KEY_HEADER),
        HeaderValue::from_str(api_key).context("Failed to build API key header")?,
    );

    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .default_headers(headers)
        .build()
        .context("Failed to create AI HTTP client")?;

    let response = client
        .post(endpoint)
        .json(body)
        .send()
        .context("AI API request failed")?;

    let status = response.status();
    let text = response.text().context("Failed to read AI response body")?;

    if !status.is_success() {
        bail!("AI API error {}: {}", status, text);
    }

    let parsed: GenerateContentResponse = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse AI response: {text}"))?;

    parsed
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .find_map(|part| part.text)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| anyhow!("AI response did not include any text content"))
}

fn request_body(prompt: &str, image: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                {"text": prompt},
                {"inline_data": {"mime_type": IMAGE_MIME_TYPE, "data": image}}
            ]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": response_schema(),
        }
    })
}

fn response_schema() -> Value {
    json!({
        "type": "ARRAY",
        "description": "A list of all valid medications found in the prescription image.",
        "items": {
            "type": "OBJECT",
            "description": "A single medication entry with its dosage schedule.",
            "properties": {
                "medicine_name": {
                    "type": "STRING",
                    "description": "The exact name of the medication (e.g., 'Metoprolol Succinate')."
                },
                "dosages": {
                    "type": "OBJECT",
                    "description": "The specific dosage schedule for the medication.",
                    "properties": {
                        "start_date": {
                            "type": "STRING",
                            "description": "The date the medication starts, using the format YYYY-MM-DD. Use the current date if not specified in the image."
                        },
                        "days": {
                            "type": "INTEGER",
                            "description": "The total duration of the prescription in number of days."
                        },
                        "timings": {
                            "type": "ARRAY",
                            "description": "A list of required daily dosage times/contexts.",
                            "items": {
                                "type": "OBJECT",
                                "properties": {
                                    "context": {
                                        "type": "STRING",
                                        "enum": ["Morning", "Afternoon", "Evening", "Night"],
                                        "description": "The time of day for the dose."
                                    }
                                },
                                "required": ["context"]
                            }
                        }
                    },
                    "required": ["start_date", "days", "timings"]
                }
            },
            "required": ["medicine_name", "dosages"]
        }
    })
}

fn parse_medications(content: &str) -> Result<Vec<ExtractedMedication>> {
    let extracted = extract_json_block(content);
    serde_json::from_str(&extracted)
        .with_context(|| format!("Failed to parse medication JSON payload. content: {content}"))
}

fn extract_json_block(content: &str) -> String {
    let fenced = content.split("```").map(str::trim).find_map(|block| {
        block
            .strip_prefix("json")
            .map(str::trim)
            .or_else(|| block.starts_with('[').then_some(block))
    });

    match fenced {
        Some(block) => block.to_string(),
        None => {
            let first = content.find('[');
            let last = content.rfind(']');

            match (first, last) {
                (Some(start), Some(end)) if end > start => content[start..=end].to_string(),
                _ => content.trim().to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ExtractionError, ExtractionRequest, ExtractedMedication, TimingContext,
        extract_medications, parse_medications, request_body,
    };
    use crate::config::Config;

    const GEMINI_TEXT: &str = r#"[
        {"medicine_name": "Amoxicillin", "dosages": {"start_date": "2026-03-01", "days": 7,
          "timings": [{"context": "Night"}, {"context": "Morning"}]}},
        {"medicine_name": "Paracetamol", "dosages": {"start_date": "", "days": 0, "timings": []}}
    ]"#;

    #[test]
    fn parses_schema_output_and_fenced_blocks() {
        let medications = parse_medications(GEMINI_TEXT).expect("parse");
        assert_eq!(medications.len(), 2);
        assert_eq!(medications[0].medicine_name, "Amoxicillin");
        assert_eq!(
            medications[0].dosages.timings[0].context,
            TimingContext::Night
        );

        let fenced = format!("Here you go:\n```json\n{GEMINI_TEXT}\n```");
        assert_eq!(parse_medications(&fenced).expect("parse fenced"), medications);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let medications = parse_medications(GEMINI_TEXT).expect("parse");
        let json = serde_json::to_value(&medications[0]).expect("serialize");

        assert_eq!(json["medicineName"], "Amoxicillin");
        assert_eq!(json["dosages"]["startDate"], "2026-03-01");
        assert_eq!(json["dosages"]["timings"][0]["context"], "Night");

        let round_trip: ExtractedMedication = serde_json::from_value(json).expect("camelCase input");
        assert_eq!(round_trip, medications[0]);
    }

    #[test]
    fn draft_defaults_map_timings_and_course_length() {
        let medications = parse_medications(GEMINI_TEXT).expect("parse");

        let draft = medications[0].draft_defaults(Some("file:///tmp/rx.jpg".to_string()));
        assert_eq!(draft.medication_name, "Amoxicillin");
        assert_eq!(draft.alarm_times, vec!["08:00", "22:00"]);
        assert_eq!(draft.frequency, "2x/day (Night, Morning)");
        assert_eq!(draft.start_date, "2026-03-01");
        assert_eq!(draft.end_date, "2026-03-07");
        assert!(draft.dosage.is_empty());

        let open_ended = medications[1].draft_defaults(None);
        assert!(open_ended.end_date.is_empty());
        assert!(open_ended.alarm_times.is_empty());
    }

    #[test]
    fn request_carries_prompt_image_and_schema() {
        let body = request_body("read this", "aGVsbG8=");
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "read this");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(parts[1]["inline_data"]["data"], "aGVsbG8=");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "ARRAY");
    }

    #[test]
    fn rejects_bad_input_before_calling_the_model() {
        let config = Config::default();
        let not_base64 = ExtractionRequest {
            image: "not base64!".to_string(),
            prompt: String::new(),
        };
        assert!(matches!(
            extract_medications(&config, &not_base64),
            Err(ExtractionError::InvalidImage)
        ));

        let disabled = Config {
            ai_enabled: false,
            ..Config::default()
        };
        assert!(matches!(
            extract_medications(&disabled, &not_base64),
            Err(ExtractionError::Disabled)
        ));
    }
}
