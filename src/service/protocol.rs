use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::frame::EncodedImage;

/// Name the service answers with while no model has been trained.
pub const MODEL_NOT_READY: &str = "MODEL NOT READY";

pub const TRAIN_UPDATED: &str = "GLOBAL MODEL UPDATED";
pub const TRAIN_FAILED: &str = "TRAINING ERROR";

/// Operator-facing line for a finished train request.
pub fn train_report<T, E>(outcome: &std::result::Result<T, E>) -> &'static str {
    if outcome.is_ok() { TRAIN_UPDATED } else { TRAIN_FAILED }
}

// Request types
#[derive(Serialize, Debug)]
pub struct EnrollRequest<'a> {
    pub name: &'a str,
    pub images: Vec<&'a EncodedImage>,
}

#[derive(Serialize, Debug)]
pub struct RecognizeRequest<'a> {
    pub image: &'a EncodedImage,
}

// Response types
#[derive(Deserialize, Debug, Clone)]
pub struct RecognizeResponse {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "match", default)]
    pub matched: bool,
    #[serde(default)]
    pub confidence: f64,
}

/// One recognition answer, reduced into display state and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionResult {
    pub matched: bool,
    pub subject_label: String,
    /// Percentage in `0..=100`.
    pub confidence: u8,
    pub model_ready: bool,
}

impl From<RecognizeResponse> for RecognitionResult {
    fn from(response: RecognizeResponse) -> Self {
        let model_ready = response.name != MODEL_NOT_READY;
        let confidence = if response.confidence.is_finite() {
            response.confidence.round().clamp(0.0, 100.0) as u8
        } else {
            0
        };
        Self {
            matched: model_ready && response.matched,
            subject_label: response.name,
            confidence,
            model_ready,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub id: i64,
    pub name: String,
    #[serde(default, deserialize_with = "empty_image_as_none")]
    pub thumbnail: Option<EncodedImage>,
    #[serde(default)]
    pub sample_count: u32,
    #[serde(default)]
    pub last_updated: String,
}

impl RosterEntry {
    /// `last_updated` parsed as RFC 3339, or as a naive UTC timestamp.
    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(&self.last_updated) {
            return Some(ts.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(&self.last_updated, fmt).ok())
            .map(|naive| naive.and_utc())
    }
}

fn empty_image_as_none<'de, D>(deserializer: D) -> Result<Option<EncodedImage>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value
        .filter(|s| !s.trim().is_empty())
        .map(EncodedImage::from_string))
}

// Push channel messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    NewEnrollment,
    TrainingComplete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEvent {
    pub kind: UpdateKind,
    pub subject: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub user_name: Option<String>,
}

impl PushMessage {
    /// `None` for message types this client does not react to.
    pub fn into_event(self) -> Option<UpdateEvent> {
        let kind = match self.kind.as_str() {
            "NEW_ENROLLMENT" => UpdateKind::NewEnrollment,
            "TRAINING_COMPLETE" => UpdateKind::TrainingComplete,
            _ => return None,
        };
        let subject = self.user_name.filter(|name| !name.is_empty());
        Some(UpdateEvent { kind, subject })
    }
}
