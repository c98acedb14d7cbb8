//! Normalization of model responses.
//!
//! Vision models return loosely-formatted JSON, often wrapped in prose or
//! markdown fences, with scores as strings and keys drifting between
//! synonyms. Everything is folded into the closed [`Classification`] type
//! here; a response that cannot be parsed is a typed `InvalidResponse`
//! failure, never a panic and never an untyped map handed downstream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{ActivityState, PrivacyState};

use super::gateway::ClassifyError;

/// Fully-normalized classification fragment for one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub task: String,
    pub activity_type: String,
    pub technical_context: String,
    pub app_name: String,
    pub alignment_score: Option<u8>,
    pub state: ActivityState,
    pub privacy_state: PrivacyState,
    pub error_code: Option<String>,
    pub function_target: Option<String>,
    pub documentation_title: Option<String>,
    pub doc_url: Option<String>,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            task: "Unknown Task".to_string(),
            activity_type: "UNKNOWN".to_string(),
            technical_context: "Unspecified context".to_string(),
            app_name: "Unknown".to_string(),
            alignment_score: None,
            state: ActivityState::Unknown,
            privacy_state: PrivacyState::Blocked,
            error_code: None,
            function_target: None,
            documentation_title: None,
            doc_url: None,
        }
    }
}

/// Parse raw model output into a [`Classification`].
///
/// Accepts any text containing a JSON object; the outermost braces are
/// located and everything around them discarded.
pub fn parse_classification(raw: &str) -> Result<Classification, ClassifyError> {
    let cleaned = raw.trim();
    let start = cleaned
        .find('{')
        .ok_or_else(|| ClassifyError::InvalidResponse("no JSON object found".to_string()))?;
    let end = cleaned
        .rfind('}')
        .ok_or_else(|| ClassifyError::InvalidResponse("no JSON object found".to_string()))?;
    if end < start {
        return Err(ClassifyError::InvalidResponse(
            "mismatched JSON braces".to_string(),
        ));
    }

    let value: Value = serde_json::from_str(&cleaned[start..=end])
        .map_err(|err| ClassifyError::InvalidResponse(err.to_string()))?;
    if !value.is_object() {
        return Err(ClassifyError::InvalidResponse(
            "response is not a JSON object".to_string(),
        ));
    }

    Ok(normalize(&value))
}

fn normalize(value: &Value) -> Classification {
    let defaults = Classification::default();

    let activity_type = pick_string(value, &["activity_type", "activity_kind", "task"])
        .map(|text| text.to_ascii_uppercase())
        .unwrap_or(defaults.activity_type);
    let task = pick_string(value, &["task", "activity_summary", "activity_type"])
        .unwrap_or(defaults.task);
    let technical_context =
        pick_string(value, &["technical_context"]).unwrap_or(defaults.technical_context);
    let app_name = pick_string(value, &["app_name", "app"]).unwrap_or(defaults.app_name);

    let is_deep_work = value
        .get("is_deep_work")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let state = match pick_string(value, &["deep_work_state", "state"]) {
        Some(text) => ActivityState::parse(&text),
        None if is_deep_work => ActivityState::DeepWork,
        None => ActivityState::Distracted,
    };

    // An explicit privacy verdict from the model wins; otherwise only
    // goal-aligned frames are retained.
    let privacy_state = match pick_string(value, &["privacy_state"]) {
        Some(text) if text.eq_ignore_ascii_case("allowed") => PrivacyState::Allowed,
        Some(_) => PrivacyState::Blocked,
        None if state.is_aligned() => PrivacyState::Allowed,
        None => PrivacyState::Blocked,
    };

    let error_code = pick_string(value, &["error_code"])
        .or_else(|| scan_http_error_code(&technical_context));

    Classification {
        task,
        activity_type,
        technical_context,
        app_name,
        alignment_score: parse_score(value.get("alignment_score")),
        state,
        privacy_state,
        error_code,
        function_target: pick_string(value, &["function_target", "function_name"]),
        documentation_title: pick_string(value, &["documentation_title", "doc_title"]),
        doc_url: pick_string(value, &["documentation_url", "doc_url"]),
    }
}

/// First non-empty string among the given keys. Integers are accepted and
/// stringified (models occasionally emit bare numbers for codes).
fn pick_string(value: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match value.get(*key) {
            Some(Value::String(text)) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
            Some(Value::Number(number)) => return Some(number.to_string()),
            _ => {}
        }
    }
    None
}

fn parse_score(value: Option<&Value>) -> Option<u8> {
    let number = match value? {
        Value::Number(number) => number.as_i64()?,
        Value::String(text) => text.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    Some(number.clamp(0, 100) as u8)
}

/// Fish a 4xx/5xx status code out of free-form context text.
fn scan_http_error_code(text: &str) -> Option<String> {
    for token in text.split(|c: char| !c.is_ascii_digit()) {
        if token.len() == 3 && (token.starts_with('4') || token.starts_with('5')) {
            return Some(token.to_string());
        }
    }
    None
}
