pub mod graph;

use std::sync::LazyLock;

use log::{debug, error, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QuestError;

// ---------------------------------------------------------------------------
// Quest document
// ---------------------------------------------------------------------------

/// The parsed JSON exactly as the model produced it.
///
/// Always a non-empty JSON object. Nothing else about the structure is
/// enforced here; see [`graph::Quest`] for the typed view and the optional
/// schema check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestDocument(Value);

impl QuestDocument {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// `questTitle` if the model supplied one.
    pub fn title(&self) -> Option<&str> {
        self.0.get("questTitle").and_then(Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// JSON extraction
// ---------------------------------------------------------------------------

/// First fenced code block, with any info string (`json`, `jsonc`, ...).
static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*[A-Za-z0-9_+.-]*[ \t]*\r?\n?(.*?)```")
        .expect("fence pattern is valid")
});

/// Pull the JSON candidate out of a model reply: the inside of the first
/// fenced block if there is one, otherwise the whole reply.
pub fn json_candidate(raw: &str) -> &str {
    match FENCED_BLOCK.captures(raw).and_then(|cap| cap.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => raw.trim(),
    }
}

/// Turn a raw model reply into a quest document.
pub fn extract_quest(raw: &str) -> Result<QuestDocument, QuestError> {
    if raw.trim().is_empty() {
        return Err(QuestError::NoContent);
    }

    let candidate = json_candidate(raw);
    debug!("Extracted JSON candidate ({} chars)", candidate.len());

    let value: Value = serde_json::from_str(candidate).map_err(|e| {
        let err = QuestError::InvalidJson {
            raw: raw.to_string(),
            cleaned: candidate.to_string(),
            reason: e.to_string(),
        };
        error!("{err}");
        err
    })?;

    match value {
        Value::Object(map) if map.is_empty() => Err(QuestError::EmptyResult),
        // a document carrying `error` would read as a failure response
        Value::Object(map) if map.contains_key("error") => {
            warn!("Model answered with an error object: {}", map["error"]);
            Err(QuestError::EmptyResult)
        }
        Value::Object(map) => Ok(QuestDocument(Value::Object(map))),
        other => {
            warn!("Model answered with a JSON {} instead of an object", kind_of(&other));
            Err(QuestError::EmptyResult)
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
