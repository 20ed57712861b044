use anyhow::{bail, Result};
use log::{debug, warn};
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{json, Value};

use crate::error::QuestError;
use crate::llm::{endpoint, send_json, Provider, TEMPERATURE};
use crate::models::{collapse_model_names, ModelList};

// ---------------------------------------------------------------------------
// Google Generative Language API
// ---------------------------------------------------------------------------

const DEFAULT_MODEL: &str = "gemini-pro";
const GENERATE_METHOD: &str = "generateContent";
const EXCLUDED: &[&str] = &["embedding", "aqa", "vision"];
/// `models.list` pages at 50 entries unless asked for more.
const PAGE_SIZE: &str = "1000";
/// Stop following `nextPageToken` after this many pages.
const MAX_PAGES: usize = 20;

pub struct Gemini {
    base_url: String,
    client: Client,
}

impl Gemini {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            client,
        }
    }

    fn authed(&self, request: RequestBuilder, credential: &str) -> RequestBuilder {
        request.header("x-goog-api-key", credential)
    }

    fn fetch_generative_models(&self, credential: &str) -> Result<Vec<String>> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut request = self
                .authed(self.client.get(endpoint(&self.base_url, "models")), credential)
                .query(&[("pageSize", PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let reply = send_json(request)?;
            models.extend(generative_models(&reply));
            page_token = next_page_token(&reply);
            if page_token.is_none() {
                return Ok(models);
            }
        }

        warn!("Gemini model catalog has more than {MAX_PAGES} pages, listing is truncated");
        Ok(models)
    }
}

impl Provider for Gemini {
    fn id(&self) -> &'static str {
        "gemini"
    }

    fn default_model(&self) -> Option<&str> {
        Some(DEFAULT_MODEL)
    }

    fn generate(&self, prompt: &str, credential: &str, model: Option<&str>) -> Result<String> {
        let model = model_segment(model.unwrap_or(DEFAULT_MODEL))?;
        let url = endpoint(&self.base_url, &format!("models/{model}:{GENERATE_METHOD}"));
        let request = self.authed(self.client.post(url), credential).json(&generate_body(prompt));

        let reply = send_json(request)?;
        let text = extract_text(&reply);
        debug!("gemini returned {} chars", text.len());
        Ok(text)
    }

    fn validate_credential(&self, credential: &str) -> Result<()> {
        if self.fetch_generative_models(credential)?.is_empty() {
            bail!("no generative models available for this API key");
        }
        Ok(())
    }

    fn list_models(&self, credential: &str) -> Result<ModelList> {
        let models = self.fetch_generative_models(credential)?;
        let text_models = models
            .iter()
            .filter(|name| !EXCLUDED.iter().any(|x| name.contains(x)));
        Ok(ModelList::Names(collapse_model_names(text_models)))
    }
}

/// The model id as a single URL path segment, without the `models/` prefix.
pub fn model_segment(model: &str) -> Result<&str, QuestError> {
    let bare = model.strip_prefix("models/").unwrap_or(model);
    let is_segment = !bare.is_empty()
        && !bare.contains(['/', '?', '#', '%', '\\'])
        && !bare.chars().any(|c| c.is_whitespace() || c.is_control());
    if is_segment {
        Ok(bare)
    } else {
        Err(QuestError::ModelUnavailable {
            provider: "gemini".into(),
            model: model.to_string(),
            detail: "model id is not a plain model name".into(),
        })
    }
}

/// Request body: one user turn, JSON response requested.
pub fn generate_body(prompt: &str) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "temperature": TEMPERATURE,
            "responseMimeType": "application/json",
        },
    })
}

/// All text parts of the first candidate, concatenated.
pub fn extract_text(reply: &Value) -> String {
    reply["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Names (without the `models/` prefix) of catalog entries that support
/// `generateContent`.
pub fn generative_models(reply: &Value) -> Vec<String> {
    let Some(models) = reply["models"].as_array() else {
        return Vec::new();
    };
    models
        .iter()
        .filter(|m| {
            m["supportedGenerationMethods"]
                .as_array()
                .is_some_and(|methods| methods.iter().any(|x| x == GENERATE_METHOD))
        })
        .filter_map(|m| m["name"].as_str())
        .map(|name| name.strip_prefix("models/").unwrap_or(name).to_string())
        .collect()
}

/// Token for the next catalog page, if the server sent a non-empty one.
pub fn next_page_token(reply: &Value) -> Option<String> {
    reply["nextPageToken"]
        .as_str()
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}
