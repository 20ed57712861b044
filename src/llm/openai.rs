use anyhow::Result;
use log::debug;
use reqwest::blocking::Client;
use serde_json::{json, Value};

use crate::llm::{endpoint, send_json, ChatMessage, Provider, TEMPERATURE};
use crate::models::{collapse_model_names, ModelList};

// ---------------------------------------------------------------------------
// OpenAI-compatible chat completions (OpenAI, Groq)
// ---------------------------------------------------------------------------

pub struct OpenAiCompatible {
    id: &'static str,
    base_url: String,
    default_model: &'static str,
    client: Client,
    /// Keeps only catalog entries that can do chat text generation.
    is_text_model: fn(&str) -> bool,
}

impl OpenAiCompatible {
    pub fn groq(client: Client, base_url: &str) -> Self {
        Self {
            id: "groq",
            base_url: base_url.to_string(),
            default_model: "llama3-8b-8192",
            client,
            is_text_model: is_groq_text_model,
        }
    }

    pub fn openai(client: Client, base_url: &str) -> Self {
        Self {
            id: "openai",
            base_url: base_url.to_string(),
            default_model: "gpt-4",
            client,
            is_text_model: is_openai_text_model,
        }
    }

    fn fetch_model_ids(&self, credential: &str) -> Result<Vec<String>> {
        let request = self
            .client
            .get(endpoint(&self.base_url, "models"))
            .bearer_auth(credential);
        Ok(model_ids(&send_json(request)?))
    }
}

impl Provider for OpenAiCompatible {
    fn id(&self) -> &'static str {
        self.id
    }

    fn default_model(&self) -> Option<&str> {
        Some(self.default_model)
    }

    fn generate(&self, prompt: &str, credential: &str, model: Option<&str>) -> Result<String> {
        let model = model.unwrap_or(self.default_model);
        let request = self
            .client
            .post(endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(credential)
            .json(&chat_body(model, prompt));

        let reply = send_json(request)?;
        let content = extract_content(&reply);
        debug!("{} returned {} chars", self.id, content.len());
        Ok(content)
    }

    fn validate_credential(&self, credential: &str) -> Result<()> {
        self.fetch_model_ids(credential).map(|_| ())
    }

    fn list_models(&self, credential: &str) -> Result<ModelList> {
        let ids = self.fetch_model_ids(credential)?;
        let text_models = ids.iter().filter(|id| (self.is_text_model)(id));
        Ok(ModelList::Names(collapse_model_names(text_models)))
    }
}

/// Request body: the prompt as one user turn, strict JSON output.
pub fn chat_body(model: &str, prompt: &str) -> Value {
    json!({
        "model": model,
        "messages": [ChatMessage::user(prompt)],
        "temperature": TEMPERATURE,
        "response_format": { "type": "json_object" },
    })
}

/// `choices[0].message.content`, or an empty string when the model sent none.
pub fn extract_content(reply: &Value) -> String {
    reply["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string()
}

/// Ids from a `GET /models` reply.
pub fn model_ids(reply: &Value) -> Vec<String> {
    reply["data"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|m| m["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

const OPENAI_PREFIXES: &[&str] = &["gpt-", "chatgpt-", "o1", "o3", "o4"];
const OPENAI_EXCLUDED: &[&str] = &[
    "embedding",
    "whisper",
    "tts",
    "dall-e",
    "audio",
    "realtime",
    "transcribe",
    "search",
    "image",
    "moderation",
    "instruct",
];
const GROQ_EXCLUDED: &[&str] = &["whisper", "guard", "tts"];

pub fn is_openai_text_model(id: &str) -> bool {
    OPENAI_PREFIXES.iter().any(|p| id.starts_with(p))
        && !OPENAI_EXCLUDED.iter().any(|x| id.contains(x))
}

pub fn is_groq_text_model(id: &str) -> bool {
    !GROQ_EXCLUDED.iter().any(|x| id.contains(x))
}
