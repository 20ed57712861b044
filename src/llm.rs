pub mod gemini;
pub mod local;
pub mod openai;
#[cfg(feature = "local")]
mod runtime;

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use reqwest::blocking::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::error::{self, QuestError};
use crate::models::ModelList;

/// Sampling temperature used for every quest generation.
pub const TEMPERATURE: f64 = 0.7;

// ---------------------------------------------------------------------------
// Chat message helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

impl std::fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.role, self.content)
    }
}

// ---------------------------------------------------------------------------
// Provider capability
// ---------------------------------------------------------------------------

/// One backend that can turn a prompt into free-form text.
///
/// Implementations report failures as plain `anyhow` errors carrying the
/// backend's own wording; [`ProviderRegistry`] classifies them. Failures a
/// provider can name precisely are returned as a wrapped [`QuestError`] and
/// pass through unchanged.
pub trait Provider: Send + Sync {
    /// Identifier callers select this provider by.
    fn id(&self) -> &'static str;

    /// Whether calls need a non-empty API key.
    fn requires_credential(&self) -> bool {
        true
    }

    /// Model used when the caller does not pick one.
    fn default_model(&self) -> Option<&str> {
        None
    }

    /// Run the prompt as a single user turn and return the reply text.
    /// A reply with no content is returned as an empty string.
    fn generate(&self, prompt: &str, credential: &str, model: Option<&str>) -> Result<String>;

    /// Cheapest authenticated call that proves the key is accepted.
    fn validate_credential(&self, credential: &str) -> Result<()>;

    fn list_models(&self, credential: &str) -> Result<ModelList>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Providers keyed by id. Unknown ids never fall back to a default provider.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, Box<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in provider the configuration allows.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = http_client(config.timeout_secs)?;
        let mut registry = Self::new();
        registry.register(Box::new(openai::OpenAiCompatible::groq(
            client.clone(),
            &config.groq_url,
        )));
        registry.register(Box::new(openai::OpenAiCompatible::openai(
            client.clone(),
            &config.openai_url,
        )));
        registry.register(Box::new(gemini::Gemini::new(client, &config.gemini_url)));
        if config.enable_local {
            registry.register(Box::new(local::LocalProvider::new(
                config.model_dir.clone(),
                config.local.clone(),
            )));
        } else {
            info!("Local provider disabled by configuration");
        }
        debug!("Providers available: {:?}", registry.ids());
        Ok(registry)
    }

    /// Add or replace the provider for `provider.id()`.
    pub fn register(&mut self, provider: Box<dyn Provider>) {
        debug!("Registering provider '{}'", provider.id());
        self.providers.insert(provider.id(), provider);
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.providers.keys().copied().collect()
    }

    fn lookup(&self, provider_id: &str) -> Result<&dyn Provider, QuestError> {
        self.providers
            .get(provider_id)
            .map(|p| p.as_ref())
            .ok_or_else(|| QuestError::UnknownProvider(provider_id.to_string()))
    }

    /// Resolve the provider and, if it needs one, a non-blank credential.
    fn prepare<'a>(
        &self,
        provider_id: &str,
        credential: Option<&'a str>,
    ) -> Result<(&dyn Provider, &'a str), QuestError> {
        let provider = self.lookup(provider_id)?;
        let credential = credential.map(str::trim).unwrap_or("");
        if provider.requires_credential() && credential.is_empty() {
            return Err(QuestError::EmptyCredential {
                provider: provider_id.to_string(),
            });
        }
        Ok((provider, credential))
    }

    pub fn generate(
        &self,
        provider_id: &str,
        prompt: &str,
        credential: Option<&str>,
        model: Option<&str>,
    ) -> Result<String, QuestError> {
        let (provider, credential) = self.prepare(provider_id, credential)?;
        let model = model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .or_else(|| provider.default_model());

        info!(
            "Generating with provider={provider_id} model={}",
            model.unwrap_or("<none>")
        );
        provider
            .generate(prompt, credential, model)
            .map_err(|e| error::from_backend(provider_id, model.unwrap_or(""), e))
    }

    pub fn validate_credential(
        &self,
        provider_id: &str,
        credential: Option<&str>,
    ) -> Result<(), QuestError> {
        let (provider, credential) = self.prepare(provider_id, credential)?;
        provider
            .validate_credential(credential)
            .map_err(|e| error::from_backend(provider_id, "", e))
    }

    pub fn list_models(
        &self,
        provider_id: &str,
        credential: Option<&str>,
    ) -> Result<ModelList, QuestError> {
        let (provider, credential) = self.prepare(provider_id, credential)?;
        let models = provider
            .list_models(credential)
            .map_err(|e| error::from_backend(provider_id, "", e))?;
        debug!("{provider_id} lists {} models", models.len());
        Ok(models)
    }
}

// ---------------------------------------------------------------------------
// HTTP plumbing shared by hosted providers
// ---------------------------------------------------------------------------

pub(crate) fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("failed to build HTTP client")
}

/// Join a base URL and a path without doubling or dropping the slash.
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Send the request and return its JSON body. Non-2xx replies become an
/// error of the form `HTTP <code> <reason>: <body>`.
pub(crate) fn send_json(request: RequestBuilder) -> Result<Value> {
    let response = request.send()?;
    let status = response.status();
    let body = response.text().context("failed to read response body")?;

    if !status.is_success() {
        warn!("HTTP {status}: {body}");
        return Err(anyhow!("HTTP {status}: {body}"));
    }

    serde_json::from_str(&body).with_context(|| format!("response is not JSON: {body}"))
}
