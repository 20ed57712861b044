use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const ENV_ENABLE_LOCAL: &str = "QUESTGEN_ENABLE_LOCAL";
pub const ENV_MODEL_DIR: &str = "QUESTGEN_MODEL_DIR";
pub const ENV_GROQ_URL: &str = "QUESTGEN_GROQ_URL";
pub const ENV_OPENAI_URL: &str = "QUESTGEN_OPENAI_URL";
pub const ENV_GEMINI_URL: &str = "QUESTGEN_GEMINI_URL";
pub const ENV_TIMEOUT_SECS: &str = "QUESTGEN_TIMEOUT_SECS";
pub const ENV_N_CTX: &str = "QUESTGEN_N_CTX";
pub const ENV_GPU_LAYERS: &str = "QUESTGEN_GPU_LAYERS";
pub const ENV_MAX_TOKENS: &str = "QUESTGEN_MAX_TOKENS";

// ---------------------------------------------------------------------------
// Local model configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalModelConfig {
    /// How many layers to offload to GPU (0 = CPU only).
    pub n_gpu_layers: u32,
    /// Context window size in tokens.
    pub n_ctx: u32,
    /// Maximum tokens to generate per completion.
    pub max_tokens: usize,
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            n_gpu_layers: 0,
            n_ctx: 2048,
            max_tokens: 2048,
        }
    }
}

// ---------------------------------------------------------------------------
// Service configuration
// ---------------------------------------------------------------------------

/// Everything the providers need, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Whether the `local` provider is offered at all.
    pub enable_local: bool,
    /// Directory holding `.gguf` model files.
    pub model_dir: PathBuf,
    pub groq_url: String,
    pub openai_url: String,
    pub gemini_url: String,
    /// Per-request HTTP timeout for hosted providers.
    pub timeout_secs: u64,
    pub local: LocalModelConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_local: true,
            model_dir: PathBuf::from("models"),
            groq_url: "https://api.groq.com/openai/v1".into(),
            openai_url: "https://api.openai.com/v1".into(),
            gemini_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            timeout_secs: 120,
            local: LocalModelConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key/value source, falling back to defaults for
    /// unset or blank keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get(ENV_ENABLE_LOCAL) {
            config.enable_local =
                parse_flag(&v).with_context(|| format!("invalid {ENV_ENABLE_LOCAL}"))?;
        }
        if let Some(v) = get(ENV_MODEL_DIR) {
            config.model_dir = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_GROQ_URL) {
            config.groq_url = v;
        }
        if let Some(v) = get(ENV_OPENAI_URL) {
            config.openai_url = v;
        }
        if let Some(v) = get(ENV_GEMINI_URL) {
            config.gemini_url = v;
        }
        if let Some(v) = get(ENV_TIMEOUT_SECS) {
            config.timeout_secs = parse_number(ENV_TIMEOUT_SECS, &v)?;
        }
        if let Some(v) = get(ENV_N_CTX) {
            config.local.n_ctx = parse_number(ENV_N_CTX, &v)?;
        }
        if let Some(v) = get(ENV_GPU_LAYERS) {
            config.local.n_gpu_layers = parse_number(ENV_GPU_LAYERS, &v)?;
        }
        if let Some(v) = get(ENV_MAX_TOKENS) {
            config.local.max_tokens = parse_number(ENV_MAX_TOKENS, &v)?;
        }

        if config.local.n_ctx == 0 {
            bail!("{ENV_N_CTX} must be > 0");
        }

        Ok(config)
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean flag, got '{other}'"),
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid {key}: '{value}'"))
}
