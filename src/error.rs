use std::path::PathBuf;

use thiserror::Error;

use crate::quest::graph::Violation;

// ---------------------------------------------------------------------------
// Failure taxonomy
// ---------------------------------------------------------------------------

/// Every way a quest request can fail.
///
/// `Display` is the diagnostic text that goes to the log. What the user sees
/// comes from [`QuestError::user_message`].
#[derive(Debug, Error)]
pub enum QuestError {
    #[error("missing required field '{0}'")]
    MissingInput(&'static str),

    #[error("unknown API provider: {0}")]
    UnknownProvider(String),

    #[error("{provider}: API key is required")]
    EmptyCredential { provider: String },

    #[error("{provider} rejected the API key: {detail}")]
    InvalidCredential { provider: String, detail: String },

    #[error("{provider} rate limit hit: {detail}")]
    RateLimited { provider: String, detail: String },

    #[error("{provider} quota exhausted: {detail}")]
    QuotaExceeded { provider: String, detail: String },

    #[error("{provider} does not serve model '{model}': {detail}")]
    ModelUnavailable {
        provider: String,
        model: String,
        detail: String,
    },

    #[error("local model file not found: {}", .0.display())]
    LocalModelNotFound(PathBuf),

    #[error("local inference runtime unavailable: {0}")]
    LocalRuntimeUnavailable(String),

    #[error("LLM returned no content")]
    NoContent,

    #[error("LLM output is not valid JSON ({reason}). Raw content (original): '{raw}'. Cleaned content: '{cleaned}'.")]
    InvalidJson {
        raw: String,
        cleaned: String,
        reason: String,
    },

    #[error("LLM returned an empty JSON document")]
    EmptyResult,

    #[error("quest breaks the schema: {}", join_violations(.0))]
    SchemaViolation(Vec<Violation>),

    #[error("{provider} API error: {detail}")]
    ProviderError { provider: String, detail: String },
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl QuestError {
    /// Stable machine-readable code for the failure category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingInput(_) => "missing_input",
            Self::UnknownProvider(_) => "unknown_provider",
            Self::EmptyCredential { .. } => "empty_credential",
            Self::InvalidCredential { .. } => "invalid_credential",
            Self::RateLimited { .. } => "rate_limited",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::ModelUnavailable { .. } => "model_unavailable",
            Self::LocalModelNotFound(_) => "local_model_not_found",
            Self::LocalRuntimeUnavailable(_) => "local_runtime_unavailable",
            Self::NoContent => "no_content",
            Self::InvalidJson { .. } => "invalid_json",
            Self::EmptyResult => "empty_result",
            Self::SchemaViolation(_) => "schema_violation",
            Self::ProviderError { .. } => "provider_error",
        }
    }

    /// Short message shown to the player. Quests are generated in Russian,
    /// so the surface around them is Russian as well.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingInput(field) => {
                format!("Не заполнено обязательное поле '{field}'.")
            }
            Self::UnknownProvider(id) => format!("Неизвестный API провайдер: {id}"),
            Self::EmptyCredential { .. } => "Не указан API ключ.".into(),
            Self::InvalidCredential { .. } => {
                "Неверный API ключ. Пожалуйста, проверьте ваш ключ.".into()
            }
            Self::RateLimited { .. } => {
                "Превышен лимит запросов к API. Попробуйте позже.".into()
            }
            Self::QuotaExceeded { .. } => "Превышен лимит использования API или недостаточно \
                 средств. Пожалуйста, проверьте ваш тарифный план или баланс."
                .into(),
            Self::ModelUnavailable {
                provider, model, ..
            } => format!(
                "Выбранная модель '{model}' не найдена, недоступна или устарела у провайдера {provider}."
            ),
            Self::LocalModelNotFound(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                format!("Локальная модель не найдена: {name}")
            }
            Self::LocalRuntimeUnavailable(_) => {
                "Локальный режим недоступен: среда запуска моделей не установлена.".into()
            }
            Self::NoContent => "Модель не вернула ответ.".into(),
            Self::InvalidJson { .. } => "Модель не смогла сгенерировать валидный JSON. \
                 Структура ответа повреждена, попробуйте еще раз."
                .into(),
            Self::EmptyResult => "Модель вернула пустой результат. \
                 Попробуйте другую модель или повторите запрос."
                .into(),
            Self::SchemaViolation(violations) => format!(
                "Сгенерированный квест не соответствует структуре ({} нарушений).",
                violations.len()
            ),
            Self::ProviderError { provider, detail } => format!(
                "Произошла ошибка при обращении к API {provider}: {}",
                brief(detail)
            ),
        }
    }
}

/// Longest slice of backend detail shown to the user; the rest is only logged.
const MAX_DETAIL_CHARS: usize = 200;

/// First line of `detail`, cut to [`MAX_DETAIL_CHARS`].
fn brief(detail: &str) -> String {
    let line = detail.lines().next().unwrap_or("").trim();
    match line.char_indices().nth(MAX_DETAIL_CHARS) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Classification of backend failures
// ---------------------------------------------------------------------------

/// Map a backend failure message onto the taxonomy.
///
/// SDKs and HTTP APIs report errors as free text, so this is plain
/// case-insensitive substring matching. Keep all the phrasing knowledge here.
pub fn classify(provider: &str, model: &str, message: &str) -> QuestError {
    let lower = message.to_lowercase();
    let provider = provider.to_string();
    let detail = message.to_string();

    if lower.contains("quota") || lower.contains("insufficient_quota") {
        QuestError::QuotaExceeded { provider, detail }
    } else if lower.contains("rate limit") {
        QuestError::RateLimited { provider, detail }
    } else if lower.contains("authentication")
        || lower.contains("invalid api key")
        || lower.contains("401")
    {
        QuestError::InvalidCredential { provider, detail }
    } else if lower.contains("model not found")
        || lower.contains("model_not_found")
        || lower.contains("modelnotfounderror")
        || lower.contains("deprecated")
        || (lower.contains("404") && lower.contains("model"))
    {
        QuestError::ModelUnavailable {
            provider,
            model: model.to_string(),
            detail,
        }
    } else {
        QuestError::ProviderError { provider, detail }
    }
}

/// Turn whatever a provider call raised into a [`QuestError`].
///
/// Failures the provider already categorised pass through untouched;
/// everything else is classified from its full context chain.
pub fn from_backend(provider: &str, model: &str, err: anyhow::Error) -> QuestError {
    match err.downcast::<QuestError>() {
        Ok(known) => known,
        Err(other) => classify(provider, model, &format!("{other:#}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit() {
        let err = classify("groq", "m", "Too many requests, rate limit exceeded");
        assert!(matches!(err, QuestError::RateLimited { .. }));
    }

    #[test]
    fn test_401_is_invalid_credential() {
        let err = classify("groq", "m", "HTTP 401 Unauthorized: {}");
        assert!(matches!(err, QuestError::InvalidCredential { .. }));
        let err = classify("groq", "m", "AuthenticationError: Invalid API key");
        assert_eq!(err.kind(), "invalid_credential");
    }

    #[test]
    fn test_quota_wins_over_rate_limit() {
        let err = classify(
            "openai",
            "gpt-4",
            "Error code: 429 - {'error': {'code': 'insufficient_quota', 'message': 'rate limit'}}",
        );
        assert!(matches!(err, QuestError::QuotaExceeded { .. }));
    }

    #[test]
    fn test_model_unavailable() {
        let err = classify("gemini", "gemini-1.0-pro-vision", "404 model is gone");
        match err {
            QuestError::ModelUnavailable { model, .. } => {
                assert_eq!(model, "gemini-1.0-pro-vision")
            }
            other => panic!("unexpected {other:?}"),
        }
        let err = classify(
            "gemini",
            "x",
            "Gemini 1.0 Pro Vision has been DEPRECATED on July 12, 2024.",
        );
        assert_eq!(err.kind(), "model_unavailable");
        let err = classify("groq", "gemma-7b-it", "ModelNotFoundError: gemma-7b-it");
        assert_eq!(err.kind(), "model_unavailable");
    }

    #[test]
    fn test_404_without_model_is_generic() {
        let err = classify("groq", "m", "HTTP 404 Not Found: no such route");
        assert_eq!(err.kind(), "provider_error");
    }

    #[test]
    fn test_unrelated_preserves_message() {
        let err = classify("groq", "m", "Some unexpected API error occurred.");
        match &err {
            QuestError::ProviderError { detail, .. } => {
                assert!(detail.contains("Some unexpected API error occurred."))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(err
            .user_message()
            .contains("Some unexpected API error occurred."));
    }

    #[test]
    fn test_long_detail_is_cut_for_the_user() {
        let body = format!("HTTP 500 Internal Server Error: {}\n<trace>", "ж".repeat(1000));
        let err = classify("openai", "gpt-4", &body);
        let message = err.user_message();
        assert!(message.contains("HTTP 500 Internal Server Error"));
        assert!(message.ends_with("..."));
        assert!(!message.contains("<trace>"));
        assert!(message.chars().count() < 300);
        match err {
            QuestError::ProviderError { detail, .. } => assert_eq!(detail, body),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_from_backend_keeps_known_errors() {
        let err = from_backend(
            "local",
            "a.gguf",
            anyhow::Error::new(QuestError::LocalRuntimeUnavailable("off".into())),
        );
        assert_eq!(err.kind(), "local_runtime_unavailable");
    }

    #[test]
    fn test_from_backend_classifies_context_chain() {
        let err = anyhow::anyhow!("HTTP 429 Too Many Requests: rate limit reached")
            .context("chat completion failed");
        assert_eq!(from_backend("groq", "m", err).kind(), "rate_limited");
    }
}
