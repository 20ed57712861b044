use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::QuestError;
use crate::llm::ProviderRegistry;
use crate::models::ModelList;
use crate::prompt::build_prompt;
use crate::quest::{self, graph, QuestDocument};

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

/// A quest generation request as it arrives from the outside.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub setting: Option<String>,
    pub api_key: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

/// The quest itself on success, `{"error": ...}` otherwise.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum GenerateResponse {
    Quest(QuestDocument),
    Error { error: String },
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ValidationResponse {
    Ok,
    Error { message: String },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ModelsResponse {
    Models { models: ModelList },
    Error { error: String },
}

impl From<Result<QuestDocument, QuestError>> for GenerateResponse {
    fn from(result: Result<QuestDocument, QuestError>) -> Self {
        match result {
            Ok(doc) => Self::Quest(doc),
            Err(e) => Self::Error {
                error: e.user_message(),
            },
        }
    }
}

impl From<Result<(), QuestError>> for ValidationResponse {
    fn from(result: Result<(), QuestError>) -> Self {
        match result {
            Ok(()) => Self::Ok,
            Err(e) => Self::Error {
                message: e.user_message(),
            },
        }
    }
}

impl From<Result<ModelList, QuestError>> for ModelsResponse {
    fn from(result: Result<ModelList, QuestError>) -> Self {
        match result {
            Ok(models) => Self::Models { models },
            Err(e) => Self::Error {
                error: e.user_message(),
            },
        }
    }
}

impl GenerateResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl ValidationResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl ModelsResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Entry points for the request layer. Holds no per-request state.
pub struct QuestService {
    registry: ProviderRegistry,
    schema_check: bool,
}

impl QuestService {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            schema_check: false,
        }
    }

    /// Also reject quests that break the structural rules (node count,
    /// endings, start node, choice targets).
    pub fn with_schema_check(mut self, enabled: bool) -> Self {
        self.schema_check = enabled;
        self
    }

    pub fn generate_quest(&self, request: &GenerateRequest) -> Result<QuestDocument, QuestError> {
        let setting = required(&request.setting, "setting")?;
        let provider = required(&request.provider, "provider")?.trim();

        let prompt = build_prompt(setting);
        let raw = self
            .registry
            .generate(
                provider,
                &prompt,
                request.api_key.as_deref(),
                request.model.as_deref(),
            )
            .inspect_err(|e| log_failure("generation", provider, e))?;

        let doc = quest::extract_quest(&raw).inspect_err(|e| log_failure("parse", provider, e))?;

        if self.schema_check {
            let checked =
                graph::check_document(&doc).inspect_err(|e| log_failure("schema", provider, e))?;
            info!(
                "Quest '{}' passed schema check: {} nodes, longest route {} steps",
                checked.quest_title,
                checked.nodes.len(),
                checked.longest_route()
            );
        }

        info!(
            "Generated quest '{}' with {provider}",
            doc.title().unwrap_or("<untitled>")
        );
        Ok(doc)
    }

    pub fn validate_credential(
        &self,
        provider: &str,
        credential: Option<&str>,
    ) -> Result<(), QuestError> {
        self.registry
            .validate_credential(provider, credential)
            .inspect_err(|e| log_failure("key validation", provider, e))
    }

    pub fn list_models(
        &self,
        provider: &str,
        credential: Option<&str>,
    ) -> Result<ModelList, QuestError> {
        let models = self
            .registry
            .list_models(provider, credential)
            .inspect_err(|e| log_failure("model listing", provider, e))?;
        if models.is_empty() {
            info!("{provider} offers no models");
        }
        Ok(models)
    }
}

/// The field as given, unless it is absent or blank.
fn required<'a>(field: &'a Option<String>, name: &'static str) -> Result<&'a str, QuestError> {
    field
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or(QuestError::MissingInput(name))
}

fn log_failure(stage: &str, provider: &str, err: &QuestError) {
    match err {
        QuestError::MissingInput(_)
        | QuestError::UnknownProvider(_)
        | QuestError::EmptyCredential { .. } => {
            warn!("{stage} rejected ({}): {err}", err.kind())
        }
        // already logged with raw and cleaned text at the parse site
        QuestError::InvalidJson { .. } => {}
        _ => error!("{stage} with {provider} failed ({}): {err}", err.kind()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, LocalModelConfig};
    use crate::llm::local::LocalProvider;
    use crate::llm::tests::FakeProvider;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    const LIGHTHOUSE_REPLY: &str = "Вот квест:\n```json\n{
  \"questTitle\": \"Маяк с привидениями\",
  \"startNodeId\": \"shore\",
  \"nodes\": [
    {\"id\": \"shore\", \"title\": \"Берег\", \"type\": \"STORY\", \"description\": \"Туман.\",
     \"choices\": [{\"text\": \"Войти\", \"targetNodeId\": \"stairs\"}]},
    {\"id\": \"stairs\", \"title\": \"Лестница\", \"type\": \"CHOICE\", \"description\": \"Скрип.\",
     \"choices\": [{\"text\": \"Наверх\", \"targetNodeId\": \"lamp\"},
                   {\"text\": \"Вниз\", \"targetNodeId\": \"cellar\"}]},
    {\"id\": \"lamp\", \"title\": \"Свет\", \"type\": \"ENDING_SUCCESS\", \"description\": \"Огонь.\", \"choices\": []},
    {\"id\": \"cellar\", \"title\": \"Подвал\", \"type\": \"ENDING_FAILURE\", \"description\": \"Тьма.\", \"choices\": []}
  ]
}\n```";

    fn service_with(provider: FakeProvider) -> QuestService {
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(provider));
        QuestService::new(registry)
    }

    fn request(provider: &str, key: Option<&str>) -> GenerateRequest {
        GenerateRequest {
            setting: Some("a haunted lighthouse".into()),
            api_key: key.map(str::to_string),
            provider: Some(provider.into()),
            model: None,
        }
    }

    #[test]
    fn test_haunted_lighthouse_end_to_end() {
        let service = service_with(FakeProvider::replying("groq", LIGHTHOUSE_REPLY));
        let doc = service
            .generate_quest(&request("groq", Some("valid-key")))
            .unwrap();

        let expected = json!({
            "questTitle": "Маяк с привидениями",
            "startNodeId": "shore",
            "nodes": [
                {"id": "shore", "title": "Берег", "type": "STORY", "description": "Туман.",
                 "choices": [{"text": "Войти", "targetNodeId": "stairs"}]},
                {"id": "stairs", "title": "Лестница", "type": "CHOICE", "description": "Скрип.",
                 "choices": [{"text": "Наверх", "targetNodeId": "lamp"},
                             {"text": "Вниз", "targetNodeId": "cellar"}]},
                {"id": "lamp", "title": "Свет", "type": "ENDING_SUCCESS", "description": "Огонь.", "choices": []},
                {"id": "cellar", "title": "Подвал", "type": "ENDING_FAILURE", "description": "Тьма.", "choices": []}
            ]
        });
        assert_eq!(doc.as_value(), &expected);

        let strict = service_with(FakeProvider::replying("groq", LIGHTHOUSE_REPLY))
            .with_schema_check(true);
        assert!(strict
            .generate_quest(&request("groq", Some("valid-key")))
            .is_ok());
    }

    #[test]
    fn test_missing_input() {
        let service = service_with(FakeProvider::replying("groq", "{}"));
        let mut req = request("groq", Some("k"));
        req.setting = Some("   ".into());
        assert!(matches!(
            service.generate_quest(&req),
            Err(QuestError::MissingInput("setting"))
        ));

        let mut req = request("groq", Some("k"));
        req.provider = None;
        assert!(matches!(
            service.generate_quest(&req),
            Err(QuestError::MissingInput("provider"))
        ));
    }

    #[test]
    fn test_empty_credential_never_reaches_backend() {
        let fake = FakeProvider::replying("gemini", LIGHTHOUSE_REPLY);
        let calls = fake.calls.clone();
        let service = service_with(fake);
        assert!(matches!(
            service.generate_quest(&request("gemini", Some(""))),
            Err(QuestError::EmptyCredential { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_reply_is_no_content() {
        let service = service_with(FakeProvider::replying("openai", ""));
        assert!(matches!(
            service.generate_quest(&request("openai", Some("k"))),
            Err(QuestError::NoContent)
        ));
    }

    #[test]
    fn test_schema_check_is_opt_in() {
        let reply = r#"{"questTitle": "Too short", "startNodeId": "a", "nodes": []}"#;
        let lenient = service_with(FakeProvider::replying("groq", reply));
        assert!(lenient.generate_quest(&request("groq", Some("k"))).is_ok());

        let strict = service_with(FakeProvider::replying("groq", reply)).with_schema_check(true);
        assert!(matches!(
            strict.generate_quest(&request("groq", Some("k"))),
            Err(QuestError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_local_model_absent() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(LocalProvider::new(
            dir.path().to_path_buf(),
            LocalModelConfig::default(),
        )));
        let service = QuestService::new(registry);

        let req = GenerateRequest {
            setting: Some("любой сеттинг".into()),
            api_key: None,
            provider: Some("local".into()),
            model: Some("nonexistent.gguf".into()),
        };
        let err = service.generate_quest(&req).unwrap_err();
        assert!(matches!(err, QuestError::LocalModelNotFound(_)));
        assert!(err.user_message().contains("Локальная модель не найдена"));
    }

    #[test]
    fn test_validation_shapes() {
        let registry = ProviderRegistry::from_config(&Config::default()).unwrap();
        let service = QuestService::new(registry);

        let ok: ValidationResponse = service.validate_credential("local", Some("")).into();
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({"status": "ok"}));

        let err: ValidationResponse = service.validate_credential("foobar", Some("k")).into();
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"status": "error", "message": "Неизвестный API провайдер: foobar"})
        );
        assert!(err.is_error());
    }

    #[test]
    fn test_generate_and_models_shapes() {
        let service = service_with(FakeProvider::failing("groq", "HTTP 401 Unauthorized"));

        let resp: GenerateResponse = service.generate_quest(&request("groq", Some("k"))).into();
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({"error": "Неверный API ключ. Пожалуйста, проверьте ваш ключ."})
        );

        let resp: ModelsResponse = service.list_models("foobar", Some("k")).into();
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({"error": "Неизвестный API провайдер: foobar"})
        );

        let ok = service_with(FakeProvider::replying("groq", "{}"));
        let resp: ModelsResponse = ok.list_models("groq", Some("k")).into();
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({"models": ["fake-default"]})
        );
        assert!(!resp.is_error());
    }
}
