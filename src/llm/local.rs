use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::Result;
use log::{debug, info};
use regex::Regex;

use crate::config::LocalModelConfig;
use crate::error::QuestError;
use crate::llm::Provider;
use crate::models::{self, ModelList};

// ---------------------------------------------------------------------------
// Local GGUF models
// ---------------------------------------------------------------------------

/// Runs a model file from the local model directory in-process.
///
/// The model is loaded from disk on every call and dropped afterwards, so
/// concurrent calls share no inference state.
pub struct LocalProvider {
    model_dir: PathBuf,
    config: LocalModelConfig,
}

impl LocalProvider {
    pub fn new(model_dir: PathBuf, config: LocalModelConfig) -> Self {
        Self { model_dir, config }
    }
}

impl Provider for LocalProvider {
    fn id(&self) -> &'static str {
        "local"
    }

    fn requires_credential(&self) -> bool {
        false
    }

    fn generate(&self, prompt: &str, _credential: &str, model: Option<&str>) -> Result<String> {
        let name = model.ok_or(QuestError::MissingInput("model"))?;
        let path = models::resolve_local(&self.model_dir, name)?;
        info!("Running local model {}", path.display());

        let raw = run_model(&path, &self.config, prompt)?;
        Ok(strip_think(&raw))
    }

    fn validate_credential(&self, _credential: &str) -> Result<()> {
        Ok(())
    }

    fn list_models(&self, _credential: &str) -> Result<ModelList> {
        Ok(ModelList::Files(models::list_local(&self.model_dir)?))
    }
}

#[cfg(feature = "local")]
fn run_model(path: &std::path::Path, config: &LocalModelConfig, prompt: &str) -> Result<String> {
    super::runtime::complete(path, config, prompt)
}

#[cfg(not(feature = "local"))]
fn run_model(_path: &std::path::Path, _config: &LocalModelConfig, _prompt: &str) -> Result<String> {
    Err(QuestError::LocalRuntimeUnavailable(
        "built without the `local` feature (llama.cpp bindings)".into(),
    )
    .into())
}

// ---------------------------------------------------------------------------
// Reasoning blocks
// ---------------------------------------------------------------------------

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>(.*?)</think>").expect("think pattern is valid"));

/// Drop `<think>...</think>` blocks some local models emit before answering.
pub fn strip_think(raw: &str) -> String {
    for cap in THINK_BLOCK.captures_iter(raw) {
        let thought = cap.get(1).map_or("", |m| m.as_str()).trim();
        if !thought.is_empty() {
            debug!("Model thinking:\n{thought}");
        }
    }
    THINK_BLOCK.replace_all(raw, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error;

    fn provider(dir: &std::path::Path) -> LocalProvider {
        LocalProvider::new(dir.to_path_buf(), LocalModelConfig::default())
    }

    #[test]
    fn test_strip_think() {
        let raw = "<think>The user wants a lighthouse.</think>\n{\"questTitle\": \"Маяк\"}";
        assert_eq!(strip_think(raw), "{\"questTitle\": \"Маяк\"}");
        assert_eq!(strip_think("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_missing_model_file_fails_before_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let err = provider(dir.path())
            .generate("prompt", "", Some("nonexistent.gguf"))
            .unwrap_err();
        let err = error::from_backend("local", "nonexistent.gguf", err);
        match err {
            QuestError::LocalModelNotFound(path) => {
                assert_eq!(path, dir.path().join("nonexistent.gguf"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_model_is_required() {
        let dir = tempfile::tempdir().unwrap();
        let err = provider(dir.path()).generate("prompt", "", None).unwrap_err();
        assert!(matches!(
            error::from_backend("local", "", err),
            QuestError::MissingInput("model")
        ));
    }

    #[test]
    fn test_lists_files_with_sizes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tiny.gguf"), vec![0u8; 42]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        match provider(dir.path()).list_models("").unwrap() {
            ModelList::Files(files) => {
                assert_eq!(files.len(), 1);
                assert_eq!(files[0].name, "tiny.gguf");
                assert_eq!(files[0].size, 42);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(provider(&dir.path().join("absent"))
            .list_models("")
            .unwrap()
            .is_empty());
    }

    #[cfg(not(feature = "local"))]
    #[test]
    fn test_runtime_unavailable_without_feature() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m.gguf"), b"x").unwrap();
        let err = provider(dir.path())
            .generate("prompt", "", Some("m.gguf"))
            .unwrap_err();
        assert!(matches!(
            error::from_backend("local", "m.gguf", err),
            QuestError::LocalRuntimeUnavailable(_)
        ));
    }
}
