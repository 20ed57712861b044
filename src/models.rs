pub mod catalog;

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{bail, Context};
use log::{debug, info, warn};
use regex::Regex;
use serde::Serialize;

use crate::error::QuestError;

/// File extension of runnable local models.
pub const MODEL_EXTENSION: &str = "gguf";

// ---------------------------------------------------------------------------
// Model listings
// ---------------------------------------------------------------------------

/// A model file found in the local model directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalModel {
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// What a provider reports from `list_models`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ModelList {
    Names(Vec<String>),
    Files(Vec<LocalModel>),
}

impl ModelList {
    pub fn len(&self) -> usize {
        match self {
            Self::Names(v) => v.len(),
            Self::Files(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Dated snapshot collapsing
// ---------------------------------------------------------------------------

/// Trailing snapshot markers: `-latest`, `-2024-05-01`, `-20240501`, `-0613`, `-002`.
static SNAPSHOT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-(?:latest|\d{4}-\d{2}-\d{2}|\d{8}|(?:0[1-9]|1[0-2])\d{2}|\d{3})$")
        .expect("suffix pattern is valid")
});

/// Strip every trailing snapshot marker from a model id.
pub fn base_model_name(id: &str) -> &str {
    let mut name = id;
    while let Some(m) = SNAPSHOT_SUFFIX.find(name) {
        if m.start() == 0 {
            break;
        }
        name = &name[..m.start()];
    }
    name
}

/// One sorted entry per model family instead of one per dated snapshot.
pub fn collapse_model_names<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    ids.into_iter()
        .map(|id| base_model_name(id.as_ref()).to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ---------------------------------------------------------------------------
// Local model directory
// ---------------------------------------------------------------------------

/// Model files in `dir`, sorted by name. A missing directory has no models.
pub fn list_local(dir: &Path) -> io::Result<Vec<LocalModel>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Model directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut models = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !has_model_extension(&path) {
            continue;
        }
        // follows symlinks, so a linked model file is listed with its real size
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Skipping {}: {e}", path.display());
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }
        models.push(LocalModel {
            name: entry.file_name().to_string_lossy().into_owned(),
            size: meta.len(),
        });
    }
    models.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(models)
}

fn has_model_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(MODEL_EXTENSION))
}

/// Path of the model file `name` inside `dir`.
///
/// `name` must be a bare file name; anything that could leave `dir` is
/// treated as a model that does not exist.
pub fn resolve_local(dir: &Path, name: &str) -> Result<PathBuf, QuestError> {
    let candidate = Path::new(name);
    let mut components = candidate.components();
    let is_bare = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    let path = dir.join(candidate);

    if !is_bare || !path.is_file() {
        return Err(QuestError::LocalModelNotFound(path));
    }
    Ok(path)
}

/// Remove a model file from the local model directory.
pub fn delete_local(dir: &Path, name: &str) -> anyhow::Result<()> {
    let path = resolve_local(dir, name)?;
    fs::remove_file(&path)?;
    info!("Deleted local model {}", path.display());
    Ok(())
}

/// How [`import_local`] brings a file into the model directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    Copy,
    Move,
}

/// Copy or move `source` into `dir` under its own file name and return the
/// new path. An existing model is only replaced when `overwrite` is set.
pub fn import_local(
    dir: &Path,
    source: &Path,
    mode: ImportMode,
    overwrite: bool,
) -> anyhow::Result<PathBuf> {
    if !source.is_file() {
        bail!("source is not a file: {}", source.display());
    }
    let name = source
        .file_name()
        .with_context(|| format!("source has no file name: {}", source.display()))?;
    if !has_model_extension(source) {
        warn!(
            "{} does not have the .{MODEL_EXTENSION} extension and will not be listed",
            source.display()
        );
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create model directory {}", dir.display()))?;
    let target = dir.join(name);
    if target.exists() && !overwrite {
        bail!("{} already exists (use --force to replace it)", target.display());
    }

    match mode {
        ImportMode::Copy => {
            fs::copy(source, &target)
                .with_context(|| format!("failed to copy {}", source.display()))?;
        }
        ImportMode::Move => {
            if let Err(e) = fs::rename(source, &target) {
                // rename cannot cross filesystems
                debug!("rename failed ({e}), copying instead");
                fs::copy(source, &target)
                    .with_context(|| format!("failed to copy {}", source.display()))?;
                fs::remove_file(source)
                    .with_context(|| format!("failed to remove {}", source.display()))?;
            }
        }
    }
    info!("Imported {} into {}", source.display(), dir.display());
    Ok(target)
}
