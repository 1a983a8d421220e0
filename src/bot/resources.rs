//! Static templates, persona prompts and pictures shipped with the bot.
//!
//! Layout under the resource root:
//! - `messages/<name>.txt`: greeting texts shown by commands
//! - `prompts/<name>.txt`: prompts sent to the model (`random`, `talk_<persona>`)
//! - `images/<name>.jpg`: pictures sent before a reply

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

/// Read-only store. Files are read on first use and cached for good.
pub struct Resources {
    root: PathBuf,
    cache: RwLock<HashMap<PathBuf, Arc<str>>>,
}

impl Resources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// A message template, or `fallback` if the file is missing.
    pub async fn message_or(&self, name: &str, fallback: &str) -> String {
        match self.read(&self.root.join("messages").join(format!("{name}.txt"))).await {
            Ok(text) => text.to_string(),
            Err(e) => {
                warn!("Message template '{name}' unavailable: {e}");
                fallback.to_string()
            }
        }
    }

    /// A prompt. Unlike messages these have no sensible fallback.
    pub async fn prompt(&self, name: &str) -> Result<Arc<str>, String> {
        self.read(&self.root.join("prompts").join(format!("{name}.txt"))).await
    }

    /// Path of a picture, if it exists.
    pub fn image(&self, name: &str) -> Option<PathBuf> {
        let path = self.root.join("images").join(format!("{name}.jpg"));
        if path.is_file() {
            Some(path)
        } else {
            warn!("No picture for '{name}' at {}", path.display());
            None
        }
    }

    async fn read(&self, path: &Path) -> Result<Arc<str>, String> {
        let cached = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned();
        if let Some(text) = cached {
            return Ok(text);
        }

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;
        let text: Arc<str> = Arc::from(text.trim_end());

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf(), text.clone());
        Ok(text)
    }
}
