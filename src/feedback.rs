//! Append-only store of corrected answers.
//!
//! The file is a pretty-printed JSON array of
//! `{"instruction", "input", "output"}` records. Each append rewrites the
//! whole file through a uniquely named temporary sibling and a rename, so
//! readers never see a half-written array. Appends through one store are
//! serialised. An unreadable or malformed existing file is logged and
//! treated as empty.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use rag_core::models::FeedbackSample;
use tempfile::NamedTempFile;
use tracing::{info, warn};

pub struct FeedbackStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FeedbackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Existing records; empty when the file is missing or malformed.
    pub fn load(&self) -> Vec<FeedbackSample> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "feedback file unreadable, starting fresh");
                return Vec::new();
            }
        };

        if content.trim().is_empty() {
            return Vec::new();
        }

        match serde_json::from_str(&content) {
            Ok(samples) => samples,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "feedback file malformed, starting fresh");
                Vec::new()
            }
        }
    }

    /// Append one record. Returns the number of records now stored.
    pub fn record(&self, question: &str, correct_answer: &str) -> Result<usize> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("feedback write lock poisoned"))?;

        let mut samples = self.load();
        samples.push(FeedbackSample::new(question, correct_answer));

        let parent = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
                parent
            }
            None => Path::new("."),
        };

        let json = serde_json::to_string_pretty(&samples)?;
        let mut tmp = NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
        tmp.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write {}", tmp.path().display()))?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        info!(path = %self.path.display(), total = samples.len(), "feedback recorded");
        Ok(samples.len())
    }
}
