//! Anchor file persistence.
//!
//! A pretty-printed JSON document holding the computed anchors plus the
//! identity of what produced them. A file is reused only if the model id,
//! dimension, and catalog fingerprint all still match.

use chrono::{DateTime, Utc};
use mindchat_core::TopicAnchor;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::anchors::TopicExemplars;

#[derive(Debug, Error)]
pub enum AnchorStoreError {
    #[error("Failed to read anchor file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse anchor file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Failed to write anchor file {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

/// On-disk anchor set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorFile {
    pub model_id: String,
    pub dimension: usize,
    pub catalog_fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub anchors: Vec<TopicAnchor>,
}

impl AnchorFile {
    pub fn new(
        model_id: impl Into<String>,
        dimension: usize,
        catalog_fingerprint: impl Into<String>,
        anchors: Vec<TopicAnchor>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            dimension,
            catalog_fingerprint: catalog_fingerprint.into(),
            created_at: Utc::now(),
            anchors,
        }
    }

    /// Load from `path`. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>, AnchorStoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AnchorStoreError::Read {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        let file: Self = serde_json::from_str(&content).map_err(|e| AnchorStoreError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), anchors = file.anchors.len(), "Anchor file loaded");
        Ok(Some(file))
    }

    /// Write to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), AnchorStoreError> {
        let write_err = |reason: String| AnchorStoreError::Write {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        // Write beside the target then rename, so readers never see half a file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| write_err(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| write_err(e.to_string()))?;

        debug!(path = %path.display(), anchors = self.anchors.len(), "Anchor file written");
        Ok(())
    }

    /// True when these anchors were built by the same model from the same catalog.
    pub fn matches(&self, model_id: &str, dimension: usize, fingerprint: &str) -> bool {
        self.model_id == model_id
            && self.dimension == dimension
            && self.catalog_fingerprint == fingerprint
            && self.anchors.iter().all(|a| a.vector.len() == dimension)
    }
}

/// SHA-256 over topic ids, labels, priorities and exemplars, independent of
/// topic order.
pub fn catalog_fingerprint(topics: &[TopicExemplars]) -> String {
    let mut sorted: Vec<&TopicExemplars> = topics.iter().collect();
    sorted.sort_by(|a, b| a.topic_id.cmp(&b.topic_id));

    let mut hasher = Sha256::new();
    for topic in sorted {
        hasher.update(topic.topic_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(topic.label.as_bytes());
        hasher.update([0u8]);
        hasher.update(topic.priority.to_le_bytes());
        for example in &topic.examples {
            hasher.update(example.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([0xffu8]);
    }
    format!("{:x}", hasher.finalize())
}
