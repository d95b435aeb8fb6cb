//! Prompt catalog: the default fragment plus one fragment per topic.
//!
//! Loaded from TOML:
//!
//! ```toml
//! default_prompt = "Listen first..."
//!
//! [[topics]]
//! id = "stress"
//! label = "Stress and overwhelm"
//! priority = 0
//! prompt = "The user seems stressed..."
//! examples = ["I have too much work", "..."]
//! ```
//!
//! A catalog without a default prompt is rejected at construction, the only
//! routing condition that stops the application.

use mindchat_config::AppConfig;
use mindchat_core::{CatalogError, PromptFragment};
use mindchat_index::TopicExemplars;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const BUILTIN_CATALOG: &str = include_str!("../catalog/default.toml");
const BUILTIN_ORIGIN: &str = "<built-in>";

/// One topic as written in the catalog file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicEntry {
    pub id: String,
    #[serde(default)]
    pub label: String,
    /// Tie-break priority; lower wins.
    #[serde(default)]
    pub priority: i32,
    pub prompt: String,
    /// Utterances whose embeddings are averaged into the topic anchor.
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    default_prompt: Option<String>,
    #[serde(default)]
    topics: Vec<TopicEntry>,
}

/// Immutable map from topic to prompt fragment.
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    default: PromptFragment,
    topics: Vec<TopicEntry>,
    fragments: HashMap<String, PromptFragment>,
}

impl PromptCatalog {
    /// Build a catalog, failing fast when it could not serve every lookup.
    pub fn new(default_prompt: Option<String>, topics: Vec<TopicEntry>) -> Result<Self, CatalogError> {
        let default_prompt = default_prompt
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| CatalogError::Misconfigured("no default prompt fragment".into()))?;

        let mut seen = HashSet::new();
        let mut fragments = HashMap::with_capacity(topics.len());
        let mut entries = Vec::with_capacity(topics.len());

        for mut topic in topics {
            topic.id = topic.id.trim().to_string();
            if topic.id.is_empty() {
                return Err(CatalogError::Misconfigured("topic with an empty id".into()));
            }
            if !seen.insert(topic.id.clone()) {
                return Err(CatalogError::Misconfigured(format!(
                    "duplicate topic id '{}'",
                    topic.id
                )));
            }
            let prompt = topic.prompt.trim();
            if prompt.is_empty() {
                return Err(CatalogError::Misconfigured(format!(
                    "topic '{}' has an empty prompt",
                    topic.id
                )));
            }
            if topic.label.trim().is_empty() {
                topic.label = topic.id.clone();
            }
            fragments.insert(topic.id.clone(), PromptFragment::for_topic(&topic.id, prompt));
            entries.push(topic);
        }

        debug!(topics = entries.len(), "Prompt catalog built");
        Ok(Self {
            default: PromptFragment::default_fragment(default_prompt),
            topics: entries,
            fragments,
        })
    }

    /// Parse catalog TOML. `origin` only labels errors.
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(content).map_err(|e| CatalogError::Parse {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::new(file.default_prompt, file.topics)
    }

    /// Load a catalog file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let catalog = Self::from_toml_str(&content, path)?;
        info!(path = %path.display(), topics = catalog.len(), "Prompt catalog loaded");
        Ok(catalog)
    }

    /// The counseling catalog compiled into the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml_str(BUILTIN_CATALOG, &PathBuf::from(BUILTIN_ORIGIN))
    }

    /// The configured catalog file, or the built-in one.
    pub fn from_config(config: &AppConfig) -> Result<Self, CatalogError> {
        match config.catalog_path() {
            Some(path) => Self::load(&path),
            None => Self::builtin(),
        }
    }

    /// Fragment for `topic_id`; `None` or an unknown id yields the default.
    pub fn lookup(&self, topic_id: Option<&str>) -> &PromptFragment {
        topic_id
            .and_then(|id| self.fragments.get(id))
            .unwrap_or(&self.default)
    }

    pub fn default_fragment(&self) -> &PromptFragment {
        &self.default
    }

    pub fn contains(&self, topic_id: &str) -> bool {
        self.fragments.contains_key(topic_id)
    }

    pub fn topics(&self) -> &[TopicEntry] {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Routing inputs for anchor construction, in catalog order.
    pub fn exemplars(&self) -> Vec<TopicExemplars> {
        self.topics
            .iter()
            .map(|t| TopicExemplars {
                topic_id: t.id.clone(),
                label: t.label.clone(),
                priority: t.priority,
                examples: t.examples.clone(),
            })
            .collect()
    }
}
