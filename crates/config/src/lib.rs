//! Configuration loading, validation, and management for MindChat.
//!
//! Loads configuration from `~/.mindchat/config.toml` (or
//! `$MINDCHAT_HOME/config.toml`) with environment variable overrides.
//! Validates all settings at startup.
//!
//! Routing and prompt tunables are optional keys: leaving one out means
//! "use the documented default", resolved by [`RoutingConfig::policy`] and
//! [`PromptConfig::max_length`] / [`PromptConfig::recent_messages`].

use mindchat_core::{ChatMode, TieBreak};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default similarity a topic must reach before the router locks onto it.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.55;
/// Default margin within which the current topic beats a better-scoring one.
pub const DEFAULT_SWITCH_MARGIN: f32 = 0.05;
/// Default number of low-confidence turns a lock survives.
pub const DEFAULT_GRACE_TURNS: u32 = 1;
/// Default number of candidates requested from the index.
pub const DEFAULT_TOP_K: usize = 3;
/// Default composed-prompt budget, in characters.
pub const DEFAULT_MAX_LENGTH: usize = 4000;
/// Default number of recent messages offered to the synthesizer.
pub const DEFAULT_RECENT_MESSAGES: usize = 8;

/// The root configuration structure.
///
/// Maps directly to `~/.mindchat/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application-level settings
    #[serde(default)]
    pub app: AppSection,

    /// Base persona shared by every mode
    #[serde(default)]
    pub persona: PersonaConfig,

    /// Topic routing policy
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Prompt synthesis budget
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Embedding model settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Topic catalog and anchor file locations
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Directory relative paths are resolved against (the config file's directory).
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppSection {
    /// Mode new sessions start in
    #[serde(default)]
    pub default_mode: ChatMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_base_prompt")]
    pub base_prompt: String,
}

fn default_base_prompt() -> String {
    "You are MindChat, a calm and supportive conversation partner that runs entirely \
     on this device. Listen carefully, reflect the user's feelings back to them, and \
     answer in short, warm paragraphs."
        .into()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            base_prompt: default_base_prompt(),
        }
    }
}

/// Routing tunables. Every key is optional; `None` means the default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_threshold: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_margin: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_turns: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tie_break: Option<TieBreak>,

    /// Whether switching a session's mode clears its topic lock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_on_mode_switch: Option<bool>,
}

/// Concrete routing policy with every default resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingPolicy {
    pub match_threshold: f32,
    pub switch_margin: f32,
    pub grace_turns: u32,
    pub top_k: usize,
    pub tie_break: TieBreak,
    pub reset_on_mode_switch: bool,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        RoutingConfig::default().policy()
    }
}

impl RoutingConfig {
    /// Resolve optional keys against the defaults.
    pub fn policy(&self) -> RoutingPolicy {
        RoutingPolicy {
            match_threshold: self.match_threshold.unwrap_or(DEFAULT_MATCH_THRESHOLD),
            switch_margin: self.switch_margin.unwrap_or(DEFAULT_SWITCH_MARGIN),
            grace_turns: self.grace_turns.unwrap_or(DEFAULT_GRACE_TURNS),
            top_k: self.top_k.unwrap_or(DEFAULT_TOP_K),
            tie_break: self.tie_break.unwrap_or_default(),
            reset_on_mode_switch: self.reset_on_mode_switch.unwrap_or(true),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Maximum composed prompt length in characters
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "max_length")]
    pub max_length_override: Option<usize>,

    /// How many recent messages are offered as context. 0 composes prompts
    /// without a transcript; routing still reads the latest user message.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "recent_messages")]
    pub recent_messages_override: Option<usize>,
}

impl PromptConfig {
    pub fn max_length(&self) -> usize {
        self.max_length_override.unwrap_or(DEFAULT_MAX_LENGTH)
    }

    pub fn recent_messages(&self) -> usize {
        self.recent_messages_override.unwrap_or(DEFAULT_RECENT_MESSAGES)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Explicit model directory; relative paths resolve against the config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,

    /// Hugging Face repo id used when the model has to be downloaded
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Directory name under `<config dir>/models/embedding/`
    #[serde(default = "default_model_dirname")]
    pub model_dirname: String,

    /// Fetch the model through the Hugging Face hub when it is not on disk
    #[serde(default = "default_true")]
    pub allow_download: bool,

    /// Number of distinct recent inputs whose embeddings are memoized
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

fn default_model_id() -> String {
    "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2".into()
}
fn default_model_dirname() -> String {
    "paraphrase-multilingual-MiniLM-L12-v2".into()
}
fn default_cache_size() -> usize {
    16
}
fn default_true() -> bool {
    true
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            model_id: default_model_id(),
            model_dirname: default_model_dirname(),
            allow_download: true,
            cache_size: default_cache_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Topic catalog TOML; the built-in counseling catalog when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Where computed anchors are cached; `<config dir>/anchors.json` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchors_path: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (`~/.mindchat/config.toml`).
    ///
    /// Environment overrides (highest priority):
    /// - `MINDCHAT_EMBEDDING_MODEL_PATH`: embedding model directory
    /// - `MINDCHAT_MODE`: `plain_chat` or `counseling`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(path) = std::env::var("MINDCHAT_EMBEDDING_MODEL_PATH") {
            config.override_model_path(&path);
        }

        if let Ok(mode) = std::env::var("MINDCHAT_MODE") {
            match mode.parse::<ChatMode>() {
                Ok(mode) => config.app.default_mode = mode,
                Err(e) => tracing::warn!("Ignoring MINDCHAT_MODE: {e}"),
            }
        }

        Ok(config)
    }

    /// Point the embedding model at `raw`, as given on the command line or in
    /// the environment. Relative paths resolve against the working directory,
    /// not the config directory. Blank input is ignored.
    pub fn override_model_path(&mut self, raw: &str) {
        let raw = raw.trim();
        if raw.is_empty() {
            return;
        }
        let path = match raw.strip_prefix("~/") {
            Some(rest) => dirs_home().join(rest),
            None => std::path::absolute(raw).unwrap_or_else(|_| PathBuf::from(raw)),
        };
        self.embedding.model_path = Some(path.to_string_lossy().into_owned());
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let base_dir = path.parent().map(Path::to_path_buf);

        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self {
                base_dir,
                ..Self::default()
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.base_dir = base_dir;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("MINDCHAT_HOME") {
            if !dir.trim().is_empty() {
                return PathBuf::from(dir);
            }
        }
        dirs_home().join(".mindchat")
    }

    /// Directory that relative paths in this config resolve against.
    pub fn base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(Self::config_dir)
    }

    /// Resolve a configured path: `~` expands to home, relative paths join the base dir.
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix("~/") {
            return dirs_home().join(rest);
        }
        let path = PathBuf::from(raw);
        if path.is_absolute() {
            path
        } else {
            self.base_dir().join(path)
        }
    }

    /// Candidate model directory: explicit `model_path`, else the managed models dir.
    pub fn embedding_model_dir(&self) -> PathBuf {
        match &self.embedding.model_path {
            Some(raw) if !raw.trim().is_empty() => self.resolve_path(raw),
            _ => self
                .base_dir()
                .join("models")
                .join("embedding")
                .join(&self.embedding.model_dirname),
        }
    }

    /// Topic catalog file, if one is configured.
    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.catalog
            .path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(|p| self.resolve_path(p))
    }

    /// Anchor cache file.
    pub fn anchors_path(&self) -> PathBuf {
        match self.catalog.anchors_path.as_deref() {
            Some(raw) if !raw.trim().is_empty() => self.resolve_path(raw),
            _ => self.base_dir().join("anchors.json"),
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let policy = self.routing.policy();

        if !(-1.0..=1.0).contains(&policy.match_threshold) {
            return Err(ConfigError::ValidationError(
                "routing.match_threshold must be between -1.0 and 1.0".into(),
            ));
        }

        if !(0.0..=2.0).contains(&policy.switch_margin) {
            return Err(ConfigError::ValidationError(
                "routing.switch_margin must be between 0.0 and 2.0".into(),
            ));
        }

        if policy.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "routing.top_k must be at least 1".into(),
            ));
        }

        if self.prompt.max_length() == 0 {
            return Err(ConfigError::ValidationError(
                "prompt.max_length must be at least 1".into(),
            ));
        }

        if self.embedding.cache_size == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.cache_size must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            persona: PersonaConfig::default(),
            routing: RoutingConfig::default(),
            prompt: PromptConfig::default(),
            embedding: EmbeddingConfig::default(),
            catalog: CatalogConfig::default(),
            base_dir: None,
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.app.default_mode, ChatMode::PlainChat);
        assert_eq!(config.embedding.cache_size, 16);
        assert!(config.embedding.allow_download);
    }

    #[test]
    fn missing_keys_resolve_to_defaults() {
        let policy = RoutingConfig::default().policy();
        assert_eq!(policy.match_threshold, 0.55);
        assert_eq!(policy.switch_margin, 0.05);
        assert_eq!(policy.grace_turns, 1);
        assert_eq!(policy.top_k, 3);
        assert_eq!(policy.tie_break, TieBreak::Priority);
        assert!(policy.reset_on_mode_switch);

        let prompt = PromptConfig::default();
        assert_eq!(prompt.max_length(), DEFAULT_MAX_LENGTH);
        assert_eq!(prompt.recent_messages(), DEFAULT_RECENT_MESSAGES);
    }

    #[test]
    fn partial_routing_section_keeps_other_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
[app]
default_mode = "counseling"

[routing]
match_threshold = 0.6
tie_break = "topic_id"

[prompt]
max_length = 1200
"#,
        )
        .unwrap();

        let policy = config.routing.policy();
        assert_eq!(config.app.default_mode, ChatMode::Counseling);
        assert_eq!(policy.match_threshold, 0.6);
        assert_eq!(policy.switch_margin, DEFAULT_SWITCH_MARGIN);
        assert_eq!(policy.tie_break, TieBreak::TopicId);
        assert_eq!(config.prompt.max_length(), 1200);
        assert_eq!(config.prompt.recent_messages(), DEFAULT_RECENT_MESSAGES);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.embedding.model_id, config.embedding.model_id);
        assert_eq!(parsed.persona.base_prompt, config.persona.base_prompt);
    }

    #[test]
    fn invalid_threshold_rejected() {
        let mut config = AppConfig::default();
        config.routing.match_threshold = Some(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_top_k_rejected() {
        let mut config = AppConfig::default();
        config.routing.top_k = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_margin_rejected() {
        let mut config = AppConfig::default();
        config.routing.switch_margin = Some(-0.1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.base_dir(), PathBuf::from("/nonexistent"));
        assert_eq!(config.routing.policy(), RoutingPolicy::default());
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[embedding]
model_path = "models/minilm"

[catalog]
path = "topics.toml"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.embedding_model_dir(), dir.path().join("models/minilm"));
        assert_eq!(config.catalog_path(), Some(dir.path().join("topics.toml")));
        assert_eq!(config.anchors_path(), dir.path().join("anchors.json"));
    }

    #[test]
    fn model_path_override_resolves_against_working_dir() {
        let mut config = AppConfig::load_from(Path::new("/srv/mindchat/config.toml")).unwrap();
        config.override_model_path("models/minilm");

        let expected = std::env::current_dir().unwrap().join("models/minilm");
        assert_eq!(config.embedding_model_dir(), expected);
        assert!(!config.embedding_model_dir().starts_with("/srv/mindchat"));
    }

    #[test]
    fn blank_model_path_override_is_ignored() {
        let mut config = AppConfig::default();
        config.override_model_path("   ");
        assert_eq!(config.embedding.model_path, None);
    }

    #[test]
    fn default_model_dir_uses_dirname() {
        let config = AppConfig::load_from(Path::new("/srv/mindchat/config.toml")).unwrap();
        assert_eq!(
            config.embedding_model_dir(),
            PathBuf::from("/srv/mindchat/models/embedding/paraphrase-multilingual-MiniLM-L12-v2")
        );
        assert_eq!(config.catalog_path(), None);
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[routing\nmatch_threshold = ").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn out_of_range_file_reports_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[embedding]\ncache_size = 0\n").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("paraphrase-multilingual-MiniLM-L12-v2"));
        assert!(toml_str.contains("plain_chat"));
    }
}
