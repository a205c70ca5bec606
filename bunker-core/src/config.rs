//! Editor configuration.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the store file.
pub const STORE_PATH_VAR: &str = "BUNKER_STORE_PATH";
/// Environment variable overriding the title quiet period, in milliseconds.
pub const TITLE_DEBOUNCE_VAR: &str = "BUNKER_TITLE_DEBOUNCE_MS";
/// Environment variable overriding the content quiet period, in milliseconds.
pub const CONTENT_DEBOUNCE_VAR: &str = "BUNKER_CONTENT_DEBOUNCE_MS";
/// Environment variable naming the feedback model.
pub const MODEL_VAR: &str = "BUNKER_MODEL";

/// Errors reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a whole number of milliseconds, got {value:?}")]
    InvalidDuration { var: &'static str, value: String },
}

/// Configuration for an editing session.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorConfig {
    /// Store file. `None` keeps everything in memory.
    pub store_path: Option<PathBuf>,

    /// Quiet period before a title edit is written.
    pub title_debounce: Duration,

    /// Quiet period before a content edit is written.
    pub content_debounce: Duration,

    /// Model for AI feedback. `None` uses the client default.
    pub model: Option<String>,

    /// Maximum tokens for feedback responses.
    pub max_tokens: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            title_debounce: Duration::from_millis(500),
            content_debounce: Duration::from_millis(1000),
            model: None,
            max_tokens: 2048,
        }
    }
}

impl EditorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read overrides through `lookup`. Unset and empty variables keep their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(path) = get(STORE_PATH_VAR) {
            config.store_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = get(TITLE_DEBOUNCE_VAR) {
            config.title_debounce = parse_millis(TITLE_DEBOUNCE_VAR, &raw)?;
        }
        if let Some(raw) = get(CONTENT_DEBOUNCE_VAR) {
            config.content_debounce = parse_millis(CONTENT_DEBOUNCE_VAR, &raw)?;
        }
        if let Some(model) = get(MODEL_VAR) {
            config.model = Some(model);
        }

        Ok(config)
    }

    /// Set the store file.
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Set the title quiet period.
    pub fn with_title_debounce(mut self, delay: Duration) -> Self {
        self.title_debounce = delay;
        self
    }

    /// Set the content quiet period.
    pub fn with_content_debounce(mut self, delay: Duration) -> Self {
        self.content_debounce = delay;
        self
    }

    /// Set the feedback model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set max tokens for feedback responses.
    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = tokens;
        self
    }
}

fn parse_millis(var: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidDuration {
            var,
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EditorConfig::default();
        assert_eq!(config.title_debounce, Duration::from_millis(500));
        assert_eq!(config.content_debounce, Duration::from_millis(1000));
        assert!(config.store_path.is_none());
    }

    #[test]
    fn test_lookup_overrides() {
        let config = EditorConfig::from_lookup(lookup(&[
            (STORE_PATH_VAR, "/tmp/novel.json"),
            (TITLE_DEBOUNCE_VAR, "250"),
            (MODEL_VAR, ""),
        ]))
        .unwrap();

        assert_eq!(config.store_path, Some(PathBuf::from("/tmp/novel.json")));
        assert_eq!(config.title_debounce, Duration::from_millis(250));
        assert_eq!(config.content_debounce, Duration::from_millis(1000));
        assert!(config.model.is_none());
    }

    #[test]
    fn test_bad_duration_is_rejected() {
        let err = EditorConfig::from_lookup(lookup(&[(CONTENT_DEBOUNCE_VAR, "soon")])).unwrap_err();
        assert!(err.to_string().contains(CONTENT_DEBOUNCE_VAR));
    }

    #[test]
    fn test_builder() {
        let config = EditorConfig::new()
            .with_title_debounce(Duration::ZERO)
            .with_model("claude-sonnet-4-20250514");
        assert_eq!(config.title_debounce, Duration::ZERO);
        assert_eq!(config.model.as_deref(), Some("claude-sonnet-4-20250514"));
    }
}
