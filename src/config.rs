//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MBOXBOOK_CONFIG` (environment variable)
//! 2. `~/.config/mboxbook/config.toml` (Linux/macOS)
//!    `%APPDATA%\mboxbook\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! The loaded [`Config`] is passed down the pipeline by reference; nothing
//! reads it from global state.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::book::group::GroupingStrategy;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Chapter grouping and page layout.
    pub book: BookConfig,
    /// Quote stripper tuning.
    pub quotes: QuotesConfig,
    /// Where images and glyphs are written or looked up.
    pub assets: AssetsConfig,
    /// Performance tuning.
    pub performance: PerformanceConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Chapter grouping and page layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BookConfig {
    /// How messages are partitioned into chapters.
    pub grouping: GroupingStrategy,
    /// `strftime` format string for message dates.
    pub date_format: String,
    /// Layout style; selects `<stylesheet_dir>/<layout>.css`.
    pub layout: String,
    /// Directory the stylesheet link points into, relative to the output.
    pub stylesheet_dir: String,
    /// Extra paragraphs appended to the colophon.
    pub colophon: Vec<String>,
}

/// Quote stripper tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotesConfig {
    /// Quote-marker lines needed after a reply header to confirm a quote.
    pub min_quote_run: usize,
    /// Extra trigger patterns, tried after the built-in ones.
    pub patterns: Vec<PatternConfig>,
}

/// A user-supplied quote trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Regex matched against one body line.
    pub regex: String,
    /// Override for `quotes.min_quote_run`; 0 cuts at the matching line.
    #[serde(default)]
    pub min_quote_run: Option<usize>,
}

/// Asset locations, relative to the output document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Inline images extracted from messages are written here.
    pub images_dir: String,
    /// Emoji glyph images are expected here as `<codepoints>.png`.
    pub emoji_dir: String,
}

/// Performance tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Worker threads for normalization (0 = one per core).
    pub threads: usize,
    /// Maximum message size in bytes (default: 268435456 = 256 MB).
    pub max_message_size: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            grouping: GroupingStrategy::default(),
            date_format: "%d %b %Y".to_string(),
            layout: "classic".to_string(),
            stylesheet_dir: "styles".to_string(),
            colophon: Vec::new(),
        }
    }
}

impl Default for QuotesConfig {
    fn default() -> Self {
        Self {
            min_quote_run: 2,
            patterns: Vec::new(),
        }
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            images_dir: "images".to_string(),
            emoji_dir: "emoji".to_string(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            max_message_size: crate::parser::mbox::MAX_MESSAGE_SIZE,
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// No file at all yields the default configuration.
pub fn load_config() -> anyhow::Result<Config> {
    match config_file_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => Ok(Config::default()),
    }
}

/// Load configuration from an explicit file.
///
/// Nothing is logged here: this runs before the subscriber exists, so the
/// caller reports the error once logging is up.
pub fn load_config_from(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config {}", path.display()))
}

/// Write `config` as TOML to `path`, creating parent directories.
pub fn save_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MBOXBOOK_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mboxbook").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mboxbook")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mboxbook.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.book.grouping, GroupingStrategy::Season);
        assert_eq!(cfg.book.date_format, "%d %b %Y");
        assert_eq!(cfg.book.layout, "classic");
        assert_eq!(cfg.quotes.min_quote_run, 2);
        assert_eq!(cfg.assets.images_dir, "images");
        assert_eq!(cfg.performance.threads, 0);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let mut cfg = Config::default();
        cfg.quotes.patterns.push(PatternConfig {
            regex: "^Sent from my".into(),
            min_quote_run: Some(0),
        });
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.book.grouping, cfg.book.grouping);
        assert_eq!(parsed.quotes.patterns, cfg.quotes.patterns);
        assert_eq!(
            parsed.performance.max_message_size,
            cfg.performance.max_message_size
        );
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.book.layout = "modern".into();
        save_config(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.book.layout, "modern");
        assert_eq!(loaded.quotes.min_quote_run, 2);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[book]
grouping = "correspondent"

[[quotes.patterns]]
regex = "^De: .+"
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.book.grouping, GroupingStrategy::Correspondent);
        assert_eq!(cfg.quotes.patterns.len(), 1);
        assert_eq!(cfg.quotes.patterns[0].min_quote_run, None);
        // Other fields use defaults
        assert_eq!(cfg.book.layout, "classic");
        assert_eq!(cfg.quotes.min_quote_run, 2);
    }

    #[test]
    fn test_unreadable_config_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_config_from(&dir.path().join("missing.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read config file"));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[book\nlayout = ").expect("write");
        let err = load_config_from(&bad).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }

    #[test]
    fn test_log_file_lives_in_cache_dir() {
        let mut cfg = Config::default();
        cfg.general.cache_dir = Some(PathBuf::from("/tmp/mboxbook-cache"));
        assert_eq!(
            log_file_path(&cfg),
            PathBuf::from("/tmp/mboxbook-cache/mboxbook.log")
        );
    }
}
