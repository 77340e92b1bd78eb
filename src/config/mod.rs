//! Runner configuration management for `jqdoc.toml`.
//!
//! # Sections
//!
//! | Section          | Purpose                                          |
//! |------------------|--------------------------------------------------|
//! | `[interpreter]`  | Module filesystem path, baseline flags, quota    |
//! | `[snippet]`      | Widget markup contract and scaffolding labels    |
//! | `[swap]`         | Page content container and link marker           |
//!
//! # Example
//!
//! ```toml
//! [interpreter]
//! input_path = "/input.json"
//! baseline_flags = ["-M"]
//!
//! [snippet]
//! class = "language-jq"
//! button_label = "Run code"
//!
//! [swap]
//! content_id = "content"
//! ```

pub mod defaults;
mod error;
mod interpreter;
mod snippet;
mod swap;

pub use error::ConfigError;
pub use interpreter::InterpreterConfig;
pub use snippet::SnippetConfig;
pub use swap::SwapConfig;

use crate::cli::Cli;
use anyhow::{Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B (bytes), KB (kilobytes), MB (megabytes).
/// Case-insensitive for the suffix.
///
/// # Examples
/// ```ignore
/// parse_size_string("20KB") // → Some(20480)
/// parse_size_string("5MB")  // → Some(5242880)
/// parse_size_string("100")  // → Some(100) (defaults to bytes)
/// ```
///
/// Returns `None` for a malformed number or a size that overflows `usize`.
fn parse_size_string(s: &str) -> Option<usize> {
    let s = s.to_uppercase();
    let (multiplier, suffix_len) = if s.ends_with("MB") {
        (1024 * 1024, 2)
    } else if s.ends_with("KB") {
        (1024, 2)
    } else if s.ends_with('B') {
        (1, 1)
    } else {
        (1, 0)
    };
    let value: usize = s[..s.len() - suffix_len].trim().parse().ok()?;
    value.checked_mul(multiplier)
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing jqdoc.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Path to the config file (set after loading, empty when defaults are used)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Interpreter module settings
    #[serde(default)]
    pub interpreter: InterpreterConfig,

    /// Widget markup contract
    #[serde(default)]
    pub snippet: SnippetConfig,

    /// Page content swapping
    #[serde(default)]
    pub swap: SwapConfig,
}

impl RunnerConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: RunnerConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let mut config = Self::from_str(&content)?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Load the config named by the CLI, falling back to defaults when the
    /// file does not exist, then apply CLI overrides and validate.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = if cli.config.exists() {
            Self::from_path(&cli.config)?
        } else {
            Self::default()
        };
        config.update_with_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Module filesystem quota in bytes.
    /// Per-file quota in bytes. Unparsable values count as zero;
    /// `validate` rejects them before this is used.
    pub fn fs_quota_bytes(&self) -> usize {
        parse_size_string(&self.interpreter.fs_quota).unwrap_or(0)
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        Self::update_option(&mut self.interpreter.input_path, cli.input_path.as_ref());
        Self::update_option(&mut self.snippet.class, cli.class.as_ref());
        self.interpreter.fs_quota = self.interpreter.fs_quota.to_uppercase();
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let input_path = &self.interpreter.input_path;
        if !input_path.is_absolute() || input_path.file_name().is_none() {
            bail!(ConfigError::Validation(format!(
                "[interpreter.input_path] must be an absolute file path, got `{}`",
                input_path.display()
            )));
        }

        let valid_size_suffixes = ["B", "KB", "MB"];
        let quota = self.interpreter.fs_quota.to_uppercase();
        if !valid_size_suffixes.iter().any(|s| quota.ends_with(s)) {
            bail!(ConfigError::Validation(
                "[interpreter.fs_quota] must end with B, KB, or MB".into()
            ));
        }
        match parse_size_string(&quota) {
            None => bail!(ConfigError::Validation(format!(
                "[interpreter.fs_quota] `{}` is not a valid size",
                self.interpreter.fs_quota
            ))),
            Some(0) => bail!(ConfigError::Validation(
                "[interpreter.fs_quota] must be greater than zero".into()
            )),
            Some(_) => {}
        }

        for (field, value) in [
            ("[snippet.class]", &self.snippet.class),
            ("[snippet.source_attr]", &self.snippet.source_attr),
            ("[snippet.reference_marker]", &self.snippet.reference_marker),
            ("[snippet.wired_marker]", &self.snippet.wired_marker),
            ("[swap.content_id]", &self.swap.content_id),
            ("[swap.link_marker]", &self.swap.link_marker),
        ] {
            if value.trim().is_empty() {
                bail!(ConfigError::Validation(format!("{field} must not be empty")));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_size_string() {
        assert_eq!(parse_size_string("20KB"), Some(20 * 1024));
        assert_eq!(parse_size_string("20kb"), Some(20 * 1024));
        assert_eq!(parse_size_string("5MB"), Some(5 * 1024 * 1024));
        assert_eq!(parse_size_string("100B"), Some(100));
        assert_eq!(parse_size_string("100"), Some(100));
        assert_eq!(parse_size_string("0KB"), Some(0));
        assert_eq!(parse_size_string("invalid"), None);
        assert_eq!(parse_size_string("18014398509481984MB"), None);
    }

    #[test]
    fn test_overflowing_quota_rejected() {
        let config = RunnerConfig::from_str(
            r#"
            [interpreter]
            fs_quota = "18014398509481984MB"
        "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not a valid size"));
        assert_eq!(config.fs_quota_bytes(), 0);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = RunnerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fs_quota_bytes(), 1024 * 1024);
    }

    #[test]
    fn test_relative_input_path_rejected() {
        let config = RunnerConfig::from_str(
            r#"
            [interpreter]
            input_path = "input.json"
        "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("input_path"));
    }

    #[test]
    fn test_bad_quota_rejected() {
        let config = RunnerConfig::from_str(
            r#"
            [interpreter]
            fs_quota = "12GB"
        "#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config = RunnerConfig::from_str(
            r#"
            [interpreter]
            fs_quota = "0KB"
        "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_marker_rejected() {
        let config = RunnerConfig::from_str(
            r#"
            [snippet]
            wired_marker = " "
        "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("wired_marker"));
    }

    #[test]
    fn test_from_path_records_location() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[swap]\ncontent_id = \"main\"").unwrap();

        let config = RunnerConfig::from_path(file.path()).unwrap();
        assert_eq!(config.config_path, file.path());
        assert_eq!(config.swap.content_id, "main");
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = RunnerConfig::from_path(Path::new("/nonexistent/jqdoc.toml")).unwrap_err();
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "jqdoc",
            "-C",
            "/nonexistent/jqdoc.toml",
            "--input-path",
            "/tmp/override.json",
            "--class",
            "runnable",
            "run",
            ".",
        ]);
        let config = RunnerConfig::load(&cli).unwrap();

        assert_eq!(config.interpreter.input_path, Path::new("/tmp/override.json"));
        assert_eq!(config.snippet.class, "runnable");
        assert!(config.config_path.as_os_str().is_empty());
    }
}
