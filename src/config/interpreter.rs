//! `[interpreter]` section configuration.
//!
//! Contains settings for the embedded interpreter module and its virtual I/O.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[interpreter]` section in jqdoc.toml - module filesystem and invocation settings.
///
/// # Example
/// ```toml
/// [interpreter]
/// input_path = "/tmp/input.json"
/// baseline_flags = ["-M"]
/// fs_quota = "512KB"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct InterpreterConfig {
    /// Absolute path inside the module filesystem that receives input data.
    /// Reused by every invocation.
    #[serde(default = "defaults::interpreter::input_path")]
    #[educe(Default = defaults::interpreter::input_path())]
    pub input_path: PathBuf,

    /// Flags placed before caller options on every invocation.
    #[serde(default = "defaults::interpreter::baseline_flags")]
    #[educe(Default = defaults::interpreter::baseline_flags())]
    pub baseline_flags: Vec<String>,

    /// Maximum size of a single file written into the module filesystem.
    /// Supports B, KB and MB suffixes.
    #[serde(default = "defaults::interpreter::fs_quota")]
    #[educe(Default = defaults::interpreter::fs_quota())]
    pub fs_quota: String,
}
