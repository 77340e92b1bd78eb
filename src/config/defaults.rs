//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// [interpreter] Section Defaults
// ============================================================================

pub mod interpreter {
    use std::path::PathBuf;

    /// Well-known input path inside the module filesystem.
    pub fn input_path() -> PathBuf {
        "/input.json".into()
    }

    /// Disable colorized output; the module believes it writes to a terminal.
    pub fn baseline_flags() -> Vec<String> {
        vec!["-M".into()]
    }

    pub fn fs_quota() -> String {
        "1MB".into()
    }
}

// ============================================================================
// [snippet] Section Defaults
// ============================================================================

pub mod snippet {
    pub fn class() -> String {
        "language-jq".into()
    }

    pub fn source_attr() -> String {
        "data-source".into()
    }

    pub fn options_attr() -> String {
        "data-options".into()
    }

    pub fn reference_marker() -> String {
        "#".into()
    }

    pub fn wired_marker() -> String {
        "data-jq-wired".into()
    }

    pub fn input_class() -> String {
        "input".into()
    }

    pub fn output_class() -> String {
        "result".into()
    }

    pub fn stderr_class() -> String {
        "stderr".into()
    }

    pub fn unavailable_class() -> String {
        "unavailable".into()
    }

    pub fn button_class() -> String {
        "run".into()
    }

    pub fn button_label() -> String {
        "Run code".into()
    }
}

// ============================================================================
// [swap] Section Defaults
// ============================================================================

pub mod swap {
    pub fn content_id() -> String {
        "content".into()
    }

    pub fn link_marker() -> String {
        "data-swap".into()
    }
}
