//! `[snippet]` section configuration.
//!
//! Contains the widget markup contract: which elements are runnable snippets
//! and how the generated scaffolding is labelled.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[snippet]` section in jqdoc.toml - widget markup contract.
///
/// # Example
/// ```toml
/// [snippet]
/// class = "language-jq"
/// source_attr = "data-source"
/// button_label = "Run"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SnippetConfig {
    /// Class marking an element as a runnable snippet.
    #[serde(default = "defaults::snippet::class")]
    #[educe(Default = defaults::snippet::class())]
    pub class: String,

    /// Attribute holding literal input data or a reference to another element.
    #[serde(default = "defaults::snippet::source_attr")]
    #[educe(Default = defaults::snippet::source_attr())]
    pub source_attr: String,

    /// Attribute holding space-separated interpreter flags.
    #[serde(default = "defaults::snippet::options_attr")]
    #[educe(Default = defaults::snippet::options_attr())]
    pub options_attr: String,

    /// Prefix turning a source value into an element-id lookup.
    #[serde(default = "defaults::snippet::reference_marker")]
    #[educe(Default = defaults::snippet::reference_marker())]
    pub reference_marker: String,

    /// Attribute set on snippets that already have scaffolding.
    #[serde(default = "defaults::snippet::wired_marker")]
    #[educe(Default = defaults::snippet::wired_marker())]
    pub wired_marker: String,

    #[serde(default = "defaults::snippet::input_class")]
    #[educe(Default = defaults::snippet::input_class())]
    pub input_class: String,

    #[serde(default = "defaults::snippet::output_class")]
    #[educe(Default = defaults::snippet::output_class())]
    pub output_class: String,

    /// Class of the span wrapping interpreter error text inside the output.
    #[serde(default = "defaults::snippet::stderr_class")]
    #[educe(Default = defaults::snippet::stderr_class())]
    pub stderr_class: String,

    /// Class added to the output when the interpreter cannot be reached.
    #[serde(default = "defaults::snippet::unavailable_class")]
    #[educe(Default = defaults::snippet::unavailable_class())]
    pub unavailable_class: String,

    #[serde(default = "defaults::snippet::button_class")]
    #[educe(Default = defaults::snippet::button_class())]
    pub button_class: String,

    #[serde(default = "defaults::snippet::button_label")]
    #[educe(Default = defaults::snippet::button_label())]
    pub button_label: String,
}

#[cfg(test)]
mod tests {
    use super::super::RunnerConfig;

    #[test]
    fn test_snippet_config_defaults() {
        let config: RunnerConfig = toml::from_str("").unwrap();

        assert_eq!(config.snippet.class, "language-jq");
        assert_eq!(config.snippet.source_attr, "data-source");
        assert_eq!(config.snippet.options_attr, "data-options");
        assert_eq!(config.snippet.reference_marker, "#");
        assert_eq!(config.snippet.button_label, "Run code");
    }

    #[test]
    fn test_snippet_config_override() {
        let config = r##"
            [snippet]
            class = "runnable"
            reference_marker = "@"
            button_label = "Run"
        "##;
        let config: RunnerConfig = toml::from_str(config).unwrap();

        assert_eq!(config.snippet.class, "runnable");
        assert_eq!(config.snippet.reference_marker, "@");
        assert_eq!(config.snippet.button_label, "Run");
        // untouched fields keep their defaults
        assert_eq!(config.snippet.output_class, "result");
    }
}
