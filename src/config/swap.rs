//! `[swap]` section configuration.
//!
//! Contains page content swapping settings.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[swap]` section in jqdoc.toml - page content swapping.
///
/// # Example
/// ```toml
/// [swap]
/// content_id = "main"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SwapConfig {
    /// Id of the element whose children are replaced on navigation.
    #[serde(default = "defaults::swap::content_id")]
    #[educe(Default = defaults::swap::content_id())]
    pub content_id: String,

    /// Attribute set on internal links once they are routed through the swapper.
    #[serde(default = "defaults::swap::link_marker")]
    #[educe(Default = defaults::swap::link_marker())]
    pub link_marker: String,
}

#[cfg(test)]
mod tests {
    use super::super::RunnerConfig;

    #[test]
    fn test_swap_config() {
        let config = r#"
            [swap]
            content_id = "main"
        "#;
        let config: RunnerConfig = toml::from_str(config).unwrap();

        assert_eq!(config.swap.content_id, "main");
        assert_eq!(config.swap.link_marker, "data-swap");
    }
}
