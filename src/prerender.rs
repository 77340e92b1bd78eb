//! Static rendering of a page with its snippets wired and, optionally, run.

use crate::{
    bridge::Bridge,
    dom::{Document, DomError},
    log,
    snippet::SnippetError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Markup(#[from] DomError),

    #[error(transparent)]
    Snippet(#[from] SnippetError),
}

/// A rendered page plus what happened to its snippets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub html: String,
    pub widgets: usize,
    /// Snippets whose query exited non-zero
    pub failed: usize,
}

/// Wire every snippet in `html`. With `execute`, run each one in page order
/// and keep its output in the markup.
pub async fn render(bridge: &Bridge, html: &str, execute: bool) -> Result<Rendered, RenderError> {
    let page = Document::parse(html)?.into_page();
    let controller = bridge.controller(page);
    let root = controller.page().borrow().root();
    let widgets = controller.discover(root);

    let mut failed = 0;
    if execute && !widgets.is_empty() {
        bridge.start();
        for &id in &widgets {
            let result = controller.run(id).await?;
            if result.is_error() {
                log!("render"; "{id} exited with {}", result.exit_code);
                failed += 1;
            }
        }
    }

    let html = controller.page().borrow().html();
    Ok(Rendered {
        html,
        widgets: widgets.len(),
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RunnerConfig,
        gateway::GatewayError,
        module::{LoadState, loader::testing::Broken},
    };
    use std::sync::Arc;

    const PAGE: &str = concat!(
        r#"<div><code class="language-jq" data-source="[1,2,3]">.[1]</code></div>"#,
        r#"<div><code class="language-jq" data-source="{}">.[</code></div>"#
    );

    #[tokio::test]
    async fn test_render_without_execute_never_loads() {
        let bridge = Bridge::new(RunnerConfig::default());
        let rendered = render(&bridge, PAGE, false).await.unwrap();

        assert_eq!(rendered.widgets, 2);
        assert_eq!(rendered.failed, 0);
        assert!(rendered.html.contains(r#"<textarea class="input" rows="1">.[1]</textarea>"#));
        assert!(rendered.html.contains(r#"<code class="result"></code>"#));
        assert!(matches!(bridge.loader().state(), LoadState::Pending));
    }

    #[tokio::test]
    async fn test_render_with_execute() {
        let bridge = Bridge::new(RunnerConfig::default());
        let rendered = render(&bridge, PAGE, true).await.unwrap();

        assert_eq!(rendered.failed, 1);
        assert!(rendered.html.contains(r#"<code class="result">2</code>"#));
        assert!(rendered.html.contains(r#"<span class="stderr">jq: error: syntax error"#));
    }

    #[tokio::test]
    async fn test_render_with_broken_interpreter() {
        let bridge = Bridge::with_bootstrap(RunnerConfig::default(), Arc::new(Broken));
        let err = render(&bridge, PAGE, true).await.unwrap_err();
        assert!(matches!(
            err,
            RenderError::Snippet(SnippetError::Gateway(GatewayError::Unavailable(_)))
        ));
    }
}
