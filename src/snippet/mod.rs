//! Snippet controller: turns marked code elements into runnable widgets.
//!
//! # Scaffolding
//!
//! ```text
//! <div>                                   <div>
//!   <code class="language-jq"               <textarea class="input" rows="1">.a</textarea>
//!         data-source="{...}">.a</code> ─►  <code class="language-jq" hidden data-jq-wired>…</code>
//! </div>                                    <code class="result"></code>
//!                                           <button class="run">Run code</button>
//!                                         </div>
//! ```
//!
//! Discovery never waits for the interpreter; runs queue in the gateway until
//! it is ready. All page access happens on one thread through `RefCell`s, and
//! no borrow is held across an `.await`.

mod widget;

pub use widget::{Key, KeyEvent, KeyOutcome, WidgetBinding, WidgetId, WidgetState, line_count};

use crate::{
    config::SnippetConfig,
    dom::{Document, NodeId, Page},
    gateway::{Gateway, GatewayError},
    io::InvocationResult,
    log,
};
use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnippetError {
    #[error("unknown {0}")]
    UnknownWidget(WidgetId),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

pub struct SnippetController {
    page: Page,
    gateway: Gateway,
    settings: SnippetConfig,
    widgets: RefCell<BTreeMap<WidgetId, WidgetBinding>>,
    next_id: Cell<usize>,
}

impl SnippetController {
    pub fn new(page: Page, gateway: Gateway, settings: SnippetConfig) -> Self {
        Self {
            page,
            gateway,
            settings,
            widgets: RefCell::new(BTreeMap::new()),
            next_id: Cell::new(0),
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn settings(&self) -> &SnippetConfig {
        &self.settings
    }

    /// Wire every unwired snippet below `root`. Returns the new widgets.
    pub fn discover(&self, root: NodeId) -> Vec<WidgetId> {
        let candidates = self
            .page
            .borrow()
            .elements_by_class(root, &self.settings.class);

        let wired: Vec<WidgetId> = candidates
            .into_iter()
            .filter_map(|element| self.wire(element))
            .collect();

        if !wired.is_empty() {
            log!("snippet"; "wired {} widget(s)", wired.len());
        }
        wired
    }

    fn wire(&self, element: NodeId) -> Option<WidgetId> {
        let settings = &self.settings;
        let mut page = self.page.borrow_mut();

        if page.has_attr(element, &settings.wired_marker) {
            let bound = self
                .widgets
                .borrow()
                .values()
                .any(|binding| binding.source_element == element);
            if bound {
                return None;
            }
            // marked by another controller, e.g. a pre-rendered page
            strip_scaffolding(&mut page, element, settings);
        }
        let raw = match page.attr(element, &settings.source_attr) {
            Some(raw) if !raw.is_empty() => raw.to_string(),
            _ => {
                log!("snippet"; "skipping snippet without {}", settings.source_attr);
                return None;
            }
        };
        let source = match raw.strip_prefix(settings.reference_marker.as_str()) {
            Some(target) => match page.get_element_by_id(target) {
                Some(node) => page.text_content(node),
                None => {
                    log!("snippet"; "skipping snippet: no element `{raw}`");
                    return None;
                }
            },
            None => raw,
        };
        let container = page.parent(element)?;

        let options: Vec<String> = page
            .attr(element, &settings.options_attr)
            .map(|opts| opts.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let text = page.text_content(element).trim().to_string();

        let input = page.create_element("textarea");
        page.set_attr(input, "class", &settings.input_class);
        page.set_text(input, &text);
        page.set_attr(input, "rows", &line_count(&text).to_string());
        page.prepend_child(container, input);

        page.set_attr(element, "hidden", "");

        let output = page.create_element("code");
        page.set_attr(output, "class", &settings.output_class);
        page.append_child(container, output);

        let trigger = page.create_element("button");
        page.set_attr(trigger, "class", &settings.button_class);
        page.set_text(trigger, &settings.button_label);
        page.append_child(container, trigger);

        page.set_attr(element, &settings.wired_marker, "");

        let id = WidgetId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.widgets.borrow_mut().insert(
            id,
            WidgetBinding {
                source_element: element,
                input,
                output,
                trigger,
                source,
                options,
                state: WidgetState::Idle,
            },
        );
        Some(id)
    }

    pub fn widgets(&self) -> Vec<WidgetId> {
        self.widgets.borrow().keys().copied().collect()
    }

    pub fn binding(&self, id: WidgetId) -> Option<WidgetBinding> {
        self.widgets.borrow().get(&id).cloned()
    }

    fn node_of(&self, id: WidgetId, pick: fn(&WidgetBinding) -> NodeId) -> Result<NodeId, SnippetError> {
        self.widgets
            .borrow()
            .get(&id)
            .map(pick)
            .ok_or(SnippetError::UnknownWidget(id))
    }

    /// Current query text of the widget's input.
    pub fn input_text(&self, id: WidgetId) -> Result<String, SnippetError> {
        let input = self.node_of(id, WidgetBinding::input)?;
        Ok(self.page.borrow().text_content(input))
    }

    /// Serialized content of the widget's output.
    pub fn output_html(&self, id: WidgetId) -> Result<String, SnippetError> {
        let output = self.node_of(id, WidgetBinding::output)?;
        Ok(self.page.borrow().inner_html(output))
    }

    /// Replace the query text and resize the input to fit.
    pub fn edit(&self, id: WidgetId, text: &str) -> Result<(), SnippetError> {
        let input = self.node_of(id, WidgetBinding::input)?;
        let mut page = self.page.borrow_mut();
        page.set_text(input, text);
        page.set_attr(input, "rows", &line_count(text).to_string());
        Ok(())
    }

    /// Enter with a modifier runs the widget; everything else is left alone.
    pub async fn key_press(&self, id: WidgetId, event: KeyEvent) -> Result<KeyOutcome, SnippetError> {
        if !self.widgets.borrow().contains_key(&id) {
            return Err(SnippetError::UnknownWidget(id));
        }
        if !event.is_run_shortcut() {
            return Ok(KeyOutcome::Ignored);
        }
        self.run(id).await?;
        Ok(KeyOutcome::Handled)
    }

    /// Run the widget's current query against its source.
    pub async fn run(&self, id: WidgetId) -> Result<InvocationResult, SnippetError> {
        let (source, options, input, output) = {
            let mut widgets = self.widgets.borrow_mut();
            let binding = widgets
                .get_mut(&id)
                .ok_or(SnippetError::UnknownWidget(id))?;
            binding.state = WidgetState::Running;
            (
                binding.source.clone(),
                binding.options.clone(),
                binding.input,
                binding.output,
            )
        };

        let query = {
            let mut page = self.page.borrow_mut();
            page.clear_children(output);
            page.remove_class(output, &self.settings.unavailable_class);
            page.text_content(input)
        };

        let result = self.gateway.run(&source, &query, &options).await;

        let next = {
            let mut page = self.page.borrow_mut();
            match &result {
                Ok(res) => {
                    render_result(&mut page, output, res, &self.settings.stderr_class);
                    WidgetState::Idle
                }
                Err(err) => {
                    log!("error"; "{id}: {err}");
                    page.add_class(output, &self.settings.unavailable_class);
                    page.set_text(output, &err.to_string());
                    WidgetState::Unavailable
                }
            }
        };
        // the widget may have been pruned while the call was queued
        if let Some(binding) = self.widgets.borrow_mut().get_mut(&id) {
            binding.state = next;
        }

        result.map_err(SnippetError::from)
    }

    /// Forget widgets whose snippet element is no longer in the page.
    pub fn prune(&self) -> usize {
        let page = self.page.borrow();
        let mut widgets = self.widgets.borrow_mut();
        let before = widgets.len();
        widgets.retain(|_, binding| page.is_attached(binding.source_element));
        before - widgets.len()
    }
}

/// Drop the input, output and button left next to `element` by an earlier
/// wiring and unhide it.
fn strip_scaffolding(page: &mut Document, element: NodeId, settings: &SnippetConfig) {
    let Some(container) = page.parent(element) else {
        return;
    };
    let parts = [
        ("textarea", settings.input_class.as_str()),
        ("code", settings.output_class.as_str()),
        ("button", settings.button_class.as_str()),
    ];
    let stale: Vec<NodeId> = page
        .children(container)
        .iter()
        .copied()
        .filter(|&node| {
            node != element
                && parts
                    .iter()
                    .any(|&(tag, class)| page.tag(node) == Some(tag) && page.has_class(node, class))
        })
        .collect();

    log!("snippet"; "rewiring pre-rendered snippet ({} stale node(s))", stale.len());
    for node in stale {
        page.release(node);
    }
    page.remove_attr(element, "hidden");
    page.remove_attr(element, &settings.wired_marker);
}

/// Stdout as text, then non-empty stderr in its own span.
fn render_result(page: &mut Document, output: NodeId, result: &InvocationResult, stderr_class: &str) {
    page.clear_children(output);
    if !result.stdout.is_empty() {
        let text = page.create_text(&result.stdout);
        page.append_child(output, text);
    }
    if !result.stderr.is_empty() {
        let span = page.create_element("span");
        page.set_attr(span, "class", stderr_class);
        page.set_text(span, &result.stderr);
        page.append_child(output, span);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gateway::GatewaySettings,
        interp::JqBootstrap,
        module::{ModuleLoader, loader::testing::Broken},
    };
    use std::sync::Arc;

    const PAGE: &str = concat!(
        r#"<html><body><main id="content">"#,
        r#"<pre id="blob">{"a":[1,2]}</pre>"#,
        r#"<div id="one"><code class="language-jq" data-source="[1,2,3]">  .[1]  </code></div>"#,
        r##"<div id="two"><code class="language-jq" data-source="#blob" data-options="-c">.a</code></div>"##,
        r#"<div><code class="language-jq">.</code></div>"#,
        r##"<div><code class="language-jq" data-source="#missing">.</code></div>"##,
        r#"</main></body></html>"#
    );

    fn settings() -> GatewaySettings {
        GatewaySettings {
            input_path: "/input.json".into(),
            baseline_flags: vec!["-M".into()],
        }
    }

    fn controller(html: &str) -> SnippetController {
        let loader = ModuleLoader::new(Arc::new(JqBootstrap));
        let gateway = Gateway::spawn(loader.load(), settings());
        let page = Document::parse(html).unwrap().into_page();
        SnippetController::new(page, gateway, SnippetConfig::default())
    }

    fn root(controller: &SnippetController) -> NodeId {
        controller.page().borrow().root()
    }

    #[tokio::test]
    async fn test_discover_builds_scaffolding() {
        let controller = controller(PAGE);
        let wired = controller.discover(root(&controller));
        assert_eq!(wired.len(), 2);

        let page = controller.page().borrow();
        let one = page.get_element_by_id("one").unwrap();
        let tags: Vec<_> = page
            .children(one)
            .iter()
            .map(|&c| page.tag(c).unwrap().to_string())
            .collect();
        assert_eq!(tags, ["textarea", "code", "code", "button"]);

        let binding = controller.binding(wired[0]).unwrap();
        assert_eq!(page.text_content(binding.input()), ".[1]");
        assert_eq!(page.attr(binding.input(), "rows"), Some("1"));
        assert!(page.has_attr(binding.source_element(), "hidden"));
        assert!(page.has_attr(binding.source_element(), "data-jq-wired"));
        assert!(page.has_class(binding.output(), "result"));
        assert_eq!(page.text_content(binding.trigger()), "Run code");
        assert_eq!(binding.source(), "[1,2,3]");
        assert!(binding.options().is_empty());
    }

    #[tokio::test]
    async fn test_reference_source_and_options() {
        let controller = controller(PAGE);
        let wired = controller.discover(root(&controller));

        let binding = controller.binding(wired[1]).unwrap();
        assert_eq!(binding.source(), r#"{"a":[1,2]}"#);
        assert_eq!(binding.options(), ["-c"]);
    }

    #[tokio::test]
    async fn test_discover_is_idempotent() {
        let controller = controller(PAGE);
        let root = root(&controller);
        controller.discover(root);
        let before = controller.page().borrow().html();

        assert!(controller.discover(root).is_empty());
        assert_eq!(controller.widgets().len(), 2);
        assert_eq!(controller.page().borrow().html(), before);
    }

    #[tokio::test]
    async fn test_rewires_rendered_markup() {
        let first = controller(PAGE);
        let wired = first.discover(root(&first));
        first.run(wired[0]).await.unwrap();
        let rendered = first.page().borrow().html();

        let controller = controller(&rendered);
        let wired = controller.discover(root(&controller));
        assert_eq!(wired.len(), 2);
        assert!(controller.discover(root(&controller)).is_empty());

        {
            let page = controller.page().borrow();
            let one = page.get_element_by_id("one").unwrap();
            let tags: Vec<_> = page
                .children(one)
                .iter()
                .map(|&c| page.tag(c).unwrap().to_string())
                .collect();
            assert_eq!(tags, ["textarea", "code", "code", "button"]);
            assert_eq!(page.elements_by_tag(page.root(), "button").len(), 2);
        }

        let binding = controller.binding(wired[0]).unwrap();
        assert_eq!(controller.output_html(wired[0]).unwrap(), "");
        assert_eq!(controller.input_text(wired[0]).unwrap(), ".[1]");
        assert!(controller.page().borrow().has_attr(binding.source_element(), "hidden"));
        controller.run(wired[0]).await.unwrap();
        assert_eq!(controller.output_html(wired[0]).unwrap(), "2");
    }

    #[tokio::test]
    async fn test_repeated_runs_reuse_nodes() {
        let controller = controller(PAGE);
        let wired = controller.discover(root(&controller));

        controller.edit(wired[0], ".[0], .[1] + \"x\"").unwrap();
        controller.run(wired[0]).await.unwrap();
        let baseline = controller.page().borrow().node_count();

        for _ in 0..1000 {
            controller.run(wired[0]).await.unwrap();
        }
        assert_eq!(controller.page().borrow().node_count(), baseline);
        assert!(
            controller
                .output_html(wired[0])
                .unwrap()
                .starts_with("1<span class=\"stderr\">")
        );
    }

    #[tokio::test]
    async fn test_skipped_snippets_stay_unmarked() {
        let controller = controller(PAGE);
        controller.discover(root(&controller));

        let page = controller.page().borrow();
        let unmarked = page
            .elements_by_class(page.root(), "language-jq")
            .into_iter()
            .filter(|&n| !page.has_attr(n, "data-jq-wired"))
            .count();
        assert_eq!(unmarked, 2);
    }

    #[tokio::test]
    async fn test_run_writes_output() {
        let controller = controller(PAGE);
        let wired = controller.discover(root(&controller));

        let result = controller.run(wired[0]).await.unwrap();
        assert_eq!(result.stdout, "2");
        assert_eq!(controller.output_html(wired[0]).unwrap(), "2");

        controller.run(wired[1]).await.unwrap();
        assert_eq!(controller.output_html(wired[1]).unwrap(), "[1,2]");
        assert_eq!(controller.binding(wired[1]).unwrap().state(), WidgetState::Idle);
    }

    #[tokio::test]
    async fn test_output_is_escaped() {
        let html = r#"<div><code class="language-jq" data-source='{"t":"&lt;tag&gt;"}'>.t</code></div>"#;
        let controller = controller(html);
        let wired = controller.discover(root(&controller));

        controller.run(wired[0]).await.unwrap();
        assert_eq!(controller.output_html(wired[0]).unwrap(), "\"&lt;tag&gt;\"");
    }

    #[tokio::test]
    async fn test_stderr_rendered_after_stdout() {
        let controller = controller(PAGE);
        let wired = controller.discover(root(&controller));

        controller.edit(wired[0], ".[0], .[1] + \"x\"").unwrap();
        let result = controller.run(wired[0]).await.unwrap();
        assert_eq!(result.exit_code, 5);

        let html = controller.output_html(wired[0]).unwrap();
        assert!(html.starts_with("1<span class=\"stderr\">jq: error"));
        assert!(html.ends_with("</span>"));
    }

    #[tokio::test]
    async fn test_edit_resizes_input() {
        let controller = controller(PAGE);
        let wired = controller.discover(root(&controller));

        controller.edit(wired[0], ".[0]\n| . + 1\n").unwrap();
        assert_eq!(controller.input_text(wired[0]).unwrap(), ".[0]\n| . + 1\n");

        let input = controller.binding(wired[0]).unwrap().input();
        assert_eq!(controller.page().borrow().attr(input, "rows"), Some("3"));

        controller.run(wired[0]).await.unwrap();
        assert_eq!(controller.output_html(wired[0]).unwrap(), "2");
    }

    #[tokio::test]
    async fn test_key_press() {
        let controller = controller(PAGE);
        let wired = controller.discover(root(&controller));

        let plain = controller
            .key_press(wired[0], KeyEvent::new(Key::Enter))
            .await
            .unwrap();
        assert_eq!(plain, KeyOutcome::Ignored);
        assert_eq!(controller.output_html(wired[0]).unwrap(), "");

        let run = controller
            .key_press(wired[0], KeyEvent::new(Key::Enter).with_shift())
            .await
            .unwrap();
        assert_eq!(run, KeyOutcome::Handled);
        assert_eq!(controller.output_html(wired[0]).unwrap(), "2");
    }

    #[tokio::test]
    async fn test_unavailable_interpreter() {
        let loader = ModuleLoader::new(Arc::new(Broken));
        let gateway = Gateway::spawn(loader.load(), settings());
        let page = Document::parse(PAGE).unwrap().into_page();
        let controller = SnippetController::new(page, gateway, SnippetConfig::default());
        let wired = controller.discover(root(&controller));

        let err = controller.run(wired[0]).await.unwrap_err();
        assert!(matches!(
            err,
            SnippetError::Gateway(GatewayError::Unavailable(_))
        ));

        let binding = controller.binding(wired[0]).unwrap();
        assert_eq!(binding.state(), WidgetState::Unavailable);
        let page = controller.page().borrow();
        assert!(page.has_class(binding.output(), "unavailable"));
        assert!(page.text_content(binding.output()).contains("unavailable"));
    }

    #[tokio::test]
    async fn test_prune_detached_widgets() {
        let controller = controller(PAGE);
        let wired = controller.discover(root(&controller));

        {
            let mut page = controller.page().borrow_mut();
            let one = page.get_element_by_id("one").unwrap();
            page.remove(one);
        }
        assert_eq!(controller.prune(), 1);
        assert_eq!(controller.widgets(), vec![wired[1]]);
        assert!(matches!(
            controller.run(wired[0]).await,
            Err(SnippetError::UnknownWidget(_))
        ));
    }
}
