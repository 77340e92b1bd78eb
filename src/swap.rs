//! Page content swapping.
//!
//! Navigation replaces the children of the content container instead of
//! loading a new page, then hands the new content back to the snippet
//! controller so its widgets get wired.
//!
//! ```text
//! navigate(url)
//!   │ fetch ──► parse ──► extract container
//!   ▼
//! replace children ──► prune stale widgets ──► discover ──► rehook links
//! ```

use crate::{
    config::SwapConfig,
    dom::{Document, DomError, NodeId},
    log,
    snippet::{SnippetController, WidgetId},
};
use std::{
    borrow::Cow,
    fs,
    future::Future,
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("page not found: {0}")]
    NotFound(String),

    #[error("failed to read {0}")]
    Io(PathBuf, #[source] io::Error),

    #[error("fetch task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Markup(#[from] DomError),

    #[error("element is not a link")]
    NoHref,

    #[error("link `{0}` is not routed through the swapper")]
    NotHooked(String),
}

/// Where page markup comes from.
pub trait PageSource {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, SwapError>>;
}

/// Serves pages from a built site directory.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a URL path to a file.
    ///
    /// Resolution order:
    /// 1. Exact file match
    /// 2. Directory with `index.html`
    /// 3. Nothing found
    pub fn resolve(&self, url: &str) -> Option<PathBuf> {
        // Decode URL-encoded characters (e.g., %20 → space)
        let url_path = urlencoding::decode(url)
            .map(Cow::into_owned)
            .unwrap_or_else(|_| url.to_string());

        let path_without_query = url_path.split(['?', '#']).next().unwrap_or(&url_path);
        let request_path = path_without_query.trim_matches('/');
        if request_path.split('/').any(|segment| segment == "..") {
            return None;
        }

        let local_path = self.root.join(request_path);
        if local_path.is_file() {
            return Some(local_path);
        }
        let index_path = local_path.join("index.html");
        index_path.is_file().then_some(index_path)
    }
}

impl PageSource for DirSource {
    async fn fetch(&self, url: &str) -> Result<String, SwapError> {
        let path = self
            .resolve(url)
            .ok_or_else(|| SwapError::NotFound(url.to_string()))?;

        tokio::task::spawn_blocking(move || {
            fs::read_to_string(&path).map_err(|err| SwapError::Io(path, err))
        })
        .await
        .map_err(|err| SwapError::Task(err.to_string()))?
    }
}

/// Outcome of one navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapReport {
    pub url: String,
    pub widgets: Vec<WidgetId>,
    pub pruned: usize,
    pub links: usize,
}

pub struct PageSwapper<S> {
    source: S,
    controller: SnippetController,
    settings: SwapConfig,
}

impl<S: PageSource> PageSwapper<S> {
    pub fn new(source: S, controller: SnippetController, settings: SwapConfig) -> Self {
        Self {
            source,
            controller,
            settings,
        }
    }

    pub fn controller(&self) -> &SnippetController {
        &self.controller
    }

    /// Element whose children get replaced: the configured id, else `<body>`,
    /// else the document itself.
    pub fn container(&self, doc: &Document) -> NodeId {
        doc.get_element_by_id(&self.settings.content_id)
            .or_else(|| doc.elements_by_tag(doc.root(), "body").first().copied())
            .unwrap_or_else(|| doc.root())
    }

    /// Wire the initial page: discover widgets and hook links everywhere.
    pub fn start(&self) -> SwapReport {
        let root = self.controller.page().borrow().root();
        let widgets = self.controller.discover(root);
        let links = self.rehook_links(root);
        SwapReport {
            url: String::new(),
            widgets,
            pruned: 0,
            links,
        }
    }

    pub async fn navigate(&self, url: &str) -> Result<SwapReport, SwapError> {
        log!("swap"; "navigating to {url}");
        let html = self.source.fetch(url).await?;

        let incoming = Document::parse(&html)?;
        let fragment = incoming.inner_html(self.container(&incoming));

        let target = {
            let mut page = self.controller.page().borrow_mut();
            let target = self.container(&page);
            page.set_inner_html(target, &fragment)?;
            target
        };

        let pruned = self.controller.prune();
        let widgets = self.controller.discover(target);
        let links = self.rehook_links(target);

        log!(
            "swap";
            "{url}: {} widget(s), {} link(s), {pruned} pruned",
            widgets.len(),
            links
        );
        Ok(SwapReport {
            url: url.to_string(),
            widgets,
            pruned,
            links,
        })
    }

    /// Mark internal links below `root`. Returns how many were newly marked.
    pub fn rehook_links(&self, root: NodeId) -> usize {
        let marker = &self.settings.link_marker;
        let mut page = self.controller.page().borrow_mut();

        let links: Vec<NodeId> = page
            .elements_by_tag(root, "a")
            .into_iter()
            .filter(|&link| !page.has_attr(link, marker))
            .filter(|&link| page.attr(link, "href").is_some_and(is_internal))
            .collect();

        for &link in &links {
            page.set_attr(link, marker, "");
        }
        links.len()
    }

    /// Navigate to the target of a hooked link.
    pub async fn follow(&self, link: NodeId) -> Result<SwapReport, SwapError> {
        let href = {
            let page = self.controller.page().borrow();
            let href = page.attr(link, "href").ok_or(SwapError::NoHref)?;
            if !page.has_attr(link, &self.settings.link_marker) {
                return Err(SwapError::NotHooked(href.to_string()));
            }
            href.to_string()
        };
        self.navigate(&href).await
    }
}

/// Same-site absolute path: one leading `/`, not a protocol-relative `//`.
fn is_internal(href: &str) -> bool {
    href.starts_with('/') && !href.starts_with("//")
}
