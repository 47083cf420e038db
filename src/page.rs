//! Pages, page sources and the page store.
//!
//! A `Page` is created once and reused across many renders. Its content is
//! produced by a `PageSource` (the parser/loader side) the first time the
//! page is initialized, and is immutable afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use page_ast::{Fragment, PageContent};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{PageSourceError, RenderError};
use crate::format::OutputFormat;

/// Virtual path given to pages built from inline content
pub const EPHEMERAL_PATH: &str = "<ephemeral>";

/// Produces the parsed content for a page path
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn load(&self, path: &str) -> Result<PageContent, PageSourceError>;
}

/// Source wrapping content that is already parsed
#[derive(Debug, Clone)]
pub struct StaticSource {
    content: PageContent,
}

impl StaticSource {
    pub fn new(content: PageContent) -> Self {
        Self { content }
    }
}

#[async_trait]
impl PageSource for StaticSource {
    async fn load(&self, _path: &str) -> Result<PageContent, PageSourceError> {
        Ok(self.content.clone())
    }
}

pub struct Page {
    path: String,
    source: Arc<dyn PageSource>,
    format: Option<Arc<dyn OutputFormat>>,
    ephemeral: bool,
    content: OnceCell<PageContent>,
}

impl Page {
    pub fn new(path: impl Into<String>, source: Arc<dyn PageSource>) -> Self {
        Self {
            path: path.into(),
            source,
            format: None,
            ephemeral: false,
            content: OnceCell::new(),
        }
    }

    /// Durable page over already-parsed content
    pub fn from_content(path: impl Into<String>, content: PageContent) -> Self {
        Self::new(path, Arc::new(StaticSource::new(content)))
    }

    /// Temporary page over inline content.
    ///
    /// Binding accessors evaluated inside an ephemeral page are compiled
    /// fresh on every use instead of being cached.
    pub fn ephemeral(content: PageContent) -> Self {
        Self {
            ephemeral: true,
            ..Self::from_content(EPHEMERAL_PATH, content)
        }
    }

    pub fn with_format(mut self, format: Arc<dyn OutputFormat>) -> Self {
        self.format = Some(format);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn format(&self) -> Option<&Arc<dyn OutputFormat>> {
        self.format.as_ref()
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    pub fn is_initialized(&self) -> bool {
        self.content.initialized()
    }

    /// Load the page content; later calls return the memoized content
    pub async fn init(&self) -> Result<&PageContent, PageSourceError> {
        self.content
            .get_or_try_init(|| async {
                debug!(path = %self.path, "initializing page");
                self.source.load(&self.path).await
            })
            .await
    }

    pub fn content(&self) -> Result<&PageContent, RenderError> {
        self.content.get().ok_or_else(|| RenderError::NotInitialized {
            path: self.path.clone(),
        })
    }

    pub fn fragments(&self) -> Result<&[Fragment], RenderError> {
        Ok(&self.content()?.fragments)
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("path", &self.path)
            .field("ephemeral", &self.ephemeral)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// PAGE LOOKUP
// =============================================================================

/// Resolves layouts and partials by name
pub trait PageResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<Page>>;
}

fn normalize(name: &str) -> &str {
    name.trim().trim_start_matches('/')
}

/// In-memory page store keyed by virtual path
#[derive(Default)]
pub struct PageStore {
    pages: RwLock<HashMap<String, Arc<Page>>>,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a page under its own path
    pub fn insert(&self, page: Page) -> Arc<Page> {
        let page = Arc::new(page);
        self.insert_arc(page.clone());
        page
    }

    pub fn insert_arc(&self, page: Arc<Page>) {
        let key = normalize(page.path()).to_string();
        self.pages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, page);
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Page>> {
        self.pages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(normalize(name))
    }

    pub fn len(&self) -> usize {
        self.pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PageResolver for PageStore {
    fn resolve(&self, name: &str) -> Option<Arc<Page>> {
        self.pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(normalize(name))
            .cloned()
    }
}
