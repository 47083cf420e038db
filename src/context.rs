//! Process-wide render context.
//!
//! Holds everything shared by unrelated render passes: global arguments,
//! global filter providers, page lookup by name, the binding accessor cache
//! and the default output format.

use std::fmt;
use std::sync::Arc;

use page_ast::Value;

use crate::binding::BindingCache;
use crate::config::RenderConfig;
use crate::filters::{default_filters, FilterProvider};
use crate::format::OutputFormat;
use crate::page::{PageResolver, PageStore};
use crate::scope::Args;

pub struct RenderContext {
    config: RenderConfig,
    args: Arc<Args>,
    /// Caller providers (registration order) followed by the default catalog
    filters: Vec<Arc<dyn FilterProvider>>,
    registered: usize,
    pages: Arc<dyn PageResolver>,
    bindings: BindingCache,
    format: Arc<dyn OutputFormat>,
}

impl RenderContext {
    /// Create a context with the default filter catalog and an empty page store
    pub fn new(config: RenderConfig) -> Self {
        Self {
            args: Arc::new(config.global_args()),
            format: config.format(),
            filters: vec![Arc::new(default_filters())],
            registered: 0,
            pages: Arc::new(PageStore::new()),
            bindings: BindingCache::new(),
            config,
        }
    }

    /// Set the page lookup used for layouts and partials
    pub fn with_pages(mut self, pages: Arc<dyn PageResolver>) -> Self {
        self.pages = pages;
        self
    }

    /// Add a global filter provider.
    ///
    /// Providers are searched in registration order, all of them ahead of
    /// the default catalog.
    pub fn with_filters(mut self, provider: impl FilterProvider + 'static) -> Self {
        self.filters.insert(self.registered, Arc::new(provider));
        self.registered += 1;
        self
    }

    /// Add a global argument
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.args).insert(name.into(), value.into());
        self
    }

    pub fn with_format(mut self, format: Arc<dyn OutputFormat>) -> Self {
        self.format = format;
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn args(&self) -> &Arc<Args> {
        &self.args
    }

    pub fn filters(&self) -> &[Arc<dyn FilterProvider>] {
        &self.filters
    }

    pub fn pages(&self) -> &Arc<dyn PageResolver> {
        &self.pages
    }

    pub fn bindings(&self) -> &BindingCache {
        &self.bindings
    }

    pub fn format(&self) -> &Arc<dyn OutputFormat> {
        &self.format
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new(RenderConfig::default())
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("args", &self.args.len())
            .field(
                "filters",
                &self.filters.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("format", &self.format.name())
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}
