//! Page/layout render unit.
//!
//! `PageResult` binds a page to its layout, caller arguments, page-local
//! filters, output pipelines and format, and drives one render:
//!
//! ```text
//! Uninitialized -> Initializing -> Ready -> Rendered
//! ```
//!
//! Initialization finishes before any byte is written. Fragments are then
//! written strictly in document order; nested pages and partials render
//! inline within the parent's fragment walk.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use page_ast::{Fragment, Resolved, Value, VariableFragment};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::cancel::CancelSignal;
use crate::context::RenderContext;
use crate::error::RenderError;
use crate::evaluator::{Evaluator, Outcome};
use crate::filters::FilterProvider;
use crate::format::OutputFormat;
use crate::page::Page;
use crate::pipeline::{OutputPipeline, StreamFilter};
use crate::scope::{Args, ScopeChain};

/// Output sink for a render pass
pub type Sink<'a> = &'a mut (dyn AsyncWrite + Send + Unpin);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Uninitialized,
    Initializing,
    Ready,
    Rendered,
}

#[derive(Debug, Clone)]
enum LayoutChoice {
    /// Page-declared layout, else the configured default
    Default,
    Named(String),
    Page(Arc<Page>),
    Disabled,
}

pub struct PageResult {
    context: Arc<RenderContext>,
    page: Arc<Page>,
    layout_choice: LayoutChoice,
    args: Args,
    page_filters: Vec<Arc<dyn FilterProvider>>,
    page_pipeline: OutputPipeline,
    response_pipeline: OutputPipeline,
    format: Option<Arc<dyn OutputFormat>>,

    state: RenderState,
    layout: Option<Arc<Page>>,
    page_args: Arc<Args>,
    layout_args: Option<Arc<Args>>,
    rendered: Option<String>,
}

impl PageResult {
    pub fn new(context: Arc<RenderContext>, page: Arc<Page>) -> Self {
        Self {
            context,
            page,
            layout_choice: LayoutChoice::Default,
            args: Args::new(),
            page_filters: Vec::new(),
            page_pipeline: OutputPipeline::new(),
            response_pipeline: OutputPipeline::new(),
            format: None,
            state: RenderState::Uninitialized,
            layout: None,
            page_args: Arc::new(Args::new()),
            layout_args: None,
            rendered: None,
        }
    }

    /// Render inside the layout registered under `name`
    pub fn with_layout(mut self, name: impl Into<String>) -> Self {
        self.layout_choice = LayoutChoice::Named(name.into());
        self
    }

    pub fn with_layout_page(mut self, layout: Arc<Page>) -> Self {
        self.layout_choice = LayoutChoice::Page(layout);
        self
    }

    /// Ignore page-declared and default layouts
    pub fn no_layout(mut self) -> Self {
        self.layout_choice = LayoutChoice::Disabled;
        self
    }

    /// Render argument; overrides a page-declared argument of the same name
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn with_args(mut self, args: Args) -> Self {
        self.args.extend(args);
        self
    }

    /// Page-local filter provider, searched before every global provider
    pub fn with_filters(mut self, provider: impl FilterProvider + 'static) -> Self {
        self.page_filters.push(Arc::new(provider));
        self
    }

    /// Transform applied to each page, layout and partial output
    pub fn with_page_filter(mut self, step: impl StreamFilter + 'static) -> Self {
        self.page_pipeline.push(step);
        self
    }

    /// Transform applied to the whole response
    pub fn with_output_filter(mut self, step: impl StreamFilter + 'static) -> Self {
        self.response_pipeline.push(step);
        self
    }

    /// Format used for every page in this render, overriding page formats
    pub fn with_format(mut self, format: Arc<dyn OutputFormat>) -> Self {
        self.format = Some(format);
        self
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }

    /// Layout chosen during initialization
    pub fn layout(&self) -> Option<&Arc<Page>> {
        self.layout.as_ref()
    }

    pub fn content_type(&self) -> String {
        self.format_for(&self.page).content_type().to_string()
    }

    fn format_for(&self, page: &Page) -> Arc<dyn OutputFormat> {
        self.format
            .clone()
            .or_else(|| page.format().cloned())
            .unwrap_or_else(|| self.context.format().clone())
    }

    fn lookup_page(&self, name: &str, from: &Page) -> Result<Arc<Page>, RenderError> {
        self.context
            .pages()
            .resolve(name)
            .ok_or_else(|| RenderError::PageNotFound {
                name: name.to_string(),
                file: from.path().to_string(),
            })
    }

    // -------------------------------------------------------------------------
    // Initialization
    // -------------------------------------------------------------------------

    /// Prepare the page and its layout. Idempotent once it has succeeded;
    /// a failed attempt leaves the result uninitialized.
    pub async fn init(&mut self) -> Result<(), RenderError> {
        if matches!(self.state, RenderState::Ready | RenderState::Rendered) {
            return Ok(());
        }
        self.state = RenderState::Initializing;
        match self.initialize().await {
            Ok(()) => {
                self.state = RenderState::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = RenderState::Uninitialized;
                Err(e)
            }
        }
    }

    async fn initialize(&mut self) -> Result<(), RenderError> {
        let page = self.page.clone();
        let known = match &self.layout_choice {
            LayoutChoice::Page(layout) => Some(layout.clone()),
            LayoutChoice::Named(name) => Some(self.lookup_page(name, &page)?),
            LayoutChoice::Default | LayoutChoice::Disabled => None,
        };

        let content = match &known {
            // independent of each other, so prepare both at once
            Some(layout) => tokio::try_join!(page.init(), layout.init())?.0,
            None => page.init().await?,
        };

        let layout = match (&self.layout_choice, known) {
            (_, Some(layout)) => Some(layout),
            (LayoutChoice::Default, None) => {
                let name = content
                    .layout
                    .as_deref()
                    .or(self.context.config().default_layout.as_deref());
                match name {
                    Some(name) => {
                        let layout = self.lookup_page(name, &page)?;
                        layout.init().await?;
                        Some(layout)
                    }
                    None => None,
                }
            }
            _ => None,
        };
        let layout = layout.filter(|layout| {
            let own = Arc::ptr_eq(layout, &page) || layout.path() == page.path();
            if own {
                debug!(page = %page.path(), "page resolves to its own layout, rendering without it");
            }
            !own
        });

        let mut page_args = content.args.clone();
        page_args.extend(self.args.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.page_args = Arc::new(page_args);
        self.layout_args = match &layout {
            Some(layout) => Some(Arc::new(layout.content()?.args.clone())),
            None => None,
        };

        debug!(
            page = %page.path(),
            layout = layout.as_ref().map(|l| l.path()).unwrap_or("-"),
            args = self.page_args.len(),
            "page result initialized"
        );
        self.layout = layout;
        Ok(())
    }

    /// Base scope for the content page and its layout
    pub fn scope(&self) -> Result<ScopeChain, RenderError> {
        if matches!(
            self.state,
            RenderState::Uninitialized | RenderState::Initializing
        ) {
            return Err(RenderError::NotInitialized {
                path: self.page.path().to_string(),
            });
        }
        Ok(ScopeChain::new(
            self.page_args.clone(),
            self.layout_args.clone(),
            self.context.args().clone(),
        ))
    }

    /// Resolve a binding against this result's scope, outside any fragment
    pub fn evaluate_binding(&self, path: &str) -> Result<Resolved, RenderError> {
        let scope = self.scope()?;
        let format = self.format_for(&self.page);
        Evaluator::new(&self.context, &self.page_filters, &self.page, format.as_ref())
            .evaluate_binding(path, &scope)
    }

    // -------------------------------------------------------------------------
    // Rendering
    // -------------------------------------------------------------------------

    /// Initialize if needed and write the whole response to `sink`
    pub async fn render_to(
        &mut self,
        sink: Sink<'_>,
        cancel: &CancelSignal,
    ) -> Result<(), RenderError> {
        cancel.check()?;
        self.init().await?;
        let scope = self.scope()?;

        if self.response_pipeline.is_empty() {
            self.write_body(scope, &mut *sink, cancel).await?;
        } else {
            let mut buffered = Vec::new();
            self.write_body(scope, &mut buffered, cancel).await?;
            cancel.check()?;
            self.response_pipeline.apply(buffered, &mut *sink).await?;
        }
        sink.flush().await?;

        self.state = RenderState::Rendered;
        Ok(())
    }

    /// Render into a string, memoized after the first success
    pub async fn render_to_string(&mut self) -> Result<String, RenderError> {
        if let Some(rendered) = &self.rendered {
            return Ok(rendered.clone());
        }
        let mut buffer = Vec::new();
        self.render_to(&mut buffer, &CancelSignal::new()).await?;
        let rendered = String::from_utf8_lossy(&buffer).into_owned();
        self.rendered = Some(rendered.clone());
        Ok(rendered)
    }

    /// Blocking wrapper over [`render_to_string`](Self::render_to_string)
    pub fn render_to_string_blocking(&mut self) -> Result<String, RenderError> {
        futures::executor::block_on(self.render_to_string())
    }

    async fn write_body(
        &self,
        scope: ScopeChain,
        sink: Sink<'_>,
        cancel: &CancelSignal,
    ) -> Result<(), RenderError> {
        match &self.layout {
            Some(layout) => self.write_page(layout, scope, sink, cancel, 0).await,
            None => self.write_page(&self.page, scope, sink, cancel, 0).await,
        }
    }

    /// Write one page, through the page-level pipeline when it has steps
    fn write_page<'a>(
        &'a self,
        page: &'a Page,
        scope: ScopeChain,
        sink: Sink<'a>,
        cancel: &'a CancelSignal,
        depth: usize,
    ) -> BoxFuture<'a, Result<(), RenderError>> {
        Box::pin(async move {
            if self.page_pipeline.is_empty() {
                return self.write_fragments(page, &scope, sink, cancel, depth).await;
            }
            let mut buffered = Vec::new();
            self.write_fragments(page, &scope, &mut buffered, cancel, depth)
                .await?;
            cancel.check()?;
            self.page_pipeline.apply(buffered, sink).await?;
            Ok(())
        })
    }

    fn write_fragments<'a>(
        &'a self,
        page: &'a Page,
        scope: &'a ScopeChain,
        sink: Sink<'a>,
        cancel: &'a CancelSignal,
        depth: usize,
    ) -> BoxFuture<'a, Result<(), RenderError>> {
        Box::pin(async move {
            let fragments = page.fragments()?;
            let format = self.format_for(page);
            let evaluator =
                Evaluator::new(&self.context, &self.page_filters, page, format.as_ref());

            for fragment in fragments {
                cancel.check()?;
                let fragment = match fragment {
                    Fragment::Text { text } => {
                        sink.write_all(text.as_bytes()).await?;
                        continue;
                    }
                    Fragment::Variable(fragment) => fragment,
                };

                if self.embeds_content_page(fragment, page) {
                    self.check_depth(depth, page)?;
                    debug!(layout = %page.path(), page = %self.page.path(), "embedding page");
                    self.write_page(&self.page, scope.clone(), &mut *sink, cancel, depth + 1)
                        .await?;
                    continue;
                }

                if self.is_partial_call(fragment) {
                    self.write_partial(fragment, page, scope, evaluator, &mut *sink, cancel, depth)
                        .await?;
                    continue;
                }

                match evaluator.evaluate_fragment(fragment, scope)? {
                    Outcome::Value(value) => {
                        sink.write_all(format.encode(&value).as_bytes()).await?
                    }
                    Outcome::Empty => {}
                    Outcome::Unresolved => {
                        sink.write_all(fragment.original_text.as_bytes()).await?
                    }
                }
            }
            Ok(())
        })
    }

    /// Nested pages (partials and the embedded content page) share one bound
    fn check_depth(&self, depth: usize, page: &Page) -> Result<(), RenderError> {
        let max_depth = self.context.config().max_partial_depth;
        if depth >= max_depth {
            return Err(RenderError::PartialDepthExceeded {
                depth: max_depth,
                file: page.path().to_string(),
            });
        }
        Ok(())
    }

    /// `{{ page }}` inside the active layout
    fn embeds_content_page(&self, fragment: &VariableFragment, page: &Page) -> bool {
        let Some(layout) = &self.layout else {
            return false;
        };
        fragment.filters.is_empty()
            && std::ptr::eq(page, layout.as_ref())
            && fragment.binding_name() == Some(self.context.config().layout_page_name.as_str())
    }

    fn is_partial_call(&self, fragment: &VariableFragment) -> bool {
        fragment
            .filters
            .first()
            .is_some_and(|f| f.name == self.context.config().partial_filter_name)
    }

    /// `{{ 'name' | partial({ ... }) }}`
    #[allow(clippy::too_many_arguments)]
    async fn write_partial(
        &self,
        fragment: &VariableFragment,
        page: &Page,
        scope: &ScopeChain,
        evaluator: Evaluator<'_>,
        sink: Sink<'_>,
        cancel: &CancelSignal,
        depth: usize,
    ) -> Result<(), RenderError> {
        let file = page.path().to_string();
        let name = match evaluator.evaluate_expression(&fragment.root, scope)? {
            Resolved::Value(Value::Str(name)) => name,
            other => {
                return Err(RenderError::InvalidPartialTarget {
                    found: describe(&other),
                    file,
                })
            }
        };

        let declared_params = fragment.filters.first().and_then(|f| f.args.first());
        let params = match declared_params {
            Some(expr) => match evaluator.evaluate_expression(expr, scope)? {
                Resolved::Value(Value::Map(pairs)) => pairs.into_iter().collect::<Args>(),
                Resolved::Absent | Resolved::Null => Args::new(),
                other => {
                    return Err(RenderError::InvalidPartialArgs {
                        found: describe(&other),
                        file,
                    })
                }
            },
            None => Args::new(),
        };

        self.check_depth(depth, page)?;

        let target = self.lookup_page(&name, page)?;
        target.init().await?;
        let nested = scope.nested(&target.content()?.args, params);

        debug!(partial = %name, from = %file, depth = depth + 1, "rendering partial");
        self.write_page(&target, nested, sink, cancel, depth + 1).await
    }
}

fn describe(resolved: &Resolved) -> String {
    match resolved {
        Resolved::Absent => "absent".to_string(),
        Resolved::Null => "null".to_string(),
        Resolved::Value(value) => value.type_key().to_string(),
    }
}

impl fmt::Debug for PageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageResult")
            .field("page", &self.page.path())
            .field("layout", &self.layout.as_ref().map(|l| l.path().to_string()))
            .field("state", &self.state)
            .field("page_pipeline", &self.page_pipeline)
            .field("response_pipeline", &self.response_pipeline)
            .finish_non_exhaustive()
    }
}
