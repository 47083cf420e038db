//! Page Render - evaluation and rendering core for pre-parsed template pages
//!
//! Pages arrive already parsed into fragments (see the `page-ast` crate).
//! This crate resolves each variable fragment against layered scopes, runs
//! its filter chain, and streams the result, wrapping pages in layouts and
//! splicing in partials along the way.
//!
//! ## Call chain
//! PageResult -> fragment walk -> Evaluator -> ScopeChain + FilterResolver
//! + BindingCache -> OutputFormat::encode -> OutputPipeline -> sink
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use page_ast::{Expression, FilterCall, Fragment, PageContent};
//! use page_render::{Page, PageResult, RenderContext};
//!
//! let page = Page::from_content(
//!     "hello.html",
//!     PageContent::new(vec![
//!         Fragment::text("Hello, "),
//!         Fragment::variable(Expression::binding("name"), vec![FilterCall::bare("upper")]),
//!         Fragment::text("!"),
//!     ]),
//! );
//! let mut result = PageResult::new(Arc::new(RenderContext::default()), Arc::new(page))
//!     .with_arg("name", "ada");
//! assert_eq!(result.render_to_string_blocking().unwrap(), "Hello, ADA!");
//! ```

// Core error handling
pub mod error;

// Name resolution
pub mod binding;
pub mod scope;

// Filter registry and default catalog
pub mod filters;

// Expression evaluation
pub mod evaluator;
pub mod format;

// Pages, render units and output
pub mod cancel;
pub mod config;
pub mod context;
pub mod page;
pub mod pipeline;
pub mod result;

// Re-export commonly used types
pub use binding::{compile_accessor, split_root, Accessor, BindingCache};
pub use cancel::CancelSignal;
pub use config::{ConfigLoader, RenderConfig};
pub use context::RenderContext;
pub use error::{BindingError, FilterError, PageSourceError, RenderError};
pub use evaluator::{Evaluator, Outcome};
pub use filters::{
    default_filters, FilterEntry, FilterOrigin, FilterProvider, FilterResolver, FilterSet,
};
pub use format::{ExceptionContext, HookedFormat, HtmlFormat, OutputFormat, TextFormat};
pub use page::{Page, PageResolver, PageSource, PageStore, StaticSource};
pub use pipeline::{map_bytes, ByteStream, IdentityFilter, OutputPipeline, StreamFilter};
pub use result::{PageResult, RenderState, Sink};
pub use scope::{Args, LayerKind, ScopeChain};

pub use page_ast::{Bindable, Resolved, Value};
