//! Output formats: value encoding and the expression-exception hook.

use std::sync::Arc;

use page_ast::Value;

use crate::error::RenderError;
use crate::scope::ScopeChain;

/// What the exception hook sees about a failing expression
#[derive(Debug, Clone, Copy)]
pub struct ExceptionContext<'a> {
    /// Virtual path of the page being evaluated
    pub page_path: &'a str,
    /// Source text of the failing filter step or binding
    pub expression: &'a str,
    pub scope: &'a ScopeChain,
}

pub trait OutputFormat: Send + Sync {
    fn name(&self) -> &str;

    fn content_type(&self) -> &str;

    /// Textual serialization of a resolved value
    fn encode(&self, value: &Value) -> String;

    /// Offered every filter or binding invocation error before it aborts the
    /// render. Returning a value substitutes it for the failed result.
    fn on_expression_exception(
        &self,
        _ctx: &ExceptionContext<'_>,
        _error: &RenderError,
    ) -> Option<Value> {
        None
    }
}

/// HTML output - strings are entity-encoded unless marked raw
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlFormat;

impl OutputFormat for HtmlFormat {
    fn name(&self) -> &str {
        "html"
    }

    fn content_type(&self) -> &str {
        "text/html"
    }

    fn encode(&self, value: &Value) -> String {
        match value {
            Value::Raw(s) => s.clone(),
            other => html_escape::encode_quoted_attribute(&other.to_text()).into_owned(),
        }
    }
}

/// Plain text output - values are written as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormat;

impl OutputFormat for TextFormat {
    fn name(&self) -> &str {
        "text"
    }

    fn content_type(&self) -> &str {
        "text/plain"
    }

    fn encode(&self, value: &Value) -> String {
        value.to_text()
    }
}

pub type ExceptionHook =
    Arc<dyn Fn(&ExceptionContext<'_>, &RenderError) -> Option<Value> + Send + Sync>;

/// Wraps another format with a caller-supplied exception hook
pub struct HookedFormat {
    inner: Arc<dyn OutputFormat>,
    hook: ExceptionHook,
}

impl HookedFormat {
    pub fn new<F>(inner: Arc<dyn OutputFormat>, hook: F) -> Self
    where
        F: Fn(&ExceptionContext<'_>, &RenderError) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            inner,
            hook: Arc::new(hook),
        }
    }
}

impl OutputFormat for HookedFormat {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn content_type(&self) -> &str {
        self.inner.content_type()
    }

    fn encode(&self, value: &Value) -> String {
        self.inner.encode(value)
    }

    fn on_expression_exception(
        &self,
        ctx: &ExceptionContext<'_>,
        error: &RenderError,
    ) -> Option<Value> {
        (self.hook)(ctx, error)
    }
}

/// Look up a built-in format by its configured name
pub fn format_by_name(name: &str) -> Option<Arc<dyn OutputFormat>> {
    match name {
        "html" => Some(Arc::new(HtmlFormat)),
        "text" => Some(Arc::new(TextFormat)),
        _ => None,
    }
}
