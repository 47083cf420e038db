//! Expression evaluation.
//!
//! Resolves a variable fragment's root (literal, binding or nested call),
//! threads it through the filter chain and reports either a value or one of
//! the two "nothing to emit" outcomes. Absence never becomes an error here:
//! an unknown root or an unknown first filter degrades to empty output. An
//! unknown filter later in the chain is a hard error.

use std::sync::Arc;

use page_ast::{is_simple_name, Expression, FilterCall, Resolved, Value, VariableFragment};
use tracing::{debug, warn};

use crate::binding::{compile_accessor, split_root};
use crate::context::RenderContext;
use crate::error::RenderError;
use crate::filters::{FilterProvider, FilterResolver, ResolvedFilter};
use crate::format::{ExceptionContext, OutputFormat};
use crate::page::Page;
use crate::scope::ScopeChain;

/// Result of evaluating a variable fragment
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A value to encode
    Value(Value),
    /// Nothing to emit
    Empty,
    /// Unknown root and no filters; the fragment's source text is emitted
    Unresolved,
}

/// Evaluates expressions for one page against a scope chain
#[derive(Clone, Copy)]
pub struct Evaluator<'a> {
    context: &'a RenderContext,
    page_filters: &'a [Arc<dyn FilterProvider>],
    page: &'a Page,
    format: &'a dyn OutputFormat,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        context: &'a RenderContext,
        page_filters: &'a [Arc<dyn FilterProvider>],
        page: &'a Page,
        format: &'a dyn OutputFormat,
    ) -> Self {
        Self {
            context,
            page_filters,
            page,
            format,
        }
    }

    fn filters(&self) -> FilterResolver<'a> {
        FilterResolver::new(self.page_filters, self.context.filters())
    }

    fn file(&self) -> String {
        self.page.path().to_string()
    }

    pub fn evaluate_fragment(
        &self,
        fragment: &VariableFragment,
        scope: &ScopeChain,
    ) -> Result<Outcome, RenderError> {
        let mut current = self.evaluate_expression(&fragment.root, scope)?;

        if current.is_absent() {
            let Some(first) = fragment.filters.first() else {
                return Ok(Outcome::Unresolved);
            };
            let arity = 1 + first.args.len();
            if !self.filters().handles_unknown_value(&first.name, arity) {
                debug!(
                    fragment = %fragment.original_text,
                    filter = %first.name,
                    "unknown root binding, rendering empty"
                );
                return Ok(Outcome::Empty);
            }
        }

        for (position, step) in fragment.filters.iter().enumerate() {
            let arity = 1 + step.args.len();
            let Some(found) = self.filters().resolve(&step.name, arity) else {
                if position == 0 {
                    warn!(
                        filter = %step.name,
                        arity,
                        file = %self.page.path(),
                        "filter not found, rendering empty"
                    );
                    return Ok(Outcome::Empty);
                }
                return Err(RenderError::FilterNotFound {
                    filter: step.name.clone(),
                    arity,
                    file: self.file(),
                });
            };

            // absent and null both stop the chain unless the filter copes with them
            if current.is_missing() && !self.filters().handles_unknown_value(&step.name, arity) {
                return Ok(Outcome::Empty);
            }

            let mut args = Vec::with_capacity(arity);
            args.push(current);
            for arg in &step.args {
                args.push(self.evaluate_expression(arg, scope)?);
            }
            current = self.invoke(found, step, &args, scope)?;
        }

        Ok(match current {
            Resolved::Value(value) => Outcome::Value(value),
            Resolved::Null | Resolved::Absent => Outcome::Empty,
        })
    }

    /// Evaluate a root or argument expression.
    ///
    /// Deferred bindings embedded in container values are resolved against
    /// `scope` before the value is returned.
    pub fn evaluate_expression(
        &self,
        expression: &Expression,
        scope: &ScopeChain,
    ) -> Result<Resolved, RenderError> {
        let resolved = match expression {
            Expression::Literal(Value::Ref(name)) => self.evaluate_binding(name, scope)?,
            Expression::Literal(value) => Resolved::from(value.clone()),
            Expression::Binding(path) => {
                let resolved = self.evaluate_binding(path, scope)?;
                if resolved.is_absent() && is_simple_name(path) {
                    self.filter_as_binding(path, scope)?
                } else {
                    resolved
                }
            }
            Expression::Call(call) => self.evaluate_call(call, scope)?,
        };

        match resolved {
            Resolved::Value(value) if value.contains_refs() => {
                Ok(Resolved::from(self.resolve_embedded(value, scope)?))
            }
            other => Ok(other),
        }
    }

    /// Resolve a binding name or path without any filter chain
    pub fn evaluate_binding(&self, path: &str, scope: &ScopeChain) -> Result<Resolved, RenderError> {
        let (root, rest) = split_root(path.trim());
        let target = match scope.lookup(root) {
            Resolved::Value(value) if !rest.is_empty() => value,
            other => return Ok(other),
        };

        let accessor = if self.page.is_ephemeral() {
            compile_accessor(rest)
        } else {
            self.context.bindings().compile(&target, rest)
        };

        match accessor(&target) {
            Ok(value) => Ok(Resolved::from(value)),
            Err(source) => {
                let error = RenderError::Binding {
                    binding: path.to_string(),
                    file: self.file(),
                    source,
                };
                self.intercept(path, error, scope)
            }
        }
    }

    /// Nested call: every argument is declared, nothing is piped
    pub fn evaluate_call(&self, call: &FilterCall, scope: &ScopeChain) -> Result<Resolved, RenderError> {
        let arity = call.args.len();
        let found = self
            .filters()
            .resolve(&call.name, arity)
            .ok_or_else(|| RenderError::FilterNotFound {
                filter: call.name.clone(),
                arity,
                file: self.file(),
            })?;

        let args = call
            .args
            .iter()
            .map(|arg| self.evaluate_expression(arg, scope))
            .collect::<Result<Vec<_>, _>>()?;
        self.invoke(found, call, &args, scope)
    }

    /// A bare name nothing in scope answers to, called as a zero-argument filter
    fn filter_as_binding(&self, name: &str, scope: &ScopeChain) -> Result<Resolved, RenderError> {
        match self.filters().resolve(name, 0) {
            Some(found) => {
                debug!(filter = name, provider = found.provider, "binding resolved as filter");
                self.invoke(found, &FilterCall::bare(name), &[], scope)
            }
            None => Ok(Resolved::Absent),
        }
    }

    fn invoke(
        &self,
        found: ResolvedFilter<'_>,
        call: &FilterCall,
        args: &[Resolved],
        scope: &ScopeChain,
    ) -> Result<Resolved, RenderError> {
        match found.entry.invoke(args) {
            Ok(resolved) => Ok(resolved),
            Err(source) => {
                let expression = call.to_string();
                let error = RenderError::Filter {
                    filter: call.name.clone(),
                    expression: expression.clone(),
                    file: self.file(),
                    source,
                };
                self.intercept(&expression, error, scope)
            }
        }
    }

    /// Offer an invocation error to the output format before propagating it
    fn intercept(
        &self,
        expression: &str,
        error: RenderError,
        scope: &ScopeChain,
    ) -> Result<Resolved, RenderError> {
        let ctx = ExceptionContext {
            page_path: self.page.path(),
            expression,
            scope,
        };
        match self.format.on_expression_exception(&ctx, &error) {
            Some(fallback) => {
                warn!(
                    expression,
                    file = %self.page.path(),
                    error = %error,
                    "expression failed, using fallback value"
                );
                Ok(Resolved::from(fallback))
            }
            None => Err(error),
        }
    }

    /// Replace deferred bindings inside a container with their current values.
    ///
    /// A resolved binding is taken as-is; references it may contain are not
    /// followed.
    fn resolve_embedded(&self, value: Value, scope: &ScopeChain) -> Result<Value, RenderError> {
        Ok(match value {
            Value::Ref(name) => self.evaluate_binding(&name, scope)?.into_value_or_null(),
            Value::List(items) => Value::List(
                items
                    .into_iter()
                    .map(|item| self.resolve_embedded(item, scope))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(pairs) => Value::Map(
                pairs
                    .into_iter()
                    .map(|(k, v)| Ok((k, self.resolve_embedded(v, scope)?)))
                    .collect::<Result<_, RenderError>>()?,
            ),
            other => other,
        })
    }
}
