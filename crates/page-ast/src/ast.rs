//! Fragment and expression tree for a parsed page.
//!
//! A page is an ordered list of fragments: literal text emitted verbatim, or
//! variable fragments holding a root expression and a filter chain. The tree
//! is produced once by the parser and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::value::Value;

/// One unit of a parsed page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fragment {
    /// Literal text, emitted verbatim
    Text { text: String },
    /// `{{ root | filter(args) | ... }}`
    Variable(VariableFragment),
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Fragment::Text { text: text.into() }
    }

    pub fn variable(root: Expression, filters: Vec<FilterCall>) -> Self {
        Fragment::Variable(VariableFragment::new(root, filters))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableFragment {
    pub root: Expression,
    #[serde(default)]
    pub filters: Vec<FilterCall>,
    /// Source text of the whole fragment, written back when the root is
    /// unknown and there is nothing to apply to it
    pub original_text: String,
}

impl VariableFragment {
    /// Build a fragment, synthesizing its original text from the tree
    pub fn new(root: Expression, filters: Vec<FilterCall>) -> Self {
        let mut source = root.to_string();
        for filter in &filters {
            source.push_str(" | ");
            source.push_str(&filter.to_string());
        }
        Self {
            root,
            filters,
            original_text: format!("{{{{ {} }}}}", source),
        }
    }

    /// Override the original text with what the parser actually saw
    pub fn with_original_text(mut self, text: impl Into<String>) -> Self {
        self.original_text = text.into();
        self
    }

    /// Simple binding name of the root, if the root is a plain name
    pub fn binding_name(&self) -> Option<&str> {
        match &self.root {
            Expression::Binding(path) if is_simple_name(path) => Some(path),
            _ => None,
        }
    }
}

/// `name(arg, ...)` - one step of a filter chain, or a nested call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCall {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Expression>,
}

impl FilterCall {
    pub fn new(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Filter without declared arguments
    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }
}

impl fmt::Display for FilterCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.args.is_empty() {
            write!(f, "(")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Literal(Value),
    /// Name or dotted/indexed path, e.g. `user.addresses[0].city`
    Binding(String),
    Call(FilterCall),
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn binding(path: impl Into<String>) -> Self {
        Expression::Binding(path.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Call(FilterCall::new(name, args))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(value) => write!(f, "{}", value),
            Expression::Binding(path) => write!(f, "{}", path),
            Expression::Call(call) => {
                // calls always show their parentheses
                if call.args.is_empty() {
                    write!(f, "{}()", call.name)
                } else {
                    write!(f, "{}", call)
                }
            }
        }
    }
}

/// True for a bare identifier with no member or index access
pub fn is_simple_name(path: &str) -> bool {
    !path.is_empty() && !path.contains(['.', '['])
}

/// Everything the parser produces for one page source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub fragments: Vec<Fragment>,
    /// Arguments declared by the page itself
    #[serde(default)]
    pub args: HashMap<String, Value>,
    /// Layout page name declared by the page
    #[serde(default)]
    pub layout: Option<String>,
}

impl PageContent {
    pub fn new(fragments: Vec<Fragment>) -> Self {
        Self {
            fragments,
            ..Default::default()
        }
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = Some(layout.into());
        self
    }
}
