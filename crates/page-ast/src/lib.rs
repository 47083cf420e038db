//! page-ast: the fragment and expression tree consumed by the renderer
//!
//! This crate contains the parser-facing contract with NO runtime
//! dependencies:
//! - Fragment, VariableFragment, FilterCall and Expression trees
//! - PageContent (fragments + declared args + declared layout)
//! - Value, the runtime value model, and the Bindable host-object trait
//! - Resolved, the three-state `Absent | Null | Value` lookup result
//!
//! Everything here is serde (de)serializable so pre-parsed pages can be
//! stored as JSON or YAML.

pub mod ast;
pub mod value;

// Re-export commonly used types
pub use ast::{is_simple_name, Expression, FilterCall, Fragment, PageContent, VariableFragment};
pub use value::{Bindable, Resolved, Value, REF_KEY};
