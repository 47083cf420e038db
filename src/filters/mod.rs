//! Filter catalogs and arity-keyed dispatch.

pub mod defaults;
pub mod registry;

pub use defaults::{default_filters, DEFAULT_FILTERS};
pub use registry::{
    FilterEntry, FilterFn, FilterOrigin, FilterProvider, FilterResolver, FilterSet, ResolvedFilter,
};
