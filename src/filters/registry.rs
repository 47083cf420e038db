//! Filter registry and resolver.
//!
//! Filters are registered once per provider into a table keyed by
//! `(name, arity)`, where arity counts the piped value as argument 0. The
//! resolver searches page-local providers first, then global providers,
//! each in registration order; the first match wins. A filter registered
//! in an earlier provider therefore shadows the same name and arity in
//! every later one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use page_ast::Resolved;

use crate::error::FilterError;

/// Uniform filter signature - receives every argument, piped value first
pub type FilterFn = Arc<dyn Fn(&[Resolved]) -> Result<Resolved, FilterError> + Send + Sync>;

/// Filter entry with its dispatch key
#[derive(Clone)]
pub struct FilterEntry {
    pub name: String,
    pub arity: usize,
    /// May be invoked with an absent piped value
    pub handles_unknown_value: bool,
    func: FilterFn,
}

impl FilterEntry {
    pub fn new(name: impl Into<String>, arity: usize, func: FilterFn) -> Self {
        Self {
            name: name.into(),
            arity,
            handles_unknown_value: false,
            func,
        }
    }

    pub fn handling_unknown_value(mut self) -> Self {
        self.handles_unknown_value = true;
        self
    }

    pub fn invoke(&self, args: &[Resolved]) -> Result<Resolved, FilterError> {
        (self.func)(args)
    }
}

impl fmt::Debug for FilterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterEntry")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("handles_unknown_value", &self.handles_unknown_value)
            .finish_non_exhaustive()
    }
}

/// A named catalog of filters
pub trait FilterProvider: Send + Sync {
    fn name(&self) -> &str;

    fn lookup(&self, name: &str, arity: usize) -> Option<&FilterEntry>;

    fn handles_unknown_value(&self, name: &str, arity: usize) -> bool {
        self.lookup(name, arity)
            .is_some_and(|entry| entry.handles_unknown_value)
    }
}

/// Arity-keyed filter table built at registration time
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    name: String,
    by_key: HashMap<(String, usize), FilterEntry>,
}

impl FilterSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            by_key: HashMap::new(),
        }
    }

    /// Register `func` under `name` taking `arity` arguments (piped value included)
    pub fn register<F>(mut self, name: &str, arity: usize, func: F) -> Self
    where
        F: Fn(&[Resolved]) -> Result<Resolved, FilterError> + Send + Sync + 'static,
    {
        self.insert(FilterEntry::new(name, arity, Arc::new(func)));
        self
    }

    /// Register a filter that accepts an absent piped value
    pub fn register_unknown_aware<F>(mut self, name: &str, arity: usize, func: F) -> Self
    where
        F: Fn(&[Resolved]) -> Result<Resolved, FilterError> + Send + Sync + 'static,
    {
        self.insert(FilterEntry::new(name, arity, Arc::new(func)).handling_unknown_value());
        self
    }

    /// Insert an entry, replacing any previous entry with the same key
    pub fn insert(&mut self, entry: FilterEntry) {
        self.by_key
            .insert((entry.name.clone(), entry.arity), entry);
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Sorted `name/arity` signatures
    pub fn signatures(&self) -> Vec<String> {
        let mut sigs: Vec<_> = self
            .by_key
            .keys()
            .map(|(name, arity)| format!("{}/{}", name, arity))
            .collect();
        sigs.sort();
        sigs
    }
}

impl FilterProvider for FilterSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, name: &str, arity: usize) -> Option<&FilterEntry> {
        self.by_key.get(&(name.to_string(), arity))
    }
}

// =============================================================================
// RESOLUTION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOrigin {
    Page,
    Global,
}

/// A matched filter and where it came from
#[derive(Debug, Clone, Copy)]
pub struct ResolvedFilter<'a> {
    pub entry: &'a FilterEntry,
    pub origin: FilterOrigin,
    pub provider: &'a str,
}

/// Searches page-local then global providers
#[derive(Clone, Copy)]
pub struct FilterResolver<'a> {
    page: &'a [Arc<dyn FilterProvider>],
    global: &'a [Arc<dyn FilterProvider>],
}

impl<'a> FilterResolver<'a> {
    pub fn new(page: &'a [Arc<dyn FilterProvider>], global: &'a [Arc<dyn FilterProvider>]) -> Self {
        Self { page, global }
    }

    fn providers(&self) -> impl Iterator<Item = (FilterOrigin, &'a Arc<dyn FilterProvider>)> {
        self.page
            .iter()
            .map(|p| (FilterOrigin::Page, p))
            .chain(self.global.iter().map(|p| (FilterOrigin::Global, p)))
    }

    pub fn resolve(&self, name: &str, arity: usize) -> Option<ResolvedFilter<'a>> {
        self.providers().find_map(|(origin, provider)| {
            provider.lookup(name, arity).map(|entry| ResolvedFilter {
                entry,
                origin,
                provider: provider.name(),
            })
        })
    }

    /// True when any provider accepts an unknown piped value for this key
    pub fn handles_unknown_value(&self, name: &str, arity: usize) -> bool {
        self.providers()
            .any(|(_, provider)| provider.handles_unknown_value(name, arity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use page_ast::Value;

    fn constant(
        value: &'static str,
    ) -> impl Fn(&[Resolved]) -> Result<Resolved, FilterError> + Send + Sync + 'static {
        move |_| Ok(Resolved::Value(Value::from(value)))
    }

    #[test]
    fn test_lookup_matches_name_and_arity() {
        let set = FilterSet::new("test")
            .register("pad", 1, constant("one"))
            .register("pad", 2, constant("two"));

        let one = set.lookup("pad", 1).unwrap().invoke(&[]).unwrap();
        let two = set.lookup("pad", 2).unwrap().invoke(&[]).unwrap();
        assert_eq!(one, Resolved::Value(Value::from("one")));
        assert_eq!(two, Resolved::Value(Value::from("two")));
        assert!(set.lookup("pad", 3).is_none());
        assert_eq!(set.signatures(), vec!["pad/1", "pad/2"]);
    }

    #[test]
    fn test_page_providers_shadow_global() {
        let page: Vec<Arc<dyn FilterProvider>> =
            vec![Arc::new(FilterSet::new("page").register("greet", 1, constant("page")))];
        let global: Vec<Arc<dyn FilterProvider>> = vec![
            Arc::new(FilterSet::new("first").register("greet", 1, constant("first"))),
            Arc::new(FilterSet::new("second").register("greet", 1, constant("second"))),
        ];

        let resolver = FilterResolver::new(&page, &global);
        let found = resolver.resolve("greet", 1).unwrap();
        assert_eq!(found.origin, FilterOrigin::Page);
        assert_eq!(found.provider, "page");

        let resolver = FilterResolver::new(&[], &global);
        let found = resolver.resolve("greet", 1).unwrap();
        assert_eq!(found.origin, FilterOrigin::Global);
        assert_eq!(found.provider, "first");
    }

    #[test]
    fn test_handles_unknown_value() {
        let global: Vec<Arc<dyn FilterProvider>> = vec![Arc::new(
            FilterSet::new("g")
                .register("upper", 1, constant("x"))
                .register_unknown_aware("otherwise", 2, constant("y")),
        )];
        let resolver = FilterResolver::new(&[], &global);
        assert!(resolver.handles_unknown_value("otherwise", 2));
        assert!(!resolver.handles_unknown_value("otherwise", 1));
        assert!(!resolver.handles_unknown_value("upper", 1));
    }
}
