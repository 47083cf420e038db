//! Shared builders for render integration tests

#![allow(dead_code)]

use std::sync::Arc;

use page_ast::{Expression, FilterCall, Fragment, PageContent, Value};
use page_render::{Page, PageStore, RenderContext};

pub fn text(s: &str) -> Fragment {
    Fragment::text(s)
}

/// `{{ name | filters... }}`
pub fn var(name: &str, filters: Vec<FilterCall>) -> Fragment {
    Fragment::variable(Expression::binding(name), filters)
}

pub fn filter(name: &str, args: Vec<Expression>) -> FilterCall {
    FilterCall::new(name, args)
}

/// `{{ 'target' | partial(params) }}`
pub fn partial(target: &str, params: Vec<(&str, Value)>) -> Fragment {
    let args = if params.is_empty() {
        vec![]
    } else {
        vec![Expression::Literal(map(params))]
    };
    Fragment::variable(Expression::literal(target), vec![FilterCall::new("partial", args)])
}

pub fn map(pairs: Vec<(&str, Value)>) -> Value {
    Value::Map(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

pub fn page(path: &str, fragments: Vec<Fragment>) -> Arc<Page> {
    Arc::new(Page::from_content(path, PageContent::new(fragments)))
}

/// Context whose page store holds `pages`
pub fn context_with_pages(pages: Vec<(&str, PageContent)>) -> Arc<RenderContext> {
    let store = Arc::new(PageStore::new());
    for (name, content) in pages {
        store.insert(Page::from_content(name, content));
    }
    Arc::new(RenderContext::default().with_pages(store))
}
