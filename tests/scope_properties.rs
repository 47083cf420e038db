//! Property tests for scope lookup order and filter resolution order

mod helpers;

use std::collections::HashMap;
use std::sync::Arc;

use helpers::*;
use page_ast::{FilterCall, PageContent};
use page_render::{
    Args, FilterOrigin, FilterProvider, FilterResolver, FilterSet, PageResult, RenderContext,
    Resolved, ScopeChain, Value,
};
use proptest::prelude::*;

fn layer(pairs: &[(String, i64)]) -> Arc<Args> {
    Arc::new(
        pairs
            .iter()
            .map(|(k, v)| (k.clone(), Value::Int(*v)))
            .collect(),
    )
}

fn name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,6}"
}

fn constant(tag: String) -> FilterSet {
    FilterSet::new(tag.clone()).register("pick", 1, move |_| {
        Ok(Resolved::Value(Value::from(tag.as_str())))
    })
}

proptest! {
    #[test]
    fn scoped_params_shadow_every_other_layer(
        name in name_strategy(),
        scoped in any::<i64>(),
        page in any::<i64>(),
        layout in proptest::option::of(any::<i64>()),
        global in any::<i64>(),
    ) {
        let chain = ScopeChain::new(
            layer(&[(name.clone(), page)]),
            layout.map(|v| layer(&[(name.clone(), v)])),
            layer(&[(name.clone(), global)]),
        );
        prop_assert_eq!(chain.lookup(&name), Resolved::Value(Value::Int(page)));

        let nested = chain.with_scoped([(name.clone(), Value::Int(scoped))].into_iter().collect());
        prop_assert_eq!(nested.lookup(&name), Resolved::Value(Value::Int(scoped)));
    }

    #[test]
    fn lookup_follows_fixed_layer_order(
        page in proptest::collection::hash_map(name_strategy(), any::<i64>(), 0..6),
        layout in proptest::collection::hash_map(name_strategy(), any::<i64>(), 0..6),
        global in proptest::collection::hash_map(name_strategy(), any::<i64>(), 0..6),
        probe in name_strategy(),
    ) {
        let to_layer = |m: &HashMap<String, i64>| {
            layer(&m.iter().map(|(k, v)| (k.clone(), *v)).collect::<Vec<_>>())
        };
        let chain = ScopeChain::new(to_layer(&page), Some(to_layer(&layout)), to_layer(&global));

        let expected = page
            .get(&probe)
            .or_else(|| layout.get(&probe))
            .or_else(|| global.get(&probe))
            .map(|v| Resolved::Value(Value::Int(*v)))
            .unwrap_or(Resolved::Absent);
        prop_assert_eq!(chain.lookup(&probe), expected);
    }

    #[test]
    fn page_provider_wins_over_any_global_provider(
        page_count in 1usize..4,
        global_count in 1usize..4,
    ) {
        let page: Vec<Arc<dyn FilterProvider>> = (0..page_count)
            .map(|i| Arc::new(constant(format!("page{}", i))) as Arc<dyn FilterProvider>)
            .collect();
        let global: Vec<Arc<dyn FilterProvider>> = (0..global_count)
            .map(|i| Arc::new(constant(format!("global{}", i))) as Arc<dyn FilterProvider>)
            .collect();

        let found = FilterResolver::new(&page, &global).resolve("pick", 1).unwrap();
        prop_assert_eq!(found.origin, FilterOrigin::Page);
        prop_assert_eq!(found.provider, "page0");

        let found = FilterResolver::new(&[], &global).resolve("pick", 1).unwrap();
        prop_assert_eq!(found.origin, FilterOrigin::Global);
        prop_assert_eq!(found.provider, "global0");
    }

    #[test]
    fn partial_params_override_only_overlapping_keys(
        parent in proptest::collection::hash_map(name_strategy(), any::<i64>(), 1..5),
        child in proptest::collection::hash_map(name_strategy(), any::<i64>(), 0..5),
    ) {
        let base = ScopeChain::new(layer(&[]), None, layer(&[]));
        let parent_scope = base.with_scoped(
            parent.iter().map(|(k, v)| (k.clone(), Value::Int(*v))).collect(),
        );
        let nested = parent_scope.nested(
            &Args::new(),
            child.iter().map(|(k, v)| (k.clone(), Value::Int(*v))).collect(),
        );

        for (key, value) in &parent {
            let expected = child.get(key).unwrap_or(value);
            prop_assert_eq!(nested.lookup(key), Resolved::Value(Value::Int(*expected)));
        }
        for (key, value) in &child {
            prop_assert_eq!(nested.lookup(key), Resolved::Value(Value::Int(*value)));
        }
    }
}

#[tokio::test]
async fn test_scoped_partial_param_shadows_page_and_global() {
    let context = {
        let store = Arc::new(page_render::PageStore::new());
        store.insert(page_render::Page::from_content(
            "show",
            PageContent::new(vec![var("who", vec![FilterCall::bare("upper")])]),
        ));
        Arc::new(
            RenderContext::default()
                .with_pages(store)
                .with_arg("who", "global"),
        )
    };
    let top = page(
        "index.html",
        vec![
            var("who", vec![]),
            text("/"),
            partial("show", vec![("who", Value::from("scoped"))]),
        ],
    );
    let mut result = PageResult::new(context, top).with_arg("who", "page");
    assert_eq!(result.render_to_string().await.unwrap(), "page/SCOPED");
}
