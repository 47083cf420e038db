//! Layouts, partials, output pipelines, memoization and cancellation

mod helpers;

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use helpers::*;
use page_ast::{Expression, FilterCall, PageContent};
use page_render::{
    map_bytes, CancelSignal, FilterSet, IdentityFilter, Page, PageResult, RenderConfig,
    RenderContext, RenderError, RenderState, Value,
};
use pretty_assertions::assert_eq;

fn wrap(tag: &'static str) -> impl Fn(Vec<u8>) -> io::Result<Vec<u8>> + Send + Sync + 'static {
    move |bytes| {
        let mut out = format!("<{}>", tag).into_bytes();
        out.extend(bytes);
        out.extend(format!("</{}>", tag).into_bytes());
        Ok(out)
    }
}

fn layout_context() -> Arc<RenderContext> {
    context_with_pages(vec![
        (
            "main",
            PageContent::new(vec![
                text("<main title=\""),
                var("title", vec![]),
                text("\">"),
                var("page", vec![]),
                text("</main>"),
            ])
            .with_arg("title", "Layout"),
        ),
        (
            "alt",
            PageContent::new(vec![text("<alt>"), var("page", vec![]), text("</alt>")]),
        ),
    ])
}

// =============================================================================
// LAYOUTS
// =============================================================================

#[tokio::test]
async fn test_layout_embeds_page() {
    let content = page(
        "index.html",
        vec![text("<p>"), var("title", vec![]), text("</p>")],
    );
    let mut result = PageResult::new(layout_context(), content).with_layout("main");
    assert_eq!(
        result.render_to_string().await.unwrap(),
        "<main title=\"Layout\"><p>Layout</p></main>"
    );

    // page arguments shadow layout arguments for both
    let content = Arc::new(Page::from_content(
        "index.html",
        PageContent::new(vec![var("title", vec![])]).with_arg("title", "Home"),
    ));
    let mut result = PageResult::new(layout_context(), content).with_layout("main");
    assert_eq!(
        result.render_to_string().await.unwrap(),
        "<main title=\"Home\">Home</main>"
    );
}

#[tokio::test]
async fn test_layout_precedence() {
    let mut config = RenderConfig::default();
    config.default_layout = Some("alt".into());
    let store = Arc::new(page_render::PageStore::new());
    store.insert(Page::from_content(
        "alt",
        PageContent::new(vec![text("<alt>"), var("page", vec![]), text("</alt>")]),
    ));
    store.insert(Page::from_content(
        "main",
        PageContent::new(vec![text("<main>"), var("page", vec![]), text("</main>")]),
    ));
    let context = Arc::new(RenderContext::new(config).with_pages(store));

    let plain = page("plain.html", vec![text("x")]);
    let declared = Arc::new(Page::from_content(
        "declared.html",
        PageContent::new(vec![text("y")]).with_layout("main"),
    ));

    let mut result = PageResult::new(context.clone(), plain.clone());
    assert_eq!(result.render_to_string().await.unwrap(), "<alt>x</alt>");

    let mut result = PageResult::new(context.clone(), declared.clone());
    assert_eq!(result.render_to_string().await.unwrap(), "<main>y</main>");

    let mut result = PageResult::new(context.clone(), declared).with_layout("alt");
    assert_eq!(result.render_to_string().await.unwrap(), "<alt>y</alt>");

    let mut result = PageResult::new(context, plain).no_layout();
    assert_eq!(result.render_to_string().await.unwrap(), "x");
}

#[tokio::test]
async fn test_page_binding_outside_layout_is_ordinary() {
    let mut result = PageResult::new(
        Arc::new(RenderContext::default()),
        page("index.html", vec![var("page", vec![])]),
    );
    assert_eq!(result.render_to_string().await.unwrap(), "{{ page }}");
}

// =============================================================================
// PARTIALS
// =============================================================================

#[tokio::test]
async fn test_partial_params_override_parent_scope() {
    let context = context_with_pages(vec![
        ("outer", PageContent::new(vec![partial("inner", vec![("a", Value::Int(1))])])),
        (
            "inner",
            PageContent::new(vec![var("a", vec![]), text(","), var("b", vec![])]),
        ),
    ]);
    let top = page(
        "index.html",
        vec![partial("outer", vec![("a", Value::Int(0)), ("b", Value::Int(2))])],
    );
    let mut result = PageResult::new(context, top);
    assert_eq!(result.render_to_string().await.unwrap(), "1,2");
}

#[tokio::test]
async fn test_partial_declared_args_and_embedded_refs() {
    let context = context_with_pages(vec![(
        "card",
        PageContent::new(vec![
            text("["),
            var("size", vec![]),
            text(":"),
            var("label", vec![FilterCall::bare("upper")]),
            text("]"),
        ])
        .with_arg("size", "sm")
        .with_arg("label", "default"),
    )]);
    let top = page(
        "index.html",
        vec![
            partial("card", vec![]),
            partial("card", vec![("label", Value::Ref("name".into()))]),
        ],
    );
    let mut result = PageResult::new(context, top).with_arg("name", "ada");
    assert_eq!(
        result.render_to_string().await.unwrap(),
        "[sm:DEFAULT][sm:ADA]"
    );
}

#[tokio::test]
async fn test_partial_errors() {
    let context = context_with_pages(vec![("card", PageContent::new(vec![text("card")]))]);

    let mut missing = PageResult::new(context.clone(), page("index.html", vec![partial("nope", vec![])]));
    match missing.render_to_string().await {
        Err(RenderError::PageNotFound { name, file }) => {
            assert_eq!(name, "nope");
            assert_eq!(file, "index.html");
        }
        other => panic!("expected PageNotFound, got {:?}", other),
    }

    let bad_args = page(
        "index.html",
        vec![page_ast::Fragment::variable(
            Expression::literal("card"),
            vec![FilterCall::new("partial", vec![Expression::literal(5)])],
        )],
    );
    let mut result = PageResult::new(context, bad_args);
    assert!(matches!(
        result.render_to_string().await,
        Err(RenderError::InvalidPartialArgs { .. })
    ));
}

// =============================================================================
// OUTPUT PIPELINES
// =============================================================================

#[tokio::test]
async fn test_identity_pipeline_is_byte_identical() {
    let fragments = vec![
        text("Grüße, "),
        var("name", vec![FilterCall::bare("upper")]),
        text(" <3"),
    ];
    let mut plain = PageResult::new(layout_context(), page("p.html", fragments.clone()))
        .with_layout("alt")
        .with_arg("name", "ada");
    let mut piped = PageResult::new(layout_context(), page("p.html", fragments))
        .with_layout("alt")
        .with_arg("name", "ada")
        .with_page_filter(IdentityFilter)
        .with_output_filter(IdentityFilter);

    let a = plain.render_to_string().await.unwrap();
    let b = piped.render_to_string().await.unwrap();
    assert_eq!(a, "<alt>Grüße, ADA <3</alt>");
    assert_eq!(a.as_bytes(), b.as_bytes());
}

#[tokio::test]
async fn test_page_and_response_pipeline_ordering() {
    let context = context_with_pages(vec![
        (
            "main",
            PageContent::new(vec![text("["), var("page", vec![]), partial("aside", vec![]), text("]")]),
        ),
        ("aside", PageContent::new(vec![text("aside")])),
    ]);
    let mut result = PageResult::new(context, page("body.html", vec![text("body")]))
        .with_layout("main")
        .with_page_filter(map_bytes(wrap("p")))
        .with_output_filter(map_bytes(wrap("r1")))
        .with_output_filter(map_bytes(wrap("r2")));

    assert_eq!(
        result.render_to_string().await.unwrap(),
        "<r2><r1><p>[<p>body</p><p>aside</p>]</p></r1></r2>"
    );
}

// =============================================================================
// RENDER ENTRY POINT
// =============================================================================

#[tokio::test]
async fn test_render_to_string_is_memoized() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let counting = FilterSet::new("counting").register("tick", 1, move |args| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(args[0].clone())
    });

    let mut result = PageResult::new(
        Arc::new(RenderContext::default()),
        page("count.html", vec![var("name", vec![FilterCall::bare("tick")])]),
    )
    .with_arg("name", "ada")
    .with_filters(counting);

    let first = result.render_to_string().await.unwrap();
    let second = result.render_to_string().await.unwrap();
    assert_eq!(first, "ada");
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.state(), RenderState::Rendered);
}

#[test]
fn test_blocking_render() {
    let mut result = PageResult::new(
        Arc::new(RenderContext::default()),
        page("hello.html", vec![text("Hello, "), var("name", vec![]), text("!")]),
    )
    .with_arg("name", "world");
    assert_eq!(result.render_to_string_blocking().unwrap(), "Hello, world!");
    assert_eq!(result.render_to_string_blocking().unwrap(), "Hello, world!");
}

#[tokio::test]
async fn test_cancelled_before_start_writes_nothing() {
    let cancel = CancelSignal::new();
    cancel.cancel();
    let mut result = PageResult::new(
        Arc::new(RenderContext::default()),
        page("a.html", vec![text("never")]),
    );
    let mut sink = Vec::new();
    assert!(matches!(
        result.render_to(&mut sink, &cancel).await,
        Err(RenderError::Cancelled)
    ));
    assert!(sink.is_empty());
    assert_eq!(result.state(), RenderState::Uninitialized);
}

#[tokio::test]
async fn test_cancel_between_fragments() {
    let cancel = CancelSignal::new();
    let trip = cancel.clone();
    let tripping = FilterSet::new("trip").register("trip", 1, move |args| {
        trip.cancel();
        Ok(args[0].clone())
    });

    let mut result = PageResult::new(
        Arc::new(RenderContext::default()),
        page(
            "a.html",
            vec![
                text("a"),
                var("x", vec![FilterCall::bare("trip")]),
                text("b"),
                var("x", vec![]),
            ],
        ),
    )
    .with_arg("x", "-")
    .with_filters(tripping);

    let mut sink = Vec::new();
    assert!(matches!(
        result.render_to(&mut sink, &cancel).await,
        Err(RenderError::Cancelled)
    ));
    assert_eq!(String::from_utf8(sink).unwrap(), "a-");
}

#[test]
fn test_uninitialized_page_cannot_render_fragments() {
    let raw = Page::from_content("late.html", PageContent::new(vec![text("x")]));
    assert!(matches!(
        raw.fragments(),
        Err(RenderError::NotInitialized { .. })
    ));

    let result = PageResult::new(Arc::new(RenderContext::default()), Arc::new(raw));
    assert!(matches!(
        result.evaluate_binding("anything"),
        Err(RenderError::NotInitialized { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_renders_share_context() {
    let context = Arc::new(RenderContext::default());
    let shared = page(
        "shared.html",
        vec![var("user.name", vec![FilterCall::bare("upper")])],
    );

    let mut handles = Vec::new();
    for i in 0..8 {
        let context = context.clone();
        let shared = shared.clone();
        handles.push(tokio::spawn(async move {
            let mut result = PageResult::new(context, shared)
                .with_arg("user", map(vec![("name", Value::from(format!("user{}", i)))]));
            result.render_to_string().await
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap().unwrap(), format!("USER{}", i));
    }
    assert_eq!(context.bindings().len(), 1);
}
