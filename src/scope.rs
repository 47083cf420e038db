//! Scope layers for name resolution.
//!
//! A scope is an ordered, immutable list of argument layers searched front
//! to back: call-scoped parameters, page arguments, layout arguments, then
//! the global/context arguments. Nested page or partial invocations never
//! touch a parent's maps - they build a new chain with an extra scoped
//! layer in front.

use std::collections::HashMap;
use std::sync::Arc;

use page_ast::{Resolved, Value};

/// Named values held by one scope layer
pub type Args = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Parameters of a nested partial/page invocation
    Scoped,
    Page,
    Layout,
    Global,
}

#[derive(Debug, Clone)]
pub struct ScopeLayer {
    pub kind: LayerKind,
    pub args: Arc<Args>,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeChain {
    layers: Vec<ScopeLayer>,
}

impl ScopeChain {
    /// Build the base chain for a render unit
    pub fn new(page: Arc<Args>, layout: Option<Arc<Args>>, global: Arc<Args>) -> Self {
        let mut layers = Vec::with_capacity(3);
        layers.push(ScopeLayer {
            kind: LayerKind::Page,
            args: page,
        });
        if let Some(layout) = layout {
            layers.push(ScopeLayer {
                kind: LayerKind::Layout,
                args: layout,
            });
        }
        layers.push(ScopeLayer {
            kind: LayerKind::Global,
            args: global,
        });
        Self { layers }
    }

    /// New chain with `params` in front of every existing layer.
    ///
    /// Existing scoped parameters remain visible for names the new layer
    /// does not define.
    pub fn with_scoped(&self, params: Args) -> Self {
        let mut layers = Vec::with_capacity(self.layers.len() + 1);
        layers.push(ScopeLayer {
            kind: LayerKind::Scoped,
            args: Arc::new(params),
        });
        layers.extend(self.layers.iter().cloned());
        Self { layers }
    }

    /// Chain for a nested partial invocation.
    ///
    /// The parent's scoped parameters overlaid by `params` form a single
    /// scoped layer; the partial's own declared `args` sit beneath it, ahead
    /// of the parent's page, layout and global layers.
    pub fn nested(&self, declared: &Args, params: Args) -> Self {
        let mut scoped = self.scoped_params();
        scoped.extend(params);

        let mut layers = Vec::with_capacity(self.layers.len() + 2);
        layers.push(ScopeLayer {
            kind: LayerKind::Scoped,
            args: Arc::new(scoped),
        });
        if !declared.is_empty() {
            layers.push(ScopeLayer {
                kind: LayerKind::Page,
                args: Arc::new(declared.clone()),
            });
        }
        layers.extend(
            self.layers
                .iter()
                .filter(|l| l.kind != LayerKind::Scoped)
                .cloned(),
        );
        Self { layers }
    }

    /// First binding for `name`, searching layers in order
    pub fn lookup(&self, name: &str) -> Resolved {
        self.find(name)
            .map(|(_, value)| Resolved::from(value.clone()))
            .unwrap_or_default()
    }

    /// Like [`lookup`](Self::lookup), also reporting which layer answered
    pub fn find(&self, name: &str) -> Option<(LayerKind, &Value)> {
        self.layers
            .iter()
            .find_map(|layer| layer.args.get(name).map(|value| (layer.kind, value)))
    }

    pub fn has_layout(&self) -> bool {
        self.layers.iter().any(|l| l.kind == LayerKind::Layout)
    }

    /// Flattened view of every scoped layer, innermost winning
    pub fn scoped_params(&self) -> Args {
        let mut merged = Args::new();
        for layer in self.layers.iter().rev() {
            if layer.kind == LayerKind::Scoped {
                for (k, v) in layer.args.iter() {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }
        merged
    }

    pub fn layers(&self) -> &[ScopeLayer] {
        &self.layers
    }
}
