//! Binding path compilation and the shared accessor cache.
//!
//! A binding such as `user.addresses[0]['city']` is split into its root
//! name (looked up through the scope) and a member/index path applied to
//! whatever the root resolved to. Paths are compiled into reusable accessor
//! closures cached by `(runtime type, path)`. Compilation never fails:
//! a malformed path yields an accessor that reports the problem when it is
//! invoked.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use page_ast::Value;
use tracing::trace;

use crate::error::BindingError;

/// Compiled member/index path
pub type Accessor = Arc<dyn Fn(&Value) -> Result<Value, BindingError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
enum PathStep {
    /// `.name`
    Member(String),
    /// `[0]`
    Index(i64),
    /// `['key']`
    Key(String),
}

/// Split a binding into its root name and the remaining path.
///
/// `"user.name"` becomes `("user", ".name")`; a simple name has an empty path.
pub fn split_root(binding: &str) -> (&str, &str) {
    match binding.find(['.', '[']) {
        Some(pos) => binding.split_at(pos),
        None => (binding, ""),
    }
}

fn parse_steps(path: &str) -> Result<Vec<PathStep>, String> {
    let mut steps = Vec::new();
    let mut chars = path.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '.' => {
                let mut name = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c == '.' || c == '[' {
                        break;
                    }
                    name.push(c);
                    chars.next();
                }
                if name.is_empty() {
                    return Err(format!("empty member name at offset {}", pos));
                }
                if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
                    return Err(format!("invalid member name '{}'", name));
                }
                steps.push(PathStep::Member(name));
            }
            '[' => {
                let mut inner = String::new();
                let mut closed = false;
                let mut quote: Option<char> = None;
                let mut key_done = false;
                for (offset, c) in chars.by_ref() {
                    match quote {
                        Some(q) if c == q => {
                            quote = None;
                            key_done = true;
                        }
                        Some(_) => inner.push(c),
                        None if c == ']' => {
                            closed = true;
                            break;
                        }
                        None if key_done && c.is_whitespace() => {}
                        None if key_done => {
                            return Err(format!(
                                "unexpected '{}' after quoted key at offset {}",
                                c, offset
                            ));
                        }
                        None if (c == '\'' || c == '"') && inner.trim().is_empty() => {
                            inner.clear();
                            quote = Some(c);
                            // keep a marker so an empty quoted key stays a key
                            inner.push('\u{0}');
                        }
                        None => inner.push(c),
                    }
                }
                if !closed {
                    return Err(format!("unterminated index at offset {}", pos));
                }
                if let Some(key) = inner.strip_prefix('\u{0}') {
                    steps.push(PathStep::Key(key.to_string()));
                } else {
                    let index = inner.trim();
                    let index = index
                        .parse::<i64>()
                        .map_err(|_| format!("unsupported index '{}'", index))?;
                    steps.push(PathStep::Index(index));
                }
            }
            other => return Err(format!("unexpected '{}' at offset {}", other, pos)),
        }
    }
    Ok(steps)
}

fn apply_step(value: &Value, step: &PathStep) -> Result<Value, BindingError> {
    match (value, step) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Map(_), PathStep::Member(key) | PathStep::Key(key)) => {
            Ok(value.get(key).cloned().unwrap_or(Value::Null))
        }
        (Value::Map(_), PathStep::Index(i)) => {
            Ok(value.get(&i.to_string()).cloned().unwrap_or(Value::Null))
        }
        (Value::List(items), PathStep::Index(i)) => Ok(usize::try_from(*i)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(Value::Null)),
        (Value::Object(obj), PathStep::Member(name)) => {
            obj.member(name).ok_or_else(|| BindingError::UnknownMember {
                type_name: obj.type_name().to_string(),
                member: name.clone(),
            })
        }
        (Value::Object(obj), PathStep::Index(i)) => {
            obj.index(&Value::Int(*i))
                .ok_or_else(|| BindingError::InvalidIndex {
                    type_name: obj.type_name().to_string(),
                    index: i.to_string(),
                })
        }
        (Value::Object(obj), PathStep::Key(key)) => obj
            .index(&Value::Str(key.clone()))
            .or_else(|| obj.member(key))
            .ok_or_else(|| BindingError::InvalidIndex {
                type_name: obj.type_name().to_string(),
                index: format!("'{}'", key),
            }),
        (other, PathStep::Member(name)) => Err(BindingError::UnknownMember {
            type_name: other.type_key().to_string(),
            member: name.clone(),
        }),
        (other, PathStep::Index(i)) => Err(BindingError::InvalidIndex {
            type_name: other.type_key().to_string(),
            index: i.to_string(),
        }),
        (other, PathStep::Key(key)) => Err(BindingError::InvalidIndex {
            type_name: other.type_key().to_string(),
            index: format!("'{}'", key),
        }),
    }
}

/// Compile `path` (the part after the root name) without caching
pub fn compile_accessor(path: &str) -> Accessor {
    let accessor: Accessor = match parse_steps(path) {
        Ok(steps) => Arc::new(move |target: &Value| {
            let mut current: Option<Value> = None;
            for step in &steps {
                let next = apply_step(current.as_ref().unwrap_or(target), step)?;
                current = Some(next);
            }
            Ok(current.unwrap_or_else(|| target.clone()))
        }),
        Err(reason) => {
            let error = BindingError::InvalidPath {
                path: path.to_string(),
                reason,
            };
            Arc::new(move |_: &Value| Err(error.clone()))
        }
    };
    accessor
}

// =============================================================================
// CACHE
// =============================================================================

/// Accessor cache shared across render passes.
///
/// Concurrent misses for the same key may each compile; the last insert
/// wins.
#[derive(Default)]
pub struct BindingCache {
    compiled: RwLock<HashMap<(String, String), Accessor>>,
}

impl BindingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `path` against the runtime type of `target`, reusing a cached accessor
    pub fn compile(&self, target: &Value, path: &str) -> Accessor {
        let key = (target.type_key().to_string(), path.to_string());
        if let Some(accessor) = self
            .compiled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            trace!(type_name = %key.0, path, "binding cache hit");
            return accessor.clone();
        }

        trace!(type_name = %key.0, path, "binding cache miss");
        let accessor = compile_accessor(path);
        self.compiled
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, accessor.clone());
        accessor
    }

    pub fn len(&self) -> usize {
        self.compiled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.compiled
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl fmt::Debug for BindingCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingCache")
            .field("entries", &self.len())
            .finish()
    }
}
