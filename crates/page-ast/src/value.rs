//! Value types flowing through template evaluation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A host object reachable from a binding path.
///
/// Implementors expose named members and (optionally) an indexer. The
/// `type_name` is the runtime type identity used to key compiled binding
/// accessors, so two objects reporting the same name must expose the same
/// member set.
pub trait Bindable: fmt::Debug + Send + Sync {
    /// Runtime type identity
    fn type_name(&self) -> &str;

    /// Member lookup - `None` means the type has no such member
    fn member(&self, name: &str) -> Option<Value>;

    /// Indexer lookup - `None` means the type is not indexable by `index`
    fn index(&self, _index: &Value) -> Option<Value> {
        None
    }

    /// JSON projection used when the object is serialized or written as text
    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    /// Explicit null - present, but holding nothing
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Pre-encoded text written without output-format escaping
    Raw(String),
    List(Vec<Value>),
    Map(Vec<(String, Value)>),
    /// Deferred binding embedded in a container literal, resolved at evaluation
    Ref(String),
    Object(Arc<dyn Bindable>),
}

impl Value {
    /// Runtime type key - containers and scalars use fixed names, host
    /// objects report their own.
    pub fn type_key(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Raw(_) => "raw",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Ref(_) => "ref",
            Value::Object(obj) => obj.type_name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Raw(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Map lookup by key (first matching pair)
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// True when this value, or anything nested in it, is a deferred binding
    pub fn contains_refs(&self) -> bool {
        match self {
            Value::Ref(_) => true,
            Value::List(items) => items.iter().any(Value::contains_refs),
            Value::Map(pairs) => pairs.iter().any(|(_, v)| v.contains_refs()),
            _ => false,
        }
    }

    /// Textual serialization used by output formats
    pub fn to_text(&self) -> String {
        match self {
            Value::Null | Value::Ref(_) => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) | Value::Raw(s) => s.clone(),
            Value::List(_) | Value::Map(_) | Value::Object(_) => {
                serde_json::Value::from(self.clone()).to_string()
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Raw(a), Value::Raw(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a == b,
            // host objects compare by identity
            (Value::Object(a), Value::Object(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            Value::Raw(s) => write!(f, "{}", s),
            Value::Ref(name) => write!(f, "{}", name),
            Value::Null => write!(f, "null"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(pairs) => {
                write!(f, "{{")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            other => write!(f, "{}", other.to_text()),
        }
    }
}

// =============================================================================
// CONVERSIONS
// =============================================================================

/// Key marking a deferred binding inside JSON container literals
pub const REF_KEY: &str = "$ref";

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(serde_json::Value::String(name)) = map.get(REF_KEY) {
                        return Value::Ref(name.clone());
                    }
                }
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) | Value::Raw(s) => serde_json::Value::String(s),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Map(pairs) => serde_json::Value::Object(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
            Value::Ref(name) => serde_json::json!({ REF_KEY: name }),
            Value::Object(obj) => obj.to_json(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl<T: Bindable + 'static> From<Arc<T>> for Value {
    fn from(obj: Arc<T>) -> Self {
        Value::Object(obj)
    }
}

// =============================================================================
// THREE-STATE RESOLUTION
// =============================================================================

/// Outcome of resolving a name or expression.
///
/// `Absent` means nothing answered to the name at all; `Null` means a
/// binding exists and explicitly holds null. Filters flagged as handling
/// unknown values can tell the two apart.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Resolved {
    #[default]
    Absent,
    Null,
    Value(Value),
}

impl Resolved {
    pub fn is_absent(&self) -> bool {
        matches!(self, Resolved::Absent)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Resolved::Null)
    }

    /// Absent or null
    pub fn is_missing(&self) -> bool {
        !matches!(self, Resolved::Value(_))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Resolved::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Resolved::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Collapse to a plain value, mapping both absent and null to `Value::Null`
    pub fn into_value_or_null(self) -> Value {
        self.into_value().unwrap_or(Value::Null)
    }
}

impl From<Value> for Resolved {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Resolved::Null,
            v => Resolved::Value(v),
        }
    }
}

impl From<Option<Value>> for Resolved {
    fn from(value: Option<Value>) -> Self {
        match value {
            Some(v) => Resolved::from(v),
            None => Resolved::Absent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Point;

    impl Bindable for Point {
        fn type_name(&self) -> &str {
            "Point"
        }

        fn member(&self, name: &str) -> Option<Value> {
            match name {
                "x" => Some(Value::Int(1)),
                _ => None,
            }
        }
    }

    #[test]
    fn test_ref_round_trips_through_json() {
        let json = serde_json::json!({ "title": { "$ref": "page_title" }, "n": 2 });
        let value = Value::from(json.clone());
        assert_eq!(value.get("title"), Some(&Value::Ref("page_title".into())));
        assert!(value.contains_refs());
        assert_eq!(serde_json::Value::from(value), json);
    }

    #[test]
    fn test_text_serialization() {
        assert_eq!(Value::Null.to_text(), "");
        assert_eq!(Value::Float(2.5).to_text(), "2.5");
        assert_eq!(Value::Raw("<b>".into()).to_text(), "<b>");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::from("a")]).to_text(),
            r#"[1,"a"]"#
        );
    }

    #[test]
    fn test_resolved_keeps_null_distinct_from_absent() {
        assert_eq!(Resolved::from(Some(Value::Null)), Resolved::Null);
        assert_eq!(Resolved::from(None), Resolved::Absent);
        assert!(Resolved::Null.is_missing());
        assert!(!Resolved::Null.is_absent());
    }

    #[test]
    fn test_objects_compare_by_identity() {
        let a = Arc::new(Point);
        let v1 = Value::from(a.clone());
        let v2 = Value::from(a);
        assert_eq!(v1, v2);
        assert_ne!(v1, Value::from(Arc::new(Point)));
        assert_eq!(v1.type_key(), "Point");
    }
}
