//! Default filter catalog registered into every render context.

use page_ast::{Resolved, Value};

use super::registry::FilterSet;
use crate::error::FilterError;

/// Name of the default catalog provider
pub const DEFAULT_FILTERS: &str = "default";

/// Build the default catalog
pub fn default_filters() -> FilterSet {
    FilterSet::new(DEFAULT_FILTERS)
        .register("upper", 1, |args| map_text(args, |s| s.to_uppercase()))
        .register("lower", 1, |args| map_text(args, |s| s.to_lowercase()))
        .register("trim", 1, |args| map_text(args, |s| s.trim().to_string()))
        .register("append", 2, append)
        .register("join", 2, join)
        .register("length", 1, length)
        .register("add", 2, add)
        .register("raw", 1, |args| Ok(Resolved::Value(Value::Raw(text(arg(args, 0))))))
        .register("json", 1, json)
        .register("now", 0, |_| {
            Ok(Resolved::Value(Value::Str(chrono::Utc::now().to_rfc3339())))
        })
        .register_unknown_aware("otherwise", 2, otherwise)
        .register_unknown_aware("default", 2, otherwise)
        .register_unknown_aware("isNull", 1, |args| {
            Ok(Resolved::Value(Value::Bool(arg(args, 0).is_missing())))
        })
        .register_unknown_aware("isEmpty", 1, |args| {
            let empty = match arg(args, 0) {
                Resolved::Value(Value::Str(s)) => s.is_empty(),
                Resolved::Value(Value::List(items)) => items.is_empty(),
                Resolved::Value(Value::Map(pairs)) => pairs.is_empty(),
                Resolved::Value(_) => false,
                _ => true,
            };
            Ok(Resolved::Value(Value::Bool(empty)))
        })
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

static ABSENT: Resolved = Resolved::Absent;

fn arg(args: &[Resolved], index: usize) -> &Resolved {
    args.get(index).unwrap_or(&ABSENT)
}

fn text(resolved: &Resolved) -> String {
    resolved.as_value().map(Value::to_text).unwrap_or_default()
}

/// Apply a string transform; a missing piped value stays null
fn map_text(args: &[Resolved], f: impl Fn(&str) -> String) -> Result<Resolved, FilterError> {
    match arg(args, 0) {
        Resolved::Value(v) => Ok(Resolved::Value(Value::Str(f(&v.to_text())))),
        _ => Ok(Resolved::Null),
    }
}

// -----------------------------------------------------------------------------
// Filters
// -----------------------------------------------------------------------------

fn append(args: &[Resolved]) -> Result<Resolved, FilterError> {
    let mut s = text(arg(args, 0));
    s.push_str(&text(arg(args, 1)));
    Ok(Resolved::Value(Value::Str(s)))
}

fn join(args: &[Resolved]) -> Result<Resolved, FilterError> {
    let delimiter = text(arg(args, 1));
    match arg(args, 0) {
        Resolved::Value(Value::List(items)) => Ok(Resolved::Value(Value::Str(
            items
                .iter()
                .map(Value::to_text)
                .collect::<Vec<_>>()
                .join(&delimiter),
        ))),
        Resolved::Value(other) => Err(FilterError::type_mismatch("list", other.type_key())),
        _ => Ok(Resolved::Null),
    }
}

fn length(args: &[Resolved]) -> Result<Resolved, FilterError> {
    let len = match arg(args, 0) {
        Resolved::Value(Value::Str(s)) | Resolved::Value(Value::Raw(s)) => s.chars().count(),
        Resolved::Value(Value::List(items)) => items.len(),
        Resolved::Value(Value::Map(pairs)) => pairs.len(),
        Resolved::Value(other) => {
            return Err(FilterError::type_mismatch("string, list or map", other.type_key()))
        }
        _ => 0,
    };
    Ok(Resolved::Value(Value::Int(len as i64)))
}

fn add(args: &[Resolved]) -> Result<Resolved, FilterError> {
    let (lhs, rhs) = match (arg(args, 0).as_value(), arg(args, 1).as_value()) {
        (Some(l), Some(r)) => (l, r),
        _ => return Ok(Resolved::Null),
    };
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(*b)
            .map(|sum| Resolved::Value(Value::Int(sum)))
            .ok_or_else(|| FilterError::Failed(format!("integer overflow adding {} and {}", a, b))),
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => Ok(Resolved::Value(Value::Float(a + b))),
            (None, _) => Err(FilterError::type_mismatch("number", lhs.type_key())),
            (_, None) => Err(FilterError::type_mismatch("number", rhs.type_key())),
        },
    }
}

fn json(args: &[Resolved]) -> Result<Resolved, FilterError> {
    let value = arg(args, 0).clone().into_value_or_null();
    let encoded = serde_json::to_string(&value).map_err(|e| FilterError::Failed(e.to_string()))?;
    // `<\/` is still valid JSON and cannot close an enclosing <script>
    Ok(Resolved::Value(Value::Raw(encoded.replace("</", "<\\/"))))
}

fn otherwise(args: &[Resolved]) -> Result<Resolved, FilterError> {
    match arg(args, 0) {
        Resolved::Value(v) => Ok(Resolved::Value(v.clone())),
        _ => Ok(arg(args, 1).clone()),
    }
}
