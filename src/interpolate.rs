//! `${expr}` expansion inside string tokens.
//!
//! An expression is a variable name optionally followed by `.member`
//! segments, which index into objects by key and into arrays by position:
//! `${user.name}`, `${items.0}`. Undefined names and missing members expand
//! to nothing.

use crate::scope::Scope;
use serde_json::Value;
use std::borrow::Cow;
use thiserror::Error;

const MARKER: &str = "${";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("unterminated ${{ at offset {offset} in {text:?}")]
    Unterminated { text: String, offset: usize },
    #[error("malformed expression ${{{expr}}}")]
    Malformed { expr: String },
}

/// Read access to variables, as needed for expansion.
pub trait Lookup {
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl Lookup for Scope {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name)
    }
}

/// Expand every `${expr}` in `text`.
///
/// Text without a marker is returned borrowed and `vars` is never consulted.
pub fn interpolate<'t>(text: &'t str, vars: &dyn Lookup) -> Result<Cow<'t, str>, InterpolationError> {
    if !text.contains(MARKER) {
        return Ok(Cow::Borrowed(text));
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(MARKER) {
        out.push_str(&rest[..start]);
        let body = &rest[start + MARKER.len()..];
        let end = body.find('}').ok_or_else(|| InterpolationError::Unterminated {
            text: text.to_string(),
            offset: text.len() - rest.len() + start,
        })?;
        let expr = &body[..end];
        if let Some(value) = evaluate(expr, vars)? {
            out.push_str(&render(&value));
        }
        rest = &body[end + 1..];
    }
    out.push_str(rest);
    Ok(Cow::Owned(out))
}

/// Text form of a value as it appears once substituted.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_member(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn evaluate(expr: &str, vars: &dyn Lookup) -> Result<Option<Value>, InterpolationError> {
    let malformed = || InterpolationError::Malformed {
        expr: expr.to_string(),
    };
    let mut parts = expr.trim().split('.');
    let name = parts.next().filter(|n| is_identifier(n)).ok_or_else(malformed)?;
    let members: Vec<&str> = parts.collect();
    if !members.iter().all(|m| is_member(m)) {
        return Err(malformed());
    }

    let mut value = match vars.lookup(name) {
        Some(v) => v,
        None => return Ok(None),
    };
    for member in members {
        let next = match &value {
            Value::Object(map) => map.get(member).cloned(),
            Value::Array(items) => member.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
            _ => None,
        };
        match next {
            Some(v) => value = v,
            None => return Ok(None),
        }
    }
    Ok(Some(value))
}
