//! Regex-driven interpolation for templates made only of plain references.
//!
//! Skips tokenising and tree building entirely. Anything beyond
//! `${{ name }}` (fallbacks, inline code) is rejected so the caller can use
//! the full formatter instead.

use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use regex::Regex;

use super::lexer::{CODE_OPEN, VAR_OPEN};
use super::value::Value;
use crate::error::{Error, Result};
use crate::var::VarStore;

const PAT_VAR: usize = 0;
const PAT_CODE: usize = 1;

static OPENERS: LazyLock<AhoCorasick> = LazyLock::new(|| AhoCorasick::new([VAR_OPEN, CODE_OPEN]));

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").expect("reference pattern is valid")
});

static WHOLE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}$").expect("reference pattern is valid")
});

/// Reject templates the fast path cannot handle. Returns `false` when the
/// template contains no opener at all.
fn precheck(template: &str) -> Result<bool> {
    let mut any = false;
    for m in OPENERS.find_iter(template) {
        if m.pattern() == PAT_CODE {
            return Err(Error::NotSimpleExpression { reason: "inline code" });
        }
        debug_assert_eq!(m.pattern(), PAT_VAR);
        any = true;
        // A fallback marker before the reference closes, or a reference
        // opened inside another, means a fallback is present.
        let body = &template[m.end()..];
        let close = body.find("}}").unwrap_or(body.len());
        let inner = &body[..close];
        if inner.contains(':') || inner.contains(VAR_OPEN) {
            return Err(Error::NotSimpleExpression { reason: "fallback" });
        }
    }
    Ok(any)
}

/// Interpolate `template` using only plain references.
///
/// A template that is exactly one reference returns the value unchanged;
/// otherwise every reference is replaced by its stringified value.
pub fn fast_format(store: &mut VarStore, template: &str) -> Result<Value> {
    if !precheck(template)? {
        return Ok(Value::Str(template.to_string()));
    }
    if let Some(caps) = WHOLE_REFERENCE.captures(template) {
        return store.get(&caps[1]);
    }
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in REFERENCE.captures_iter(template) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        out.push_str(&template[last..whole.start]);
        out.push_str(&store.get(&caps[1])?.to_string());
        last = whole.end;
    }
    out.push_str(&template[last..]);
    Ok(Value::Str(out))
}

/// [`fast_format`] with `overlay` pushed for the duration of the call.
pub fn fast_format_with<I, K, V>(store: &mut VarStore, template: &str, overlay: I) -> Result<Value>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    let mut scope = store.scope(overlay);
    fast_format(&mut scope, template)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
