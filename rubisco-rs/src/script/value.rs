//! Runtime value type shared by the interpreter, the inline-code evaluator
//! and the configuration containers.
//!
//! Values are dynamically typed. A template made of a single reference hands
//! back whatever the variable holds; only concatenation turns values into
//! text.

use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A runtime value.
///
/// Deserialises untagged, so JSON and TOML documents map straight onto it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

/// Longest string or list that repetition and `range()` will build.
pub const MAX_SEQUENCE_LEN: usize = 1 << 24;

/// Checked `len * times`, refusing anything over [`MAX_SEQUENCE_LEN`].
pub(crate) fn repeated_len(len: usize, times: usize) -> Result<usize, String> {
    len.checked_mul(times)
        .filter(|&total| total <= MAX_SEQUENCE_LEN)
        .ok_or_else(|| "repeated sequence too large".to_string())
}

/// Repeat count from an int operand; negative counts repeat zero times.
fn repeat_count(n: &Value) -> usize {
    usize::try_from(n.as_int().unwrap_or(0).max(0)).unwrap_or(usize::MAX)
}

fn write_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        write!(f, "{:.1}", x)
    } else {
        write!(f, "{x}")
    }
}

impl Value {
    /// Like `Display`, but strings are quoted. Used for container elements.
    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            other => fmt::Display::fmt(other, f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write_float(f, *x),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt_nested(f)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k:?}: ")?;
                    v.fmt_nested(f)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Value {
    /// Truthiness: null, `false`, zero, and empty strings or containers are
    /// falsy.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the type, as used in error messages and type annotations.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    // ── Arithmetic helpers ────────────────────────────────────────────────────

    fn unsupported(op: &str, a: &Value, b: &Value) -> String {
        format!(
            "unsupported operand types for {op}: '{}' and '{}'",
            a.type_name(),
            b.type_name()
        )
    }

    /// Both operands as numbers: `Some((a, b, is_float))`.
    fn numeric_pair(a: &Value, b: &Value) -> Option<(f64, f64, bool)> {
        let is_float = matches!(a, Value::Float(_)) || matches!(b, Value::Float(_));
        Some((a.as_float()?, b.as_float()?, is_float))
    }

    fn int_op(
        &self,
        rhs: &Value,
        op: &str,
        int: fn(i64, i64) -> Option<i64>,
        float: fn(f64, f64) -> f64,
    ) -> Result<Value, String> {
        if let (Some(a), Some(b)) = (self.as_int(), rhs.as_int()) {
            return int(a, b)
                .map(Value::Int)
                .ok_or_else(|| format!("integer overflow in {op}"));
        }
        match Self::numeric_pair(self, rhs) {
            Some((a, b, _)) => Ok(Value::Float(float(a, b))),
            None => Err(Self::unsupported(op, self, rhs)),
        }
    }

    pub fn arith_add(&self, rhs: &Value) -> Result<Value, String> {
        match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => {
                Ok(Value::List(a.iter().chain(b).cloned().collect()))
            }
            _ => self.int_op(rhs, "+", i64::checked_add, |a, b| a + b),
        }
    }

    pub fn arith_sub(&self, rhs: &Value) -> Result<Value, String> {
        self.int_op(rhs, "-", i64::checked_sub, |a, b| a - b)
    }

    pub fn arith_mul(&self, rhs: &Value) -> Result<Value, String> {
        match (self, rhs) {
            (Value::Str(s), n @ (Value::Int(_) | Value::Bool(_)))
            | (n @ (Value::Int(_) | Value::Bool(_)), Value::Str(s)) => {
                let times = repeat_count(n);
                if repeated_len(s.len(), times)? == 0 {
                    return Ok(Value::Str(String::new()));
                }
                Ok(Value::Str(s.repeat(times)))
            }
            (Value::List(items), n @ Value::Int(_)) | (n @ Value::Int(_), Value::List(items)) => {
                let times = repeat_count(n);
                if repeated_len(items.len(), times)? == 0 {
                    return Ok(Value::List(Vec::new()));
                }
                Ok(Value::List(
                    std::iter::repeat(items.iter().cloned())
                        .take(times)
                        .flatten()
                        .collect(),
                ))
            }
            _ => self.int_op(rhs, "*", i64::checked_mul, |a, b| a * b),
        }
    }

    /// True division; always produces a float, as in the configuration
    /// language users already know.
    pub fn arith_div(&self, rhs: &Value) -> Result<Value, String> {
        let (a, b, _) =
            Self::numeric_pair(self, rhs).ok_or_else(|| Self::unsupported("/", self, rhs))?;
        if b == 0.0 {
            return Err("division by zero".into());
        }
        Ok(Value::Float(a / b))
    }

    pub fn arith_floor_div(&self, rhs: &Value) -> Result<Value, String> {
        if let (Some(a), Some(b)) = (self.as_int(), rhs.as_int()) {
            if b == 0 {
                return Err("integer division by zero".into());
            }
            let q = a
                .checked_div_euclid(b)
                .ok_or_else(|| "integer overflow in //".to_string())?;
            return Ok(Value::Int(q - i64::from(b < 0 && a.rem_euclid(b) != 0)));
        }
        let (a, b, _) =
            Self::numeric_pair(self, rhs).ok_or_else(|| Self::unsupported("//", self, rhs))?;
        if b == 0.0 {
            return Err("float floor division by zero".into());
        }
        Ok(Value::Float((a / b).floor()))
    }

    pub fn arith_rem(&self, rhs: &Value) -> Result<Value, String> {
        if let (Some(a), Some(b)) = (self.as_int(), rhs.as_int()) {
            if b == 0 {
                return Err("modulo by zero".into());
            }
            // Result takes the sign of the divisor.
            let r = a.checked_rem(b).ok_or_else(|| "integer overflow in %".to_string())?;
            return Ok(Value::Int(if r != 0 && (r < 0) != (b < 0) { r + b } else { r }));
        }
        let (a, b, _) =
            Self::numeric_pair(self, rhs).ok_or_else(|| Self::unsupported("%", self, rhs))?;
        if b == 0.0 {
            return Err("modulo by zero".into());
        }
        Ok(Value::Float(a - b * (a / b).floor()))
    }

    pub fn arith_neg(&self) -> Result<Value, String> {
        match self {
            Value::Int(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| "integer overflow in -".to_string()),
            Value::Bool(b) => Ok(Value::Int(-i64::from(*b))),
            Value::Float(x) => Ok(Value::Float(-x)),
            other => Err(format!("bad operand type for unary -: '{}'", other.type_name())),
        }
    }

    /// Equality across numeric types (`1 == 1.0`); structural otherwise.
    pub fn loose_eq(&self, rhs: &Value) -> bool {
        match (self, rhs) {
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.loose_eq(w)))
            }
            (Value::Str(_), _) | (_, Value::Str(_)) | (Value::Null, _) | (_, Value::Null) => {
                self == rhs
            }
            _ => match Self::numeric_pair(self, rhs) {
                Some((a, b, _)) => a == b,
                None => self == rhs,
            },
        }
    }

    /// Ordering between numbers, between strings, and between lists.
    pub fn cmp_value(&self, rhs: &Value) -> Result<Ordering, String> {
        match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.cmp_value(y)? {
                        Ordering::Equal => continue,
                        other => return Ok(other),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => match Self::numeric_pair(self, rhs) {
                Some((a, b, _)) => Ok(a.partial_cmp(&b).unwrap_or(Ordering::Equal)),
                None => Err(format!(
                    "'<' not supported between '{}' and '{}'",
                    self.type_name(),
                    rhs.type_name()
                )),
            },
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        i64::try_from(n).map_or(Value::Float(n as f64), Value::Int)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
