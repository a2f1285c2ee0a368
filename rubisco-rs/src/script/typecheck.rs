//! Runtime type specifications for typed container lookups.
//!
//! A [`TypeSpec`] is written in annotation syntax such as `str`,
//! `list[str] | null`, `map[str, int]`, `tuple[int, str]` or
//! `tuple[int, ...]`, and checked against a [`Value`] recursively.

use std::fmt;
use std::str::FromStr;

use super::value::Value;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    Any,
    Null,
    Bool,
    Int,
    Float,
    Str,
    List,
    Map,
    Union(Vec<TypeSpec>),
    ListOf(Box<TypeSpec>),
    MapOf(Box<TypeSpec>, Box<TypeSpec>),
    /// Positional element types.
    Tuple(Vec<TypeSpec>),
    /// Homogeneous, any length.
    TupleOf(Box<TypeSpec>),
}

impl TypeSpec {
    pub fn list_of(inner: TypeSpec) -> Self {
        TypeSpec::ListOf(Box::new(inner))
    }

    pub fn map_of(key: TypeSpec, value: TypeSpec) -> Self {
        TypeSpec::MapOf(Box::new(key), Box::new(value))
    }

    /// `inner | null`
    pub fn optional(inner: TypeSpec) -> Self {
        TypeSpec::Union(vec![inner, TypeSpec::Null])
    }

    /// Returns `true` if checking needs to look inside containers.
    pub fn inspects_elements(&self) -> bool {
        match self {
            TypeSpec::Union(options) => options.iter().any(TypeSpec::inspects_elements),
            TypeSpec::ListOf(_) | TypeSpec::MapOf(..) | TypeSpec::Tuple(_) | TypeSpec::TupleOf(_) => {
                true
            }
            _ => false,
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (TypeSpec::Any, _) => true,
            (TypeSpec::Null, Value::Null)
            | (TypeSpec::Bool, Value::Bool(_))
            | (TypeSpec::Int, Value::Int(_))
            | (TypeSpec::Float, Value::Float(_))
            | (TypeSpec::Str, Value::Str(_))
            | (TypeSpec::List, Value::List(_))
            | (TypeSpec::Map, Value::Map(_)) => true,
            (TypeSpec::Union(options), v) => options.iter().any(|t| t.matches(v)),
            (TypeSpec::ListOf(inner) | TypeSpec::TupleOf(inner), Value::List(items)) => {
                items.iter().all(|item| inner.matches(item))
            }
            (TypeSpec::MapOf(k, v), Value::Map(map)) => map
                .iter()
                .all(|(key, val)| k.matches(&Value::Str(key.clone())) && v.matches(val)),
            // Only positions present on both sides are checked.
            (TypeSpec::Tuple(types), Value::List(items)) => {
                types.iter().zip(items).all(|(t, v)| t.matches(v))
            }
            _ => false,
        }
    }

    /// Check `value`, naming `key` in the mismatch error.
    pub fn check(&self, key: &str, value: &Value) -> Result<()> {
        if self.matches(value) {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                key: key.to_string(),
                expected: self.to_string(),
                actual: describe(value),
            })
        }
    }
}

/// Type of `value` in annotation syntax, including element types of
/// homogeneous containers.
pub fn describe(value: &Value) -> String {
    fn uniform(mut types: impl Iterator<Item = String>) -> Option<String> {
        let first = types.next()?;
        types.all(|t| t == first).then_some(first)
    }
    match value {
        Value::List(items) => match uniform(items.iter().map(describe)) {
            Some(inner) => format!("list[{inner}]"),
            None => "list".to_string(),
        },
        Value::Map(map) => match uniform(map.values().map(describe)) {
            Some(inner) => format!("map[str, {inner}]"),
            None => "map".to_string(),
        },
        other => other.type_name().to_string(),
    }
}

/// Check every item of `items` against `spec`.
pub fn check_all<'a>(items: impl IntoIterator<Item = &'a Value>, spec: &TypeSpec) -> Result<()> {
    for (i, item) in items.into_iter().enumerate() {
        spec.check(&format!("[{i}]"), item)?;
    }
    Ok(())
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[TypeSpec], sep: &str) -> fmt::Result {
            for (i, t) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{t}")?;
            }
            Ok(())
        }
        match self {
            TypeSpec::Any => f.write_str("any"),
            TypeSpec::Null => f.write_str("null"),
            TypeSpec::Bool => f.write_str("bool"),
            TypeSpec::Int => f.write_str("int"),
            TypeSpec::Float => f.write_str("float"),
            TypeSpec::Str => f.write_str("str"),
            TypeSpec::List => f.write_str("list"),
            TypeSpec::Map => f.write_str("map"),
            TypeSpec::Union(options) => join(f, options, " | "),
            TypeSpec::ListOf(inner) => write!(f, "list[{inner}]"),
            TypeSpec::MapOf(k, v) => write!(f, "map[{k}, {v}]"),
            TypeSpec::Tuple(types) => {
                f.write_str("tuple[")?;
                join(f, types, ", ")?;
                f.write_str("]")
            }
            TypeSpec::TupleOf(inner) => write!(f, "tuple[{inner}, ...]"),
        }
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Error from parsing annotation text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid type annotation {text:?}: {reason}")]
pub struct ParseTypeError {
    pub text: String,
    pub reason: String,
}

struct SpecParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> SpecParser<'a> {
    fn fail<T>(&self, reason: impl Into<String>) -> std::result::Result<T, ParseTypeError> {
        Err(ParseTypeError {
            text: self.src.to_string(),
            reason: reason.into(),
        })
    }

    fn skip_ws(&mut self) {
        let rest = &self.src[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, s: &str) -> bool {
        self.skip_ws();
        if self.src[self.pos..].starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> &'a str {
        self.skip_ws();
        let src: &'a str = self.src;
        let rest = &src[self.pos..];
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn union(&mut self) -> std::result::Result<TypeSpec, ParseTypeError> {
        let mut options = vec![self.single()?];
        while self.eat("|") {
            options.push(self.single()?);
        }
        Ok(if options.len() == 1 {
            options.remove(0)
        } else {
            TypeSpec::Union(options)
        })
    }

    fn single(&mut self) -> std::result::Result<TypeSpec, ParseTypeError> {
        let name = self.ident();
        let generic = self.eat("[");
        let spec = match (name, generic) {
            ("any", false) => TypeSpec::Any,
            ("null" | "none" | "None", false) => TypeSpec::Null,
            ("bool", false) => TypeSpec::Bool,
            ("int", false) => TypeSpec::Int,
            ("float", false) => TypeSpec::Float,
            ("str", false) => TypeSpec::Str,
            ("list", false) => TypeSpec::List,
            ("map" | "dict", false) => TypeSpec::Map,
            ("tuple", false) => TypeSpec::TupleOf(Box::new(TypeSpec::Any)),
            ("list", true) => TypeSpec::list_of(self.union()?),
            ("map" | "dict", true) => {
                let k = self.union()?;
                if !self.eat(",") {
                    return self.fail("map[...] takes a key and a value type");
                }
                TypeSpec::map_of(k, self.union()?)
            }
            ("tuple", true) => {
                let mut types = vec![self.union()?];
                let mut homogeneous = false;
                while self.eat(",") {
                    if self.eat("...") {
                        homogeneous = true;
                        break;
                    }
                    types.push(self.union()?);
                }
                match (homogeneous, types.len()) {
                    (true, 1) => TypeSpec::TupleOf(Box::new(types.remove(0))),
                    (true, _) => return self.fail("'...' must follow a single element type"),
                    (false, _) => TypeSpec::Tuple(types),
                }
            }
            ("", _) => return self.fail("expected a type name"),
            (other, _) => return self.fail(format!("unknown type '{other}'")),
        };
        if generic && !self.eat("]") {
            return self.fail("expected ']'");
        }
        Ok(spec)
    }
}

impl FromStr for TypeSpec {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parser = SpecParser { src: s, pos: 0 };
        let spec = parser.union()?;
        parser.skip_ws();
        if parser.pos != s.len() {
            return parser.fail(format!("unexpected '{}'", &s[parser.pos..]));
        }
        Ok(spec)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(s: &str) -> TypeSpec {
        s.parse().unwrap()
    }

    #[test]
    fn parse_and_display_round_trip() {
        for text in ["str", "list[str] | null", "map[str, list[int]]", "tuple[int, str]", "tuple[float, ...]"] {
            assert_eq!(spec(text).to_string(), text);
        }
        assert_eq!(spec("dict[str,int]"), TypeSpec::map_of(TypeSpec::Str, TypeSpec::Int));
    }

    #[test]
    fn parse_errors() {
        for text in ["", "lst", "list[str", "map[str]", "tuple[int, str, ...]", "str junk"] {
            assert!(text.parse::<TypeSpec>().is_err(), "{text:?} should not parse");
        }
    }

    #[test]
    fn scalars_are_strict() {
        assert!(TypeSpec::Int.matches(&Value::Int(1)));
        assert!(!TypeSpec::Int.matches(&Value::Bool(true)));
        assert!(!TypeSpec::Float.matches(&Value::Int(1)));
        assert!(TypeSpec::Any.matches(&Value::Null));
    }

    #[test]
    fn nested_elements() {
        let v = Value::from(vec!["a", "b"]);
        assert!(spec("list[str]").matches(&v));
        assert!(!spec("list[int]").matches(&v));
        assert!(spec("list[int] | list[str]").matches(&v));
        assert!(spec("tuple[str, str]").matches(&v));
        assert!(spec("tuple[str, ...]").matches(&v));
    }

    #[test]
    fn tuples_check_positions_present_on_both_sides() {
        let v = Value::from(vec!["a", "b"]);
        assert!(spec("tuple[str, str, int]").matches(&v));
        assert!(spec("tuple[str]").matches(&v));
        assert!(!spec("tuple[str, int, int]").matches(&v));
        assert!(spec("tuple[int]").matches(&Value::List(Vec::new())));
        assert!(!spec("tuple[str]").matches(&Value::from("a")));
    }

    #[test]
    fn mismatch_names_key_and_types() {
        let err = spec("list[int]").check("deps", &Value::from(vec!["x"])).unwrap_err();
        assert_eq!(
            err,
            Error::TypeMismatch {
                key: "deps".into(),
                expected: "list[int]".into(),
                actual: "list[str]".into(),
            }
        );
    }

    #[test]
    fn check_all_reports_index() {
        let items = [Value::Int(1), Value::from("two")];
        let err = check_all(&items, &TypeSpec::Int).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { key, .. } if key == "[1]"));
    }
}
