//! General-purpose functions available to inline code.
//!
//! Each function receives a `Vec<Value>` of already-evaluated arguments and
//! returns `Result<Value, String>`. The sandbox dispatches here for every
//! name in [`NAMES`] that a variable or helper does not shadow.

use super::value::{repeated_len, Value};

/// Every function [`call_builtin`] knows.
pub const NAMES: &[&str] = &[
    "len", "str", "int", "float", "bool", "type", "abs", "min", "max", "round", "pow", "sqrt",
    "upper", "lower", "strip", "replace", "find", "split", "join", "startswith", "endswith",
    "contains", "substr", "repeat", "keys", "values", "range",
];

/// Dispatch a built-in function call.
///
/// Returns `None` if the function name is not a built-in.
pub fn call_builtin(name: &str, args: Vec<Value>) -> Option<Result<Value, String>> {
    // Inner function returns Result<Option<Value>, String>:
    //   Ok(None)    → not a builtin
    //   Ok(Some(v)) → success
    //   Err(e)      → builtin call failed
    fn inner(name: &str, args: Vec<Value>) -> Result<Option<Value>, String> {
        Ok(Some(match name {
            // ── Conversions ──────────────────────────────────────────────────
            "str" => Value::Str(arg(&args, 0, name)?.to_string()),
            "int" => match arg(&args, 0, name)? {
                Value::Int(n) => Value::Int(*n),
                Value::Bool(b) => Value::Int(i64::from(*b)),
                Value::Float(x) if x.is_finite() => Value::Int(x.trunc() as i64),
                Value::Str(s) => s
                    .trim()
                    .parse()
                    .map(Value::Int)
                    .map_err(|_| format!("invalid literal for int(): {s:?}"))?,
                other => return Err(format!("int() argument must be a string or a number, not '{}'", other.type_name())),
            },
            "float" => match arg(&args, 0, name)? {
                Value::Str(s) => s
                    .trim()
                    .parse()
                    .map(Value::Float)
                    .map_err(|_| format!("could not convert string to float: {s:?}"))?,
                other => Value::Float(get_float(&args, 0, name).map_err(|_| {
                    format!("float() argument must be a string or a number, not '{}'", other.type_name())
                })?),
            },
            "bool" => Value::Bool(args.first().is_some_and(Value::as_bool)),
            "type" => Value::Str(arg(&args, 0, name)?.type_name().to_owned()),

            // ── Collections ──────────────────────────────────────────────────
            "len" => match arg(&args, 0, name)? {
                Value::Str(s) => Value::from(s.chars().count()),
                Value::List(items) => Value::from(items.len()),
                Value::Map(map) => Value::from(map.len()),
                other => return Err(format!("object of type '{}' has no len()", other.type_name())),
            },
            "keys" => match arg(&args, 0, name)? {
                Value::Map(map) => Value::List(map.keys().cloned().map(Value::Str).collect()),
                other => return Err(format!("keys: expected map, got '{}'", other.type_name())),
            },
            "values" => match arg(&args, 0, name)? {
                Value::Map(map) => Value::List(map.values().cloned().collect()),
                other => return Err(format!("values: expected map, got '{}'", other.type_name())),
            },
            "range" => {
                let (start, stop) = match args.len() {
                    1 => (0, get_int(&args, 0, name)?),
                    _ => (get_int(&args, 0, name)?, get_int(&args, 1, name)?),
                };
                let len = usize::try_from(i128::from(stop) - i128::from(start)).unwrap_or(0);
                repeated_len(len, 1)?;
                Value::List((start..stop).map(Value::Int).collect())
            }
            "join" => {
                let sep = get_str(&args, 0, name)?;
                let items = match arg(&args, 1, name)? {
                    Value::List(items) => items,
                    other => return Err(format!("join: expected list, got '{}'", other.type_name())),
                };
                let parts: Vec<String> = items.iter().map(Value::to_string).collect();
                Value::Str(parts.join(sep))
            }
            "min" | "max" => {
                let candidates = match args.as_slice() {
                    [Value::List(items)] => items.clone(),
                    _ => args.clone(),
                };
                let mut best: Option<Value> = None;
                for v in candidates {
                    best = Some(match best {
                        None => v,
                        Some(cur) => {
                            let ord = v.cmp_value(&cur)?;
                            let take = if name == "min" { ord.is_lt() } else { ord.is_gt() };
                            if take { v } else { cur }
                        }
                    });
                }
                best.ok_or_else(|| format!("{name}: expected at least one value"))?
            }

            // ── String functions ─────────────────────────────────────────────
            "upper" => Value::Str(get_str(&args, 0, name)?.to_uppercase()),
            "lower" => Value::Str(get_str(&args, 0, name)?.to_lowercase()),
            "strip" => Value::Str(get_str(&args, 0, name)?.trim().to_owned()),
            "replace" => {
                // replace(haystack, needle, replacement)
                let haystack = get_str(&args, 0, name)?;
                let needle = get_str(&args, 1, name)?;
                let repl = get_str(&args, 2, name)?;
                Value::Str(haystack.replace(needle, repl))
            }
            "find" => {
                let haystack = get_str(&args, 0, name)?;
                let needle = get_str(&args, 1, name)?;
                Value::Int(match haystack.find(needle) {
                    Some(i) => haystack[..i].chars().count() as i64,
                    None => -1,
                })
            }
            "split" => {
                let s = get_str(&args, 0, name)?;
                let parts: Vec<Value> = match args.get(1) {
                    Some(_) => {
                        let sep = get_str(&args, 1, name)?;
                        if sep.is_empty() {
                            return Err("split: empty separator".into());
                        }
                        s.split(sep).map(Value::from).collect()
                    }
                    None => s.split_whitespace().map(Value::from).collect(),
                };
                Value::List(parts)
            }
            "startswith" => {
                let s = get_str(&args, 0, name)?;
                Value::Bool(s.starts_with(get_str(&args, 1, name)?))
            }
            "endswith" => {
                let s = get_str(&args, 0, name)?;
                Value::Bool(s.ends_with(get_str(&args, 1, name)?))
            }
            "contains" => {
                let s = get_str(&args, 0, name)?;
                Value::Bool(s.contains(get_str(&args, 1, name)?))
            }
            "substr" => {
                // substr(str, start[, len]), counted in characters
                let s = get_str(&args, 0, name)?;
                let pos = get_int(&args, 1, name)?.max(0) as usize;
                let len_arg = match args.get(2) {
                    Some(_) => Some(get_int(&args, 2, name)?.max(0) as usize),
                    None => None,
                };
                let chars: Vec<char> = s.chars().collect();
                let start = pos.min(chars.len());
                let slice = match len_arg {
                    Some(n) => &chars[start..((start + n).min(chars.len()))],
                    None => &chars[start..],
                };
                Value::Str(slice.iter().collect())
            }
            "repeat" => {
                let s = get_str(&args, 0, name)?;
                let n = usize::try_from(get_int(&args, 1, name)?.max(0)).unwrap_or(usize::MAX);
                if repeated_len(s.len(), n)? == 0 {
                    return Ok(Some(Value::Str(String::new())));
                }
                Value::Str(s.repeat(n))
            }

            // ── Math functions ───────────────────────────────────────────────
            "abs" => match arg(&args, 0, name)? {
                Value::Int(n) => Value::Int(n.checked_abs().ok_or("abs: integer overflow")?),
                Value::Float(x) => Value::Float(x.abs()),
                other => return Err(format!("bad operand type for abs(): '{}'", other.type_name())),
            },
            "round" => {
                let x = get_float(&args, 0, name)?;
                match args.get(1) {
                    Some(_) => {
                        let digits = get_int(&args, 1, name)?.clamp(-300, 300) as i32;
                        let scale = 10f64.powi(digits);
                        Value::Float((x * scale).round() / scale)
                    }
                    None => Value::Int(x.round() as i64),
                }
            }
            "pow" => match (arg(&args, 0, name)?, arg(&args, 1, name)?) {
                (Value::Int(base), Value::Int(exp)) if *exp >= 0 => {
                    let exp = u32::try_from(*exp).map_err(|_| "pow: exponent too large")?;
                    Value::Int(base.checked_pow(exp).ok_or("pow: integer overflow")?)
                }
                _ => {
                    let base = get_float(&args, 0, name)?;
                    let exp = get_float(&args, 1, name)?;
                    Value::Float(base.powf(exp))
                }
            },
            "sqrt" => {
                let x = get_float(&args, 0, name)?;
                if x < 0.0 {
                    return Err("sqrt: math domain error".into());
                }
                Value::Float(x.sqrt())
            }

            _ => return Ok(None),
        }))
    }
    inner(name, args).transpose()
}

// ── Argument accessors ────────────────────────────────────────────────────────

fn arg<'a>(args: &'a [Value], idx: usize, name: &str) -> Result<&'a Value, String> {
    args.get(idx)
        .ok_or_else(|| format!("{name}: argument {idx} missing"))
}

fn get_str<'a>(args: &'a [Value], idx: usize, name: &str) -> Result<&'a str, String> {
    let v = arg(args, idx, name)?;
    v.as_str()
        .ok_or_else(|| format!("{name}: argument {idx} must be str, not '{}'", v.type_name()))
}

fn get_int(args: &[Value], idx: usize, name: &str) -> Result<i64, String> {
    let v = arg(args, idx, name)?;
    v.as_int()
        .ok_or_else(|| format!("{name}: argument {idx} must be int, not '{}'", v.type_name()))
}

fn get_float(args: &[Value], idx: usize, name: &str) -> Result<f64, String> {
    let v = arg(args, idx, name)?;
    v.as_float()
        .ok_or_else(|| format!("{name}: argument {idx} must be a number, not '{}'", v.type_name()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> Value {
        call_builtin(name, args)
            .expect("not a builtin")
            .expect("call failed")
    }

    #[test]
    fn every_name_dispatches() {
        for name in NAMES {
            // Wrong arity is an error, never "not a builtin".
            assert!(call_builtin(name, vec![]).is_some(), "{name} not dispatched");
        }
    }

    #[test]
    fn len_counts_chars() {
        assert_eq!(call("len", vec!["héllo".into()]), Value::Int(5));
        assert_eq!(call("len", vec![Value::from(vec![1, 2])]), Value::Int(2));
    }

    #[test]
    fn conversions() {
        assert_eq!(call("int", vec![" 42 ".into()]), Value::Int(42));
        assert_eq!(call("int", vec![Value::Float(3.9)]), Value::Int(3));
        assert_eq!(call("float", vec!["1.5".into()]), Value::Float(1.5));
        assert_eq!(call("str", vec![Value::Int(7)]), Value::from("7"));
        assert_eq!(call("bool", vec!["".into()]), Value::Bool(false));
        assert!(call_builtin("int", vec!["abc".into()]).unwrap().is_err());
    }

    #[test]
    fn substr_with_len() {
        assert_eq!(
            call("substr", vec!["hello world".into(), Value::Int(6), Value::Int(3)]),
            Value::from("wor")
        );
        assert_eq!(call("substr", vec!["abc".into(), Value::Int(10)]), Value::from(""));
    }

    #[test]
    fn split_and_join() {
        let parts = call("split", vec!["a,b,c".into(), ",".into()]);
        assert_eq!(parts, Value::from(vec!["a", "b", "c"]));
        assert_eq!(call("join", vec!["-".into(), parts]), Value::from("a-b-c"));
    }

    #[test]
    fn find_reports_char_index() {
        assert_eq!(call("find", vec!["héllo".into(), "l".into()]), Value::Int(2));
        assert_eq!(call("find", vec!["abc".into(), "z".into()]), Value::Int(-1));
    }

    #[test]
    fn min_max() {
        assert_eq!(call("max", vec![Value::Int(1), Value::Int(5), Value::Int(3)]), Value::Int(5));
        assert_eq!(call("min", vec![Value::from(vec![4, 2, 8])]), Value::Int(2));
        assert!(call_builtin("max", vec![]).unwrap().is_err());
    }

    #[test]
    fn math() {
        assert_eq!(call("pow", vec![Value::Int(2), Value::Int(10)]), Value::Int(1024));
        assert_eq!(call("sqrt", vec![Value::Int(16)]), Value::Float(4.0));
        assert_eq!(call("abs", vec![Value::Int(-3)]), Value::Int(3));
        assert_eq!(call("round", vec![Value::Float(2.6)]), Value::Int(3));
        assert!(call_builtin("sqrt", vec![Value::Int(-1)]).unwrap().is_err());
    }

    #[test]
    fn type_names() {
        assert_eq!(call("type", vec![Value::Null]), Value::from("null"));
        assert_eq!(call("type", vec![Value::from("x")]), Value::from("str"));
    }

    #[test]
    fn oversized_results_are_errors() {
        let huge = Value::Int(i64::MAX);
        assert!(matches!(call_builtin("repeat", vec!["ab".into(), huge.clone()]), Some(Err(_))));
        assert!(matches!(call_builtin("range", vec![huge]), Some(Err(_))));
        assert!(matches!(
            call_builtin("range", vec![Value::Int(i64::MIN), Value::Int(i64::MAX)]),
            Some(Err(_))
        ));
        assert_eq!(call("range", vec![Value::Int(3), Value::Int(1)]), Value::List(vec![]));
        assert_eq!(call("repeat", vec!["ab".into(), Value::Int(2)]), Value::from("abab"));
    }

    #[test]
    fn unknown_builtin_returns_none() {
        assert!(call_builtin("nonexistent", vec![]).is_none());
    }
}
