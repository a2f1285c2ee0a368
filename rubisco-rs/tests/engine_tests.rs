//! End-to-end behaviour of the substitution engine through the public API.

use indexmap::IndexMap;
use rubisco::{
    fast_format, format, format_with, AutoFormatList, AutoFormatMap, Error, Resolved, TypeSpec,
    Value, VarStore,
};

fn map(pairs: &[(&str, Value)]) -> Value {
    Value::Map(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<IndexMap<_, _>>())
}

// ── Formatting ────────────────────────────────────────────────────────────────

#[test]
fn text_without_openers_is_unchanged() {
    let mut store = VarStore::new();
    for text in ["", "plain", "$ {{x}}", "${x}", "$&{x}", "}} and {{", "cost: $5"] {
        assert_eq!(format(&mut store, text), Ok(Value::from(text)), "{text:?}");
    }
}

#[test]
fn single_reference_preserves_type() {
    let mut store = VarStore::new();
    let deps = Value::from(vec!["zlib", "fmt"]);
    store.push("deps", deps.clone());
    store.push("jobs", 8);
    store.push("release", true);
    assert_eq!(format(&mut store, "${{deps}}"), Ok(deps));
    assert_eq!(format(&mut store, "${{ jobs }}"), Ok(Value::Int(8)));
    assert_eq!(format(&mut store, "${{release}}"), Ok(Value::Bool(true)));
}

#[test]
fn concatenation_stringifies() {
    let mut store = VarStore::new();
    store.push("x", 1);
    assert_eq!(format(&mut store, "a${{x}}b"), Ok(Value::from("a1b")));
    assert_eq!(format(&mut store, "${{x}}${{x}}"), Ok(Value::from("11")));
}

#[test]
fn lazy_fallback() {
    let mut store = VarStore::new();
    assert_eq!(format(&mut store, "${{u: fallback}}"), Ok(Value::from("fallback")));
    store.push("u", 42);
    // The fallback would fail if it were evaluated.
    assert_eq!(format(&mut store, "${{u: ${{never_bound}}}}"), Ok(Value::Int(42)));
    assert_eq!(format(&mut store, "${{u}}"), Ok(Value::Int(42)));
}

#[test]
fn undefined_without_fallback_fails() {
    let mut store = VarStore::new();
    let err = format(&mut store, "${{never_bound}}").unwrap_err();
    assert_eq!(err, Error::UndefinedVariable { name: "never_bound".into() });
    assert!(err.hint().is_some());
}

#[test]
fn nested_fallback() {
    let mut store = VarStore::new();
    store.push("b", "X");
    assert_eq!(format(&mut store, "${{a: ${{b}}}}"), Ok(Value::from("X")));
    assert_eq!(format(&mut store, "${{a: ${{c: deep}}}}"), Ok(Value::from("deep")));
}

#[test]
fn malformed_templates() {
    let mut store = VarStore::new();
    for text in ["${{", "${{name", "${{a b}}", "${{a:}}", "$&{{1 + 1"] {
        assert!(
            matches!(format(&mut store, text), Err(Error::MalformedExpression { .. })),
            "{text:?} should be malformed"
        );
    }
}

#[test]
fn deep_nesting_is_rejected() {
    let mut store = VarStore::new();
    let fallbacks = format!("{}x{}", "${{a: ".repeat(5000), "}}".repeat(5000));
    assert!(matches!(
        format(&mut store, &fallbacks),
        Err(Error::MalformedExpression { .. })
    ));
    for code in [
        format!("$&{{{{{}1{}}}}}", "(".repeat(5000), ")".repeat(5000)),
        format!("$&{{{{{}1}}}}", "-".repeat(5000)),
        format!("$&{{{{{}}}}}", vec!["1"; 5000].join("+")),
    ] {
        assert!(matches!(format(&mut store, &code), Err(Error::Eval { .. })), "{}", &code[..10]);
    }
    let shallow = format!("{}deep{}", "${{a: ".repeat(8), "}}".repeat(8));
    assert_eq!(format(&mut store, &shallow), Ok(Value::from("deep")));
}

#[test]
fn overlay_is_temporary() {
    let mut store = VarStore::new();
    store.push("target", "debug");
    assert_eq!(
        format_with(&mut store, "build/${{target}}", [("target", "release")]),
        Ok(Value::from("build/release"))
    );
    assert_eq!(format(&mut store, "${{target}}"), Ok(Value::from("debug")));
}

// ── Scopes ────────────────────────────────────────────────────────────────────

#[test]
fn scope_balance_on_normal_exit() {
    let mut store = VarStore::new();
    store.with_scope([("a", 1)], |s| assert_eq!(s.get("a"), Ok(Value::Int(1))));
    assert!(!store.has("a"));
}

#[test]
fn scope_balance_on_failure() {
    let mut store = VarStore::new();
    let result = store.with_scope([("a", 1)], |s| format(s, "${{a}} ${{b}}"));
    assert!(result.is_err());
    assert!(!store.has("a"));
}

#[test]
fn nested_scopes_restore_in_order() {
    let mut store = VarStore::new();
    store.push("v", "outer");
    {
        let mut first = store.scope([("v", "middle")]);
        {
            let inner = first.scope([("v", "inner")]);
            assert_eq!(inner.peek("v"), Some(&Value::from("inner")));
        }
        assert_eq!(first.peek("v"), Some(&Value::from("middle")));
    }
    assert_eq!(store.pop("v"), Some(Value::from("outer")));
    assert_eq!(store.pop("v"), None);
}

// ── Inline code ───────────────────────────────────────────────────────────────

#[test]
fn sandbox_allows_arithmetic() {
    let mut store = VarStore::new();
    assert_eq!(format(&mut store, "$&{{1+1}}"), Ok(Value::Int(2)));
    store.push("jobs", 4);
    assert_eq!(format(&mut store, "-j$&{{jobs * 2}}"), Ok(Value::from("-j8")));
    assert_eq!(
        format(&mut store, "$&{{upper(get('cc', 'gcc'))}}"),
        Ok(Value::from("GCC"))
    );
}

#[test]
fn sandbox_denies_capabilities() {
    let mut store = VarStore::new();
    assert!(matches!(
        format(&mut store, "$&{{__import__('os')}}"),
        Err(Error::CapabilityDisallowed { .. })
    ));
}

#[test]
fn oversized_repetition_fails_cleanly() {
    let mut store = VarStore::new();
    for template in [
        "$&{{'ab' * 9223372036854775807}}",
        "$&{{[1, 2] * 9223372036854775807}}",
        "$&{{repeat('ab', 9223372036854775807)}}",
        "$&{{range(9223372036854775807)}}",
    ] {
        assert!(
            matches!(format(&mut store, template), Err(Error::Eval { .. })),
            "{template} should fail with an evaluation error"
        );
    }
}

#[test]
fn whitespace_only_code_is_empty() {
    let mut store = VarStore::new();
    assert_eq!(format(&mut store, "$&{{   }}"), Ok(Value::from("")));
    assert_eq!(format(&mut store, "[$&{{}}]"), Ok(Value::from("[]")));
}

// ── Fast path ─────────────────────────────────────────────────────────────────

#[test]
fn fast_path_rejects_fallback() {
    let mut store = VarStore::new();
    let err = fast_format(&mut store, "${{x:1}}").unwrap_err();
    assert!(matches!(err, Error::NotSimpleExpression { .. }));
    assert!(err.is_recoverable());
    assert_eq!(format(&mut store, "${{x:1}}"), Ok(Value::from("1")));
}

#[test]
fn fast_path_agrees_with_full_path() {
    let mut store = VarStore::new();
    store.push("name", "rubisco");
    store.push("n", 3);
    for template in ["${{name}}", "${{n}}", "v${{n}}.${{name}}", "no refs", "${{ name }}!"] {
        assert_eq!(
            fast_format(&mut store, template),
            format(&mut store, template),
            "{template:?}"
        );
    }
}

// ── Containers ────────────────────────────────────────────────────────────────

#[test]
fn containers_resolve_at_read_time() {
    let mut store = VarStore::new();
    let config = AutoFormatMap::try_from(map(&[("k", Value::from("${{v}}"))])).unwrap();
    store.push("v", "A");
    assert_eq!(config.get_str("k", &mut store), Ok("A".to_string()));
    store.pop("v");
    store.push("v", "B");
    assert_eq!(config.get_str("k", &mut store), Ok("B".to_string()));
}

#[test]
fn merge_concatenates_lists() {
    let mut store = VarStore::new();
    let mut mine = AutoFormatMap::try_from(map(&[("k", Value::from(vec![3]))])).unwrap();
    let theirs = AutoFormatMap::try_from(map(&[("k", Value::from(vec![1, 2]))])).unwrap();
    mine.merge(theirs);
    assert_eq!(
        mine.resolve_all(&mut store),
        Ok(map(&[("k", Value::from(vec![3, 1, 2]))]))
    );
}

#[test]
fn merge_replaces_mismatched_shapes() {
    let mut store = VarStore::new();
    let mut mine =
        AutoFormatMap::try_from(map(&[("k", map(&[("a", Value::Int(1))]))])).unwrap();
    let theirs = AutoFormatMap::try_from(map(&[("k", Value::Int(5))])).unwrap();
    mine.merge(theirs);
    assert_eq!(mine.resolve_all(&mut store), Ok(map(&[("k", Value::Int(5))])));
}

#[test]
fn typed_lookup() {
    let mut store = VarStore::new();
    store.push("dep", "zlib");
    let config = AutoFormatMap::try_from(map(&[
        ("deps", Value::from(vec!["${{dep}}", "fmt"])),
        ("jobs", Value::from("${{nproc: 2}}")),
    ]))
    .unwrap();

    let deps = config
        .query("deps")
        .expect(TypeSpec::list_of(TypeSpec::Str))
        .fetch(&mut store)
        .unwrap();
    let Resolved::List(list) = deps else {
        panic!("expected a list");
    };
    assert_eq!(list.get(0, &mut store).unwrap().as_value(), Some(&Value::from("zlib")));

    let err = config.query("jobs").expect(TypeSpec::Int).fetch(&mut store).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { key, .. } if key == "jobs"));

    let dflt = config.query("missing").default(Value::Null).fetch(&mut store).unwrap();
    assert_eq!(dflt.as_value(), Some(&Value::Null));
    assert!(matches!(
        config.query("missing").fetch(&mut store),
        Err(Error::MissingKey { .. })
    ));
}

#[test]
fn list_items_resolve_lazily() {
    let mut store = VarStore::new();
    let list: AutoFormatList = ["${{a}}", "plain"].into_iter().collect();
    assert!(list.get(0, &mut store).is_err());
    store.push("a", 7);
    assert_eq!(list.get(0, &mut store).unwrap().as_value(), Some(&Value::Int(7)));
    assert!(matches!(
        list.get(5, &mut store),
        Err(Error::IndexOutOfRange { index: 5, len: 2 })
    ));
}
