//! Map and list containers whose contents are templates resolved at read
//! time.
//!
//! Keys and values are stored raw. Every read goes through the template
//! engine against whatever bindings are active at that moment, so a value
//! written as `"${{home}}/.cache"` follows the current `home` binding.
//! Nested maps and lists are always stored as containers of the same kind;
//! raw [`Value::List`]/[`Value::Map`] inputs are converted on the way in.

use std::fmt;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::script::typecheck::{describe, TypeSpec};
use crate::script::{format, Value};
use crate::var::VarStore;

// ── Node ──────────────────────────────────────────────────────────────────────

/// One stored element: a raw scalar or a nested container.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Scalar(Value),
    List(AutoFormatList),
    Map(AutoFormatMap),
}

/// A read result. Scalars come back evaluated; nested containers come back
/// by reference and resolve on their own reads.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<'a> {
    Value(Value),
    List(&'a AutoFormatList),
    Map(&'a AutoFormatMap),
}

impl Node {
    /// Evaluate a string scalar as a template; other scalars pass through.
    pub fn resolve(&self, store: &mut VarStore) -> Result<Resolved<'_>> {
        Ok(match self {
            Node::Scalar(Value::Str(template)) => Resolved::Value(format(store, template)?),
            Node::Scalar(v) => Resolved::Value(v.clone()),
            Node::List(list) => Resolved::List(list),
            Node::Map(map) => Resolved::Map(map),
        })
    }

    /// Evaluate this node and everything below it.
    pub fn resolve_all(&self, store: &mut VarStore) -> Result<Value> {
        self.resolve(store)?.into_value(store)
    }

    /// Owned form of [`resolve`](Self::resolve), used by removals.
    fn into_resolved(self, store: &mut VarStore) -> Result<Node> {
        match self {
            Node::Scalar(Value::Str(template)) => Ok(Node::from(format(store, &template)?)),
            other => Ok(other),
        }
    }

    /// The stored form, without evaluating anything.
    pub fn raw_value(&self) -> Value {
        match self {
            Node::Scalar(v) => v.clone(),
            Node::List(list) => list.raw_value(),
            Node::Map(map) => map.raw_value(),
        }
    }
}

impl Resolved<'_> {
    /// Fully evaluated value, resolving nested containers.
    pub fn into_value(self, store: &mut VarStore) -> Result<Value> {
        match self {
            Resolved::Value(v) => Ok(v),
            Resolved::List(list) => list.resolve_all(store),
            Resolved::Map(map) => map.resolve_all(store),
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Resolved::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Resolved::Value(v) => v.type_name(),
            Resolved::List(_) => "list",
            Resolved::Map(_) => "map",
        }
    }

    fn check(&self, spec: &TypeSpec, key: &str, store: &mut VarStore) -> Result<()> {
        match self {
            Resolved::Value(v) => spec.check(key, v),
            _ if spec.inspects_elements() => spec.check(key, &self.clone().into_value(store)?),
            // Shape-only check; element contents are irrelevant here.
            Resolved::List(_) => spec.check(key, &Value::List(Vec::new())),
            Resolved::Map(_) => spec.check(key, &Value::Map(IndexMap::new())),
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::List(items) => Node::List(items.into_iter().collect()),
            Value::Map(map) => Node::Map(map.into_iter().collect()),
            other => Node::Scalar(other),
        }
    }
}

impl From<AutoFormatList> for Node {
    fn from(list: AutoFormatList) -> Self {
        Node::List(list)
    }
}

impl From<AutoFormatMap> for Node {
    fn from(map: AutoFormatMap) -> Self {
        Node::Map(map)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Scalar(Value::from(s))
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::Scalar(Value::Str(s))
    }
}

impl From<i64> for Node {
    fn from(n: i64) -> Self {
        Node::Scalar(Value::Int(n))
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Scalar(Value::Bool(b))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw_value())
    }
}

// ── AutoFormatMap ─────────────────────────────────────────────────────────────

/// Ordered map of raw templates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutoFormatMap {
    entries: IndexMap<String, Node>,
}

impl AutoFormatMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store `value` under the raw key `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Node>) -> Option<Node> {
        self.entries.insert(key.into(), value.into())
    }

    /// Stored node under the raw key, without resolving anything.
    pub fn raw(&self, key: &str) -> Option<&Node> {
        self.entries.get(key)
    }

    pub fn iter_raw(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Position of the entry whose resolved key equals the resolved `key`.
    fn position(&self, key: &str, store: &mut VarStore) -> Result<Option<usize>> {
        let wanted = format(store, key)?.to_string();
        for (i, raw) in self.entries.keys().enumerate() {
            if format(store, raw)?.to_string() == wanted {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    pub fn contains_key(&self, key: &str, store: &mut VarStore) -> Result<bool> {
        Ok(self.position(key, store)?.is_some())
    }

    /// Resolved value under `key`, or `None` if no key resolves to it.
    pub fn get_opt(&self, key: &str, store: &mut VarStore) -> Result<Option<Resolved<'_>>> {
        match self.position(key, store)? {
            Some(i) => Ok(Some(self.entries[i].resolve(store)?)),
            None => Ok(None),
        }
    }

    /// Resolved value under `key`; [`Error::MissingKey`] if absent.
    pub fn get(&self, key: &str, store: &mut VarStore) -> Result<Resolved<'_>> {
        self.get_opt(key, store)?
            .ok_or_else(|| Error::MissingKey { key: key.to_string() })
    }

    /// Resolved value under `key`, required to be a string.
    pub fn get_str(&self, key: &str, store: &mut VarStore) -> Result<String> {
        match self.query(key).expect(TypeSpec::Str).fetch(store)? {
            Resolved::Value(Value::Str(s)) => Ok(s),
            other => Err(Error::TypeMismatch {
                key: key.to_string(),
                expected: "str".into(),
                actual: other.type_name().into(),
            }),
        }
    }

    /// Start a typed lookup of `key`.
    pub fn query(&self, key: impl Into<String>) -> Query<'_> {
        Query {
            map: self,
            key: key.into(),
            default: None,
            expected: TypeSpec::Any,
            overlay: Vec::new(),
        }
    }

    /// Follow `path` through nested maps.
    pub fn get_path(&self, path: &[&str], store: &mut VarStore) -> Result<Resolved<'_>> {
        let Some((last, parents)) = path.split_last() else {
            return Ok(Resolved::Map(self));
        };
        let mut map = self;
        for key in parents {
            map = match map.get(key, store)? {
                Resolved::Map(inner) => inner,
                other => {
                    return Err(Error::TypeMismatch {
                        key: key.to_string(),
                        expected: "map".into(),
                        actual: other.type_name().into(),
                    })
                }
            };
        }
        map.get(last, store)
    }

    /// Resolved keys, in insertion order.
    pub fn keys(&self, store: &mut VarStore) -> Result<Vec<String>> {
        self.entries
            .keys()
            .map(|k| -> Result<String> { Ok(format(store, k)?.to_string()) })
            .collect()
    }

    pub fn values(&self, store: &mut VarStore) -> Result<Vec<Resolved<'_>>> {
        self.entries.values().map(|v| v.resolve(store)).collect()
    }

    pub fn items(&self, store: &mut VarStore) -> Result<Vec<(String, Resolved<'_>)>> {
        self.entries
            .iter()
            .map(|(k, v)| -> Result<(String, Resolved<'_>)> {
                Ok((format(store, k)?.to_string(), v.resolve(store)?))
            })
            .collect()
    }

    /// Remove the entry whose key resolves to `key`, returning its resolved
    /// value.
    pub fn remove(&mut self, key: &str, store: &mut VarStore) -> Result<Option<Node>> {
        match self.position(key, store)? {
            Some(i) => match self.entries.shift_remove_index(i) {
                Some((_, node)) => Ok(Some(node.into_resolved(store)?)),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Remove the most recently inserted entry.
    pub fn pop_last(&mut self, store: &mut VarStore) -> Result<Option<(String, Node)>> {
        match self.entries.pop() {
            Some((key, node)) => Ok(Some((
                format(store, &key)?.to_string(),
                node.into_resolved(store)?,
            ))),
            None => Ok(None),
        }
    }

    /// Merge `other` into `self`: maps merge recursively, lists
    /// concatenate, anything else is replaced. Works on raw keys.
    pub fn merge(&mut self, other: AutoFormatMap) {
        for (key, incoming) in other.entries {
            let incoming = match (self.entries.get_mut(&key), incoming) {
                (Some(Node::Map(mine)), Node::Map(theirs)) => {
                    mine.merge(theirs);
                    continue;
                }
                (Some(Node::List(mine)), Node::List(theirs)) => {
                    mine.items.extend(theirs.items);
                    continue;
                }
                (_, incoming) => incoming,
            };
            self.entries.insert(key, incoming);
        }
    }

    /// Evaluate every key and value, recursively.
    pub fn resolve_all(&self, store: &mut VarStore) -> Result<Value> {
        let mut out = IndexMap::with_capacity(self.entries.len());
        for (k, v) in &self.entries {
            let key = format(store, k)?.to_string();
            out.insert(key, v.resolve_all(store)?);
        }
        Ok(Value::Map(out))
    }

    pub fn raw_value(&self) -> Value {
        Value::Map(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.raw_value()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Node>> FromIterator<(K, V)> for AutoFormatMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        AutoFormatMap {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl TryFrom<Value> for AutoFormatMap {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Map(map) => Ok(map.into_iter().collect()),
            other => Err(Error::TypeMismatch {
                key: "<root>".into(),
                expected: "map".into(),
                actual: describe(&other),
            }),
        }
    }
}

impl fmt::Display for AutoFormatMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw_value())
    }
}

// ── Query ─────────────────────────────────────────────────────────────────────

/// A typed lookup built by [`AutoFormatMap::query`].
#[must_use]
pub struct Query<'m> {
    map: &'m AutoFormatMap,
    key: String,
    default: Option<Value>,
    expected: TypeSpec,
    overlay: Vec<(String, Value)>,
}

impl<'m> Query<'m> {
    /// Returned, unvalidated, when the key is absent.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Validate a found value against `spec`.
    pub fn expect(mut self, spec: TypeSpec) -> Self {
        self.expected = spec;
        self
    }

    /// Bindings pushed for the duration of the lookup.
    pub fn overlay<I, K, V>(mut self, bindings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.overlay
            .extend(bindings.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn fetch(self, store: &mut VarStore) -> Result<Resolved<'m>> {
        let Query { map, key, default, expected, overlay } = self;
        let mut scope = store.scope(overlay);
        let Some(i) = map.position(&key, &mut scope)? else {
            return default
                .map(Resolved::Value)
                .ok_or(Error::MissingKey { key });
        };
        let resolved = map.entries[i].resolve(&mut scope)?;
        resolved.check(&expected, &key, &mut scope)?;
        Ok(resolved)
    }
}

// ── AutoFormatList ────────────────────────────────────────────────────────────

/// Sequence of raw templates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutoFormatList {
    items: Vec<Node>,
}

impl AutoFormatList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, value: impl Into<Node>) {
        self.items.push(value.into());
    }

    /// Insert at `index`, clamped to the end of the list.
    pub fn insert(&mut self, index: usize, value: impl Into<Node>) {
        let index = index.min(self.items.len());
        self.items.insert(index, value.into());
    }

    /// Replace the item at `index`.
    pub fn set(&mut self, index: usize, value: impl Into<Node>) -> Result<()> {
        let len = self.items.len();
        let slot = self
            .items
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })?;
        *slot = value.into();
        Ok(())
    }

    pub fn raw(&self, index: usize) -> Option<&Node> {
        self.items.get(index)
    }

    pub fn iter_raw(&self) -> impl Iterator<Item = &Node> {
        self.items.iter()
    }

    pub fn get(&self, index: usize, store: &mut VarStore) -> Result<Resolved<'_>> {
        self.items
            .get(index)
            .ok_or(Error::IndexOutOfRange { index, len: self.items.len() })?
            .resolve(store)
    }

    /// Resolve items lazily, one per step.
    pub fn iter<'a>(
        &'a self,
        store: &'a mut VarStore,
    ) -> impl Iterator<Item = Result<Resolved<'a>>> + 'a {
        self.items.iter().map(move |node| node.resolve(store))
    }

    pub fn remove(&mut self, index: usize, store: &mut VarStore) -> Result<Node> {
        if index >= self.items.len() {
            return Err(Error::IndexOutOfRange { index, len: self.items.len() });
        }
        self.items.remove(index).into_resolved(store)
    }

    pub fn pop(&mut self, store: &mut VarStore) -> Result<Option<Node>> {
        self.items.pop().map(|n| n.into_resolved(store)).transpose()
    }

    /// Position of the first item that resolves equal to `value`.
    pub fn index_of(&self, value: &Value, store: &mut VarStore) -> Result<Option<usize>> {
        for (i, node) in self.items.iter().enumerate() {
            if node.resolve_all(store)?.loose_eq(value) {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    pub fn contains(&self, value: &Value, store: &mut VarStore) -> Result<bool> {
        Ok(self.index_of(value, store)?.is_some())
    }

    pub fn count(&self, value: &Value, store: &mut VarStore) -> Result<usize> {
        let mut n = 0;
        for node in &self.items {
            if node.resolve_all(store)?.loose_eq(value) {
                n += 1;
            }
        }
        Ok(n)
    }

    pub fn resolve_all(&self, store: &mut VarStore) -> Result<Value> {
        let items = self
            .items
            .iter()
            .map(|n| n.resolve_all(store))
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::List(items))
    }

    pub fn raw_value(&self) -> Value {
        Value::List(self.items.iter().map(Node::raw_value).collect())
    }
}

impl<V: Into<Node>> FromIterator<V> for AutoFormatList {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        AutoFormatList {
            items: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<V: Into<Node>> Extend<V> for AutoFormatList {
    fn extend<I: IntoIterator<Item = V>>(&mut self, iter: I) {
        self.items.extend(iter.into_iter().map(Into::into));
    }
}

impl fmt::Display for AutoFormatList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw_value())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
