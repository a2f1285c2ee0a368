//! Variable store.
//!
//! Every name maps to a stack of values so that nested scopes can shadow a
//! binding and restore it afterwards. A name with no values is absent from
//! the table entirely.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::script::Value;

/// Called with the store and the missing name when a lookup misses. The
/// callback may push a value for the name; the lookup is retried once after
/// every callback has run.
pub type UndefinedVarCallback = Arc<dyn Fn(&mut VarStore, &str) + Send + Sync>;

/// Name → value-stack table.
#[derive(Default, Clone)]
pub struct VarStore {
    vars: HashMap<String, Vec<Value>>,
    undefined_callbacks: Vec<UndefinedVarCallback>,
}

impl fmt::Debug for VarStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VarStore")
            .field("vars", &self.vars)
            .field("undefined_callbacks", &self.undefined_callbacks.len())
            .finish()
    }
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a value, shadowing any existing binding of `name`.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.entry(name.into()).or_default().push(value.into());
    }

    /// Pop the innermost value of `name`. `None` if the name is unbound.
    pub fn pop(&mut self, name: &str) -> Option<Value> {
        let stack = self.vars.get_mut(name)?;
        let value = stack.pop();
        if stack.is_empty() {
            self.vars.remove(name);
        }
        value
    }

    /// Pop the innermost value of `name`, or return `default` if unbound.
    pub fn pop_or(&mut self, name: &str, default: Value) -> Value {
        self.pop(name).unwrap_or(default)
    }

    /// Returns `true` if `name` has at least one value. Never runs callbacks.
    pub fn has(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Innermost value of `name` without running callbacks.
    pub fn peek(&self, name: &str) -> Option<&Value> {
        self.vars.get(name).and_then(|stack| stack.last())
    }

    /// Innermost value of `name`.
    ///
    /// On a miss the undefined-variable callbacks run in registration order
    /// and the lookup is retried once.
    pub fn get(&mut self, name: &str) -> Result<Value> {
        self.resolve(name).ok_or_else(|| Error::undefined(name))
    }

    /// [`get`](Self::get) without turning a miss into an error.
    pub(crate) fn resolve(&mut self, name: &str) -> Option<Value> {
        if let Some(v) = self.peek(name) {
            return Some(v.clone());
        }
        if self.undefined_callbacks.is_empty() {
            return None;
        }
        // Callbacks take `&mut self`, so iterate over a cloned list.
        let callbacks = self.undefined_callbacks.clone();
        for cb in &callbacks {
            cb(self, name);
        }
        self.peek(name).cloned()
    }

    /// Number of values stacked under `name`.
    pub fn depth(&self, name: &str) -> usize {
        self.vars.get(name).map_or(0, Vec::len)
    }

    /// Register a callback invoked when a lookup misses.
    pub fn add_undefined_callback<F>(&mut self, callback: F)
    where
        F: Fn(&mut VarStore, &str) + Send + Sync + 'static,
    {
        self.undefined_callbacks.push(Arc::new(callback));
    }

    /// Innermost value of every bound name.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    /// Iterate over every bound name and its innermost value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars
            .iter()
            .filter_map(|(k, stack)| Some((k.as_str(), stack.last()?)))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Push every binding and return a guard that pops them again when
    /// dropped. The guard dereferences to the store.
    pub fn scope<I, K, V>(&mut self, bindings: I) -> Scope<'_>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut names = Vec::new();
        for (name, value) in bindings {
            let name = name.into();
            self.push(name.clone(), value);
            names.push(name);
        }
        Scope { store: self, names }
    }

    /// Run `f` with `bindings` pushed; they are popped however `f` exits.
    pub fn with_scope<I, K, V, R>(&mut self, bindings: I, f: impl FnOnce(&mut VarStore) -> R) -> R
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut scope = self.scope(bindings);
        f(&mut scope)
    }
}

/// Scoped bindings. Popped on drop, including during unwinding.
pub struct Scope<'a> {
    store: &'a mut VarStore,
    names: Vec<String>,
}

impl Scope<'_> {
    /// Names this scope will pop on release.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Deref for Scope<'_> {
    type Target = VarStore;

    fn deref(&self) -> &VarStore {
        self.store
    }
}

impl DerefMut for Scope<'_> {
    fn deref_mut(&mut self) -> &mut VarStore {
        self.store
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        for name in self.names.iter().rev() {
            self.store.pop(name);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
