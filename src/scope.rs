use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Errors raised by scope mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScopeError {
    /// The name is bound to an immutable entry in the scope being written.
    #[error("immutable variable: {0}")]
    Immutable(String),
}

#[derive(Debug, Clone)]
struct Variable {
    value: Value,
    mutable: bool,
}

/// Hierarchical variable store visible to a command and its children.
///
/// Reads walk from this scope up through its ancestors. Writes only ever
/// touch this scope; reaching an ancestor is done explicitly through
/// [`Scope::parent`].
///
/// Each scope guards its own table with a lock, so a scope shared between
/// pipeline stages (the ambient parent) serialises concurrent writes. When two
/// stages write the same name the last writer wins.
#[derive(Debug, Default)]
pub struct Scope {
    vars: RwLock<HashMap<String, Variable>>,
    parent: Option<Arc<Scope>>,
}

impl Scope {
    /// Create a scope with no parent.
    pub fn root() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create an empty scope whose lookups fall through to `parent`.
    ///
    /// The child keeps its parent alive; the parent never refers back to it.
    pub fn child(parent: &Arc<Scope>) -> Arc<Self> {
        Arc::new(Self {
            vars: RwLock::default(),
            parent: Some(Arc::clone(parent)),
        })
    }

    pub fn parent(&self) -> Option<&Arc<Scope>> {
        self.parent.as_ref()
    }

    /// Look a variable up here, then in each ancestor in turn.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(var) = self.read().get(name) {
            return Some(var.value.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }

    /// Like [`Scope::get`], returning `default` when the name is undefined.
    pub fn get_or(&self, name: &str, default: Value) -> Value {
        self.get(name).unwrap_or(default)
    }

    /// Convenience accessor rendering the value as text.
    ///
    /// Strings are returned without quotes, `null` and undefined names yield
    /// `None`, anything else is rendered as JSON.
    pub fn get_string(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }

    /// Bind a mutable variable in this scope.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) -> Result<Option<Value>, ScopeError> {
        self.set_with(name, value, true)
    }

    /// Bind a variable in this scope with explicit mutability.
    ///
    /// Fails only if this scope already holds an immutable entry for the
    /// name. Immutable entries in ancestors are shadowed, not consulted.
    /// Returns the previous local value.
    pub fn set_with(
        &self,
        name: impl Into<String>,
        value: impl Into<Value>,
        mutable: bool,
    ) -> Result<Option<Value>, ScopeError> {
        let name = name.into();
        let mut vars = self.write();
        if let Some(existing) = vars.get(&name) {
            if !existing.mutable {
                return Err(ScopeError::Immutable(name));
            }
        }
        let previous = vars.insert(
            name,
            Variable {
                value: value.into(),
                mutable,
            },
        );
        Ok(previous.map(|v| v.value))
    }

    /// Remove a local binding. Ancestors are untouched.
    pub fn unset(&self, name: &str) -> Result<Option<Value>, ScopeError> {
        let mut vars = self.write();
        match vars.get(name) {
            Some(var) if !var.mutable => Err(ScopeError::Immutable(name.to_string())),
            Some(_) => Ok(vars.remove(name).map(|v| v.value)),
            None => Ok(None),
        }
    }

    /// Whether a `set` of this name would be accepted by the nearest scope
    /// defining it. Undefined names are mutable.
    pub fn is_mutable(&self, name: &str) -> bool {
        if let Some(var) = self.read().get(name) {
            return var.mutable;
        }
        self.parent.as_ref().is_none_or(|p| p.is_mutable(name))
    }

    /// A name is cloaked when a local binding hides a binding of the same
    /// name in some ancestor.
    ///
    /// Derived on every call; nothing is stored.
    pub fn is_cloaked(&self, name: &str) -> bool {
        self.contains_local(name) && self.parent.as_ref().is_some_and(|p| p.contains(name))
    }

    /// Whether the name is visible from this scope, locally or inherited.
    pub fn contains(&self, name: &str) -> bool {
        self.contains_local(name) || self.parent.as_ref().is_some_and(|p| p.contains(name))
    }

    pub fn contains_local(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Names bound in this scope only, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Every name visible from this scope, sorted and de-duplicated.
    pub fn visible_names(&self) -> Vec<String> {
        let mut all = BTreeSet::new();
        let mut current = Some(self);
        while let Some(scope) = current {
            all.extend(scope.read().keys().cloned());
            current = scope.parent.as_deref();
        }
        all.into_iter().collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Variable>> {
        self.vars.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Variable>> {
        self.vars.write().unwrap_or_else(PoisonError::into_inner)
    }
}
