use crate::command::Command;
use crate::namespace::{Namespace, NamespaceError, Node};
use crate::scope::Scope;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Scope variable holding the colon-separated groups searched for relative
/// command paths.
pub const SEARCH_PATH_VAR: &str = "CMD_PATH";

/// Alias chains longer than this are treated as unresolvable.
pub const DEFAULT_MAX_ALIAS_DEPTH: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// Nothing invocable lives at the path, or an alias chain through it
    /// loops or runs too deep.
    #[error("command not found: {0}")]
    NotFound(String),
    /// The namespace names a command identifier the registry has no
    /// implementation for.
    #[error("command {path} resolves to {id}, which is not registered")]
    NotRegistered { path: String, id: String },
}

/// A path resolved down to an invocable command.
#[derive(Clone)]
pub struct Resolved {
    pub command: Arc<dyn Command>,
    pub id: String,
    /// The path as requested.
    pub path: String,
    /// Set when resolution went through at least one alias.
    pub alias: Option<String>,
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("alias", &self.alias)
            .finish()
    }
}

/// Commands by identifier, plus the namespace and alias table used to reach
/// them.
///
/// Every table sits behind its own lock so commands such as `alias` can
/// register while other stages resolve.
pub struct Registry {
    commands: RwLock<HashMap<String, Arc<dyn Command>>>,
    aliases: RwLock<BTreeMap<String, String>>,
    namespace: RwLock<Namespace>,
    max_alias_depth: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ALIAS_DEPTH)
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn place_alias(namespace: &mut Namespace, name: &str, target: &str) -> Result<(), NamespaceError> {
    if let Some(Node::Command(_)) = namespace.get(name) {
        return Err(NamespaceError::Conflict(name.to_string()));
    }
    namespace.insert(name, Node::Alias(target.to_string()))?;
    Ok(())
}

impl Registry {
    pub fn new(max_alias_depth: usize) -> Self {
        Self {
            commands: RwLock::default(),
            aliases: RwLock::default(),
            namespace: RwLock::default(),
            max_alias_depth,
        }
    }

    /// Add a command under its identifier and index its aliases.
    ///
    /// A command already registered under the same identifier is replaced,
    /// as is an alias of that name. Nothing changes if any of the paths
    /// conflicts; an alias may not take the place of a command.
    pub fn register(&self, command: Arc<dyn Command>) -> Result<(), NamespaceError> {
        let id = command.id().to_string();
        let aliases = command.aliases();

        // Lock order everywhere: namespace, aliases, commands.
        let mut namespace = write(&self.namespace);
        let mut staged = namespace.clone();
        let replaced = staged.insert(&id, Node::Command(id.clone()))?;
        for alias in &aliases {
            place_alias(&mut staged, alias, &id)?;
        }
        *namespace = staged;

        let mut table = write(&self.aliases);
        if let Some(Node::Alias(target)) = replaced {
            tracing::debug!(id = %id, target = %target, "command replaces alias");
            table.retain(|name, _| matches!(namespace.get(name), Some(Node::Alias(_))));
        }
        for alias in aliases {
            table.insert(alias, id.clone());
        }
        if write(&self.commands).insert(id.clone(), command).is_some() {
            tracing::warn!(id = %id, "command registered twice, last registration wins");
        }
        Ok(())
    }

    /// Make `name` resolve to whatever `target` resolves to.
    ///
    /// The target is not checked here; a dangling or cyclic alias fails at
    /// resolution time. A name already taken by a command is a conflict.
    pub fn register_alias(&self, name: &str, target: &str) -> Result<(), NamespaceError> {
        let mut namespace = write(&self.namespace);
        place_alias(&mut namespace, name, target)?;
        write(&self.aliases).insert(name.to_string(), target.to_string());
        Ok(())
    }

    /// Remove an alias, returning its target.
    pub fn remove_alias(&self, name: &str) -> Option<String> {
        let mut namespace = write(&self.namespace);
        let target = write(&self.aliases).remove(name)?;
        if matches!(namespace.get(name), Some(Node::Alias(_))) {
            namespace.remove(name);
        }
        Some(target)
    }

    /// Alias table, sorted by name.
    pub fn aliases(&self) -> Vec<(String, String)> {
        read(&self.aliases)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Registered commands, sorted by identifier.
    pub fn commands(&self) -> Vec<Arc<dyn Command>> {
        let mut commands: Vec<Arc<dyn Command>> = read(&self.commands).values().cloned().collect();
        commands.sort_by(|a, b| a.id().cmp(b.id()));
        commands
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Command>> {
        read(&self.commands).get(id).cloned()
    }

    /// Search path taken from [`SEARCH_PATH_VAR`] in `scope`.
    pub fn search_path(scope: &Scope) -> Vec<String> {
        scope
            .get_string(SEARCH_PATH_VAR)
            .map(|s| {
                s.split(':')
                    .filter(|p| !p.trim().is_empty())
                    .map(|p| p.trim().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolve `path` to a registered command, following aliases.
    #[tracing::instrument(level = "debug", skip(self, scope), err)]
    pub fn resolve(&self, scope: &Scope, path: &str) -> Result<Resolved, ResolveError> {
        let search = Self::search_path(scope);
        let namespace = read(&self.namespace);
        let not_found = || ResolveError::NotFound(path.to_string());

        let mut current = path.to_string();
        let mut alias = None;
        let mut visited = HashSet::new();
        for _ in 0..=self.max_alias_depth {
            match namespace.lookup(&search, &current).ok_or_else(not_found)? {
                Node::Command(id) => {
                    let command = self.get(id).ok_or_else(|| ResolveError::NotRegistered {
                        path: path.to_string(),
                        id: id.clone(),
                    })?;
                    return Ok(Resolved {
                        command,
                        id: id.clone(),
                        path: path.to_string(),
                        alias,
                    });
                }
                Node::Alias(target) => {
                    if !visited.insert(current.clone()) {
                        tracing::warn!(path, alias = %current, "alias cycle");
                        return Err(not_found());
                    }
                    alias.get_or_insert_with(|| path.to_string());
                    current = target.clone();
                }
                Node::Group(_) => return Err(not_found()),
            }
        }
        tracing::warn!(path, depth = self.max_alias_depth, "alias chain too deep");
        Err(not_found())
    }
}
