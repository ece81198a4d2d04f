//! Layout tree of groups, commands and aliases.
//!
//! Paths are `/`-separated group names ending in a leaf, e.g. `text/grep`.
//! A leading `/` makes a path absolute, which bypasses the search path.

use std::collections::BTreeMap;
use thiserror::Error;

pub const SEPARATOR: char = '/';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamespaceError {
    #[error("empty namespace path")]
    EmptyPath,
    /// A segment that has to be a group is already taken by a leaf, or a
    /// leaf would replace a group.
    #[error("namespace conflict at {0}")]
    Conflict(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Group(Group),
    /// Leaf naming a command by its registry identifier.
    Command(String),
    /// Leaf pointing at another path in the same tree.
    Alias(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    children: BTreeMap<String, Node>,
}

impl Group {
    pub fn children(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Namespace {
    root: Group,
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// Join a group prefix and a relative path.
pub fn join(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_matches(SEPARATOR);
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{prefix}{SEPARATOR}{path}")
    }
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a leaf at `path`, creating intermediate groups as needed.
    ///
    /// Returns the leaf previously stored there, if any.
    pub fn insert(&mut self, path: &str, node: Node) -> Result<Option<Node>, NamespaceError> {
        let parts: Vec<&str> = segments(path).collect();
        let Some((last, groups)) = parts.split_last() else {
            return Err(NamespaceError::EmptyPath);
        };

        let mut group = &mut self.root;
        for (i, name) in groups.iter().enumerate() {
            let entry = group
                .children
                .entry(name.to_string())
                .or_insert_with(|| Node::Group(Group::default()));
            group = match entry {
                Node::Group(g) => g,
                _ => return Err(NamespaceError::Conflict(parts[..=i].join("/"))),
            };
        }

        if matches!(group.children.get(*last), Some(Node::Group(_))) && !matches!(node, Node::Group(_)) {
            return Err(NamespaceError::Conflict(parts.join("/")));
        }
        Ok(group.children.insert(last.to_string(), node))
    }

    /// Remove the node at `path`. Empty groups left behind are kept.
    pub fn remove(&mut self, path: &str) -> Option<Node> {
        let parts: Vec<&str> = segments(path).collect();
        let (last, groups) = parts.split_last()?;
        let mut group = &mut self.root;
        for name in groups {
            group = match group.children.get_mut(*name)? {
                Node::Group(g) => g,
                _ => return None,
            };
        }
        group.children.remove(*last)
    }

    /// Absolute lookup from the root.
    pub fn get(&self, path: &str) -> Option<&Node> {
        let parts: Vec<&str> = segments(path).collect();
        let (last, groups) = parts.split_last()?;
        let mut group = &self.root;
        for name in groups {
            group = match group.children.get(*name)? {
                Node::Group(g) => g,
                _ => return None,
            };
        }
        group.children.get(*last)
    }

    /// Contextual lookup: absolute paths go straight to the root, relative
    /// ones are tried under each search-path group in order, then at the
    /// root.
    pub fn lookup<S: AsRef<str>>(&self, search: &[S], path: &str) -> Option<&Node> {
        if path.starts_with(SEPARATOR) {
            return self.get(path);
        }
        search
            .iter()
            .find_map(|prefix| self.get(&join(prefix.as_ref(), path)))
            .or_else(|| self.get(path))
    }

    /// Every leaf in the tree with its absolute path, in path order.
    pub fn leaves(&self) -> Vec<(String, &Node)> {
        fn walk<'a>(group: &'a Group, prefix: &str, out: &mut Vec<(String, &'a Node)>) {
            for (name, node) in group.children() {
                let path = join(prefix, name);
                match node {
                    Node::Group(g) => walk(g, &path, out),
                    leaf => out.push((path, leaf)),
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.root, "", &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(id: &str) -> Node {
        Node::Command(id.to_string())
    }

    #[test]
    fn test_insert_creates_groups() {
        let mut ns = Namespace::new();
        ns.insert("text/grep", command("text/grep")).unwrap();

        assert!(matches!(ns.get("text"), Some(Node::Group(_))));
        assert_eq!(ns.get("text/grep"), Some(&command("text/grep")));
        assert_eq!(ns.get("/text/grep"), Some(&command("text/grep")));
        assert_eq!(ns.get("grep"), None);
        assert_eq!(ns.get(""), None);
    }

    #[test]
    fn test_insert_through_leaf_conflicts() {
        let mut ns = Namespace::new();
        ns.insert("echo", command("echo")).unwrap();
        assert_eq!(
            ns.insert("echo/inner", command("x")),
            Err(NamespaceError::Conflict("echo".to_string()))
        );

        ns.insert("text/wc", command("text/wc")).unwrap();
        assert_eq!(
            ns.insert("text", command("text")),
            Err(NamespaceError::Conflict("text".to_string()))
        );
        assert_eq!(ns.insert("/", command("x")), Err(NamespaceError::EmptyPath));
    }

    #[test]
    fn test_insert_replaces_leaf() {
        let mut ns = Namespace::new();
        ns.insert("ll", Node::Alias("ls".into())).unwrap();
        let old = ns.insert("ll", Node::Alias("ls -l".into())).unwrap();
        assert_eq!(old, Some(Node::Alias("ls".into())));
    }

    #[test]
    fn test_lookup_uses_search_path_before_root() {
        let mut ns = Namespace::new();
        ns.insert("text/wc", command("text/wc")).unwrap();
        ns.insert("wc", command("wc")).unwrap();
        ns.insert("cat", command("cat")).unwrap();

        assert_eq!(ns.lookup(&["text"], "wc"), Some(&command("text/wc")));
        assert_eq!(ns.lookup::<&str>(&[], "wc"), Some(&command("wc")));
        assert_eq!(ns.lookup(&["text"], "/wc"), Some(&command("wc")));
        assert_eq!(ns.lookup(&["text"], "cat"), Some(&command("cat")));
        assert_eq!(ns.lookup(&["text"], "nope"), None);
    }

    #[test]
    fn test_remove_and_leaves() {
        let mut ns = Namespace::new();
        ns.insert("text/grep", command("text/grep")).unwrap();
        ns.insert("echo", command("echo")).unwrap();
        ns.insert("say", Node::Alias("echo".into())).unwrap();

        let paths: Vec<String> = ns.leaves().into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["echo", "say", "text/grep"]);

        assert_eq!(ns.remove("say"), Some(Node::Alias("echo".into())));
        assert_eq!(ns.remove("say"), None);
        assert_eq!(ns.remove("text/grep/deeper"), None);
    }
}
