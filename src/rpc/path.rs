//! Dot-delimited capability paths and the nested tree they address.
//!
//! ```text
//!   "nested.bar"  ──split──▶  ["nested", "bar"]
//!
//!   CapabilityTree
//!   ├─ foo          (leaf)
//!   ├─ add          (leaf)
//!   └─ nested       (subtree)
//!      └─ bar       (leaf)
//! ```
//!
//! Paths compare by exact string equality. A path resolves only when every
//! segment exists and the last one is a leaf.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Path separator.
pub const SEPARATOR: char = '.';

/// Append `name` to `prefix`, skipping the separator for an empty prefix.
pub fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else if name.is_empty() {
        prefix.to_owned()
    } else {
        format!("{prefix}{SEPARATOR}{name}")
    }
}

/// Iterate the segments of `path`.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR)
}

/// One node of a capability tree.
pub enum Node<T> {
    Leaf(T),
    Branch(CapabilityTree<T>),
}

/// Nested mapping from names to leaves or further subtrees.
pub struct CapabilityTree<T> {
    children: BTreeMap<String, Node<T>>,
}

impl<T> Default for CapabilityTree<T> {
    fn default() -> Self {
        Self {
            children: BTreeMap::new(),
        }
    }
}

impl<T> CapabilityTree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Insert `leaf` at `path`, creating intermediate subtrees.
    ///
    /// Fails when a prefix of `path` is already a leaf, when `path` itself
    /// already names a subtree, or when any segment is empty.
    pub fn insert(&mut self, path: &str, leaf: T) -> Result<()> {
        let parts: Vec<&str> = segments(path).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(Error::PathConflict(path.to_owned()));
        }
        let (last, parents) = parts
            .split_last()
            .ok_or_else(|| Error::PathConflict(path.to_owned()))?;

        let mut tree = self;
        for part in parents {
            let node = tree
                .children
                .entry((*part).to_owned())
                .or_insert_with(|| Node::Branch(CapabilityTree::new()));
            tree = match node {
                Node::Branch(sub) => sub,
                Node::Leaf(_) => return Err(Error::PathConflict(path.to_owned())),
            };
        }

        if matches!(tree.children.get(*last), Some(Node::Branch(_))) {
            return Err(Error::PathConflict(path.to_owned()));
        }
        tree.children.insert((*last).to_owned(), Node::Leaf(leaf));
        Ok(())
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, path: &str, leaf: T) -> Result<Self> {
        self.insert(path, leaf)?;
        Ok(self)
    }

    /// Mount `subtree` under `name`, replacing nothing.
    pub fn nest(&mut self, name: &str, subtree: CapabilityTree<T>) -> Result<()> {
        if name.is_empty() || name.contains(SEPARATOR) || self.children.contains_key(name) {
            return Err(Error::PathConflict(name.to_owned()));
        }
        self.children
            .insert(name.to_owned(), Node::Branch(subtree));
        Ok(())
    }

    /// Walk `path`; `None` if a segment is missing, not traversable, or the
    /// final node is a subtree.
    pub fn resolve(&self, path: &str) -> Option<&T> {
        let mut node: Option<&Node<T>> = None;
        let mut tree = Some(self);
        for part in segments(path) {
            let current = tree?;
            let next = current.children.get(part)?;
            tree = match next {
                Node::Branch(sub) => Some(sub),
                Node::Leaf(_) => None,
            };
            node = Some(next);
        }
        match node? {
            Node::Leaf(leaf) => Some(leaf),
            Node::Branch(_) => None,
        }
    }

    /// Every leaf path, depth first, in name order.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_paths("", &mut out);
        out
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        for (name, node) in &self.children {
            let path = join(prefix, name);
            match node {
                Node::Leaf(_) => out.push(path),
                Node::Branch(sub) => sub.collect_paths(&path, out),
            }
        }
    }
}

impl<T> core::fmt::Debug for CapabilityTree<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.paths()).finish()
    }
}
