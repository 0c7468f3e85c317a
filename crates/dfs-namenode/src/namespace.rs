//! In-memory namespace tree.
//!
//! Nodes live in an arena owned by [`NamespaceTree`] and refer to each other
//! by [`NodeId`]. A directory owns its children through its name map; the
//! parent link is a plain index. Slot 0 is always the root directory "/".
//!
//! Path resolution binds each segment only to the direct children of the node
//! resolved for the previous segment.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::types::{NamespaceError, NodeId};

/// Path separator.
pub const SEPARATOR: char = '/';

/// Splits a path into its non-blank segments.
///
/// Leading, trailing, and repeated separators are ignored, as are segments
/// consisting only of whitespace. Other segments are kept verbatim.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split(SEPARATOR)
        .filter(|segment| !segment.trim().is_empty())
        .collect()
}

fn join_segments(segments: &[&str]) -> String {
    let mut path = String::new();
    for segment in segments {
        path.push(SEPARATOR);
        path.push_str(segment);
    }
    if path.is_empty() {
        path.push(SEPARATOR);
    }
    path
}

/// The kind of a namespace node, with its kind-specific data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum INodeKind {
    /// A directory and its children, keyed by name.
    Directory {
        /// Direct children
        children: BTreeMap<String, NodeId>,
    },
    /// A file leaf.
    File,
}

/// A node in the namespace tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct INode {
    name: String,
    parent: Option<NodeId>,
    kind: INodeKind,
}

impl INode {
    fn directory(name: &str, parent: Option<NodeId>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            kind: INodeKind::Directory {
                children: BTreeMap::new(),
            },
        }
    }

    fn file(name: &str, parent: NodeId) -> Self {
        Self {
            name: name.to_string(),
            parent: Some(parent),
            kind: INodeKind::File,
        }
    }

    /// Name of this node ("/" for the root)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent directory, `None` for the root
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Kind-specific data
    pub fn kind(&self) -> &INodeKind {
        &self.kind
    }

    /// True for directories
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, INodeKind::Directory { .. })
    }
}

/// Result of materializing a path.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CreatePathOutcome {
    /// Node for the last segment (the root for an empty path)
    pub node: NodeId,
    /// Number of directories created by this call
    pub created: usize,
}

/// Arena-backed directory hierarchy rooted at "/".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceTree {
    nodes: Vec<INode>,
}

impl Default for NamespaceTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceTree {
    /// Creates a tree holding only the root directory.
    pub fn new() -> Self {
        Self {
            nodes: vec![INode::directory("/", None)],
        }
    }

    /// Returns the node with the given id.
    pub fn node(&self, id: NodeId) -> Option<&INode> {
        self.nodes.get(id.index())
    }

    /// Total number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Looks up `name` among the direct children of `dir`.
    pub fn child(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        match &self.node(dir)?.kind {
            INodeKind::Directory { children } => children.get(name).copied(),
            INodeKind::File => None,
        }
    }

    fn attach(&mut self, parent: NodeId, node: INode) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        let name = node.name.clone();
        self.nodes.push(node);
        if let Some(INode {
            kind: INodeKind::Directory { children },
            ..
        }) = self.nodes.get_mut(parent.index())
        {
            children.insert(name, id);
        }
        id
    }

    /// Walks `segments` from the root, creating missing directories.
    fn materialize(&mut self, segments: &[&str]) -> Result<CreatePathOutcome, NamespaceError> {
        let mut current = NodeId::ROOT;
        let mut created = 0;

        for (depth, segment) in segments.iter().enumerate() {
            current = match self.child(current, segment) {
                Some(existing) => {
                    let is_dir = self.node(existing).is_some_and(INode::is_directory);
                    if !is_dir {
                        return Err(NamespaceError::NotADirectory {
                            path: join_segments(&segments[..=depth]),
                        });
                    }
                    existing
                }
                None => {
                    created += 1;
                    self.attach(current, INode::directory(segment, Some(current)))
                }
            };
        }

        Ok(CreatePathOutcome {
            node: current,
            created,
        })
    }

    /// Materializes every directory along `path` ("mkdir -p").
    ///
    /// Existing directories are reused, so repeating a call changes nothing.
    /// A blank path resolves to the root.
    pub fn create_path(&mut self, path: &str) -> Result<CreatePathOutcome, NamespaceError> {
        self.materialize(&split_path(path))
    }

    /// Creates a file at `path`, materializing its parent directories.
    pub fn create_file(&mut self, path: &str) -> Result<NodeId, NamespaceError> {
        let segments = split_path(path);
        let Some((name, parents)) = segments.split_last() else {
            return Err(NamespaceError::InvalidPath(path.to_string()));
        };

        let parent = self.materialize(parents)?.node;
        if self.child(parent, name).is_some() {
            return Err(NamespaceError::EntryExists {
                path: join_segments(&segments),
            });
        }
        Ok(self.attach(parent, INode::file(name, parent)))
    }

    /// Resolves `path` to a node, if every segment exists.
    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        split_path(path)
            .into_iter()
            .try_fold(NodeId::ROOT, |current, segment| self.child(current, segment))
    }

    /// Names of the direct children of the directory at `path`, sorted.
    pub fn list(&self, path: &str) -> Result<Vec<String>, NamespaceError> {
        let id = self.lookup(path).ok_or_else(|| NamespaceError::NotFound {
            path: path.to_string(),
        })?;
        match self.node(id).map(INode::kind) {
            Some(INodeKind::Directory { children }) => Ok(children.keys().cloned().collect()),
            _ => Err(NamespaceError::NotADirectory {
                path: path.to_string(),
            }),
        }
    }

    /// Absolute path of the node with the given id.
    pub fn path_of(&self, id: NodeId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = self.node(id)?;
        while let Some(parent) = current.parent {
            names.push(current.name.as_str());
            current = self.node(parent)?;
        }
        names.reverse();
        Some(join_segments(&names))
    }

    /// Absolute paths of every node, sorted. The root appears as "/".
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = (0..self.nodes.len())
            .filter_map(|i| self.path_of(NodeId::new(i)))
            .collect();
        paths.sort();
        paths
    }
}

/// Thread-safe owner of the namespace tree.
///
/// Every mutation holds the write lock for its whole path walk.
#[derive(Default)]
pub struct FsDirectory {
    tree: RwLock<NamespaceTree>,
}

impl FsDirectory {
    /// Creates a directory service with an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Materializes every directory along `path`.
    pub fn create_path(&self, path: &str) -> Result<CreatePathOutcome, NamespaceError> {
        let outcome = self.tree.write().create_path(path)?;
        if outcome.created > 0 {
            tracing::debug!(path, created = outcome.created, "created directories");
        }
        Ok(outcome)
    }

    /// Creates a file at `path`.
    pub fn create_file(&self, path: &str) -> Result<NodeId, NamespaceError> {
        let id = self.tree.write().create_file(path)?;
        tracing::debug!(path, node = %id, "created file");
        Ok(id)
    }

    /// True if a node exists at `path`.
    pub fn exists(&self, path: &str) -> bool {
        self.tree.read().lookup(path).is_some()
    }

    /// True if the node at `path` is a directory.
    pub fn is_directory(&self, path: &str) -> bool {
        let tree = self.tree.read();
        tree.lookup(path)
            .and_then(|id| tree.node(id))
            .is_some_and(INode::is_directory)
    }

    /// Names of the direct children of the directory at `path`.
    pub fn list(&self, path: &str) -> Result<Vec<String>, NamespaceError> {
        self.tree.read().list(path)
    }

    /// Total number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.tree.read().node_count()
    }

    /// Copy of the current tree.
    pub fn snapshot(&self) -> NamespaceTree {
        self.tree.read().clone()
    }
}
