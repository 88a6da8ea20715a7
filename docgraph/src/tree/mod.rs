//! The source tree: an arena of nodes built from one collection's file listing.
//!
//! Nodes own their children through the arena; parent links are plain indices
//! used for upward lookups. A [`Source`] is a cheap handle pairing the tree
//! snapshot with a node id, so callers keep a consistent view even after the
//! collection swaps in a rebuilt tree.

pub mod builder;

use crate::normalize::title_case;
use crate::resolver::ExportCache;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub use builder::build;

/// Whether a node is backed by a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    File,
    Directory,
}

/// Dotted-decimal position of a node in the whole tree.
///
/// A child's order extends its parent's (`3` -> `3.1`, `3.2`), and tuples
/// compare numerically component by component, so sorting every node by
/// order reproduces depth-first tree order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Order(Vec<u32>);

impl Order {
    pub fn root() -> Self {
        Order(Vec::new())
    }

    pub fn child(&self, local: u32) -> Self {
        let mut components = self.0.clone();
        components.push(local);
        Order(components)
    }

    pub fn components(&self) -> &[u32] {
        &self.0
    }

    /// Position among siblings (the last component).
    pub fn local(&self) -> Option<u32> {
        self.0.last().copied()
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "0");
        }
        let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl Serialize for Order {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Index of a node inside its [`SourceTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone)]
pub struct SourceNode {
    pub raw_name: String,
    pub segment: String,
    pub path: Vec<String>,
    pub order: Order,
    pub depth: usize,
    pub kind: SourceKind,
    pub is_index: bool,
    pub extension: Option<String>,
    pub file_path: PathBuf,
    pub modified_at: Option<DateTime<Utc>>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

type CacheSlot = Arc<Mutex<Arc<ExportCache>>>;

/// An immutable snapshot of a collection's tree.
///
/// Only the per-node export caches change after construction, and those are
/// replaced wholesale, never edited in place. A cache slot is shared with
/// every later snapshot that adopted it, so resetting it through any
/// generation is seen by handles into all of them.
pub struct SourceTree {
    nodes: Vec<SourceNode>,
    by_path: HashMap<String, NodeId>,
    by_file: HashMap<PathBuf, NodeId>,
    /// Every non-root node, sorted by order.
    sorted: Vec<NodeId>,
    caches: Vec<CacheSlot>,
    base_pathname: Vec<String>,
    generation: u64,
}

impl SourceTree {
    pub(crate) fn new(nodes: Vec<SourceNode>, base_pathname: Option<&str>, generation: u64) -> Self {
        let mut by_path = HashMap::with_capacity(nodes.len());
        let mut by_file = HashMap::with_capacity(nodes.len());
        for (index, node) in nodes.iter().enumerate() {
            by_path.insert(node.path.join("/"), NodeId(index));
            by_file.insert(node.file_path.clone(), NodeId(index));
        }

        let mut sorted: Vec<NodeId> = (0..nodes.len())
            .map(NodeId)
            .filter(|id| nodes[id.0].parent.is_some())
            .collect();
        sorted.sort_by(|a, b| nodes[a.0].order.cmp(&nodes[b.0].order));

        let caches = nodes
            .iter()
            .map(|_| Arc::new(Mutex::new(Arc::new(ExportCache::default()))))
            .collect();

        SourceTree {
            nodes,
            by_path,
            by_file,
            sorted,
            caches,
            base_pathname: split_path(base_pathname.unwrap_or_default()),
            generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> &SourceNode {
        &self.nodes[id.0]
    }

    pub fn root(self: &Arc<Self>) -> Source {
        Source {
            tree: Arc::clone(self),
            id: NodeId(0),
        }
    }

    /// Look up a node by its normalized path. Leading and trailing slashes are
    /// ignored, and a leading base pathname is accepted.
    pub fn find(self: &Arc<Self>, path: &str) -> Option<Source> {
        let segments = split_path(path);
        let id = self.by_path.get(&segments.join("/")).copied().or_else(|| {
            let stripped = segments.strip_prefix(self.base_pathname.as_slice())?;
            if self.base_pathname.is_empty() {
                return None;
            }
            self.by_path.get(&stripped.join("/")).copied()
        })?;
        Some(Source {
            tree: Arc::clone(self),
            id,
        })
    }

    /// Look up a node by the filesystem path that backs it.
    pub fn find_file(self: &Arc<Self>, file_path: &Path) -> Option<Source> {
        let id = *self.by_file.get(file_path)?;
        Some(Source {
            tree: Arc::clone(self),
            id,
        })
    }

    /// All descendants of the root in order, or only those at exactly
    /// `depth` levels below the root.
    pub fn sources(self: &Arc<Self>, depth: Option<usize>) -> Vec<Source> {
        self.sorted
            .iter()
            .filter(|id| depth.map_or(true, |d| self.nodes[id.0].depth == d))
            .map(|&id| Source {
                tree: Arc::clone(self),
                id,
            })
            .collect()
    }

    pub(crate) fn export_cache(&self, id: NodeId) -> Arc<ExportCache> {
        let slot = self.caches[id.0].lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&slot)
    }

    /// Swap in empty export caches for every node whose backing path lies
    /// under `scope`. Returns how many nodes were reset.
    pub(crate) fn reset_caches_under(&self, scope: &Path) -> usize {
        let mut reset = 0;
        for (index, node) in self.nodes.iter().enumerate() {
            if node.file_path.starts_with(scope) {
                let mut slot = self.caches[index]
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                *slot = Arc::new(ExportCache::default());
                reset += 1;
            }
        }
        reset
    }

    /// Share the previous snapshot's cache slot with every node backed by the
    /// same file, except those under a dropped scope.
    pub(crate) fn adopt_caches(&mut self, previous: &SourceTree, dropped: &[PathBuf]) -> usize {
        let mut adopted = 0;
        for (index, node) in self.nodes.iter().enumerate() {
            if dropped.iter().any(|scope| node.file_path.starts_with(scope)) {
                continue;
            }
            if let Some(prev_id) = previous.by_file.get(&node.file_path) {
                if previous.nodes[prev_id.0].kind != node.kind {
                    continue;
                }
                self.caches[index] = Arc::clone(&previous.caches[prev_id.0]);
                adopted += 1;
            }
        }
        adopted
    }

    fn pathname(&self, id: NodeId) -> String {
        let segments: Vec<&str> = self
            .base_pathname
            .iter()
            .chain(self.nodes[id.0].path.iter())
            .map(String::as_str)
            .collect();
        format!("/{}", segments.join("/"))
    }
}

impl fmt::Debug for SourceTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceTree")
            .field("nodes", &self.nodes.len())
            .field("generation", &self.generation)
            .finish()
    }
}

/// A handle to one node of a tree snapshot.
#[derive(Clone)]
pub struct Source {
    tree: Arc<SourceTree>,
    id: NodeId,
}

impl Source {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &Arc<SourceTree> {
        &self.tree
    }

    pub fn node(&self) -> &SourceNode {
        self.tree.node(self.id)
    }

    pub fn raw_name(&self) -> &str {
        &self.node().raw_name
    }

    pub fn segment(&self) -> &str {
        &self.node().segment
    }

    pub fn path(&self) -> &[String] {
        &self.node().path
    }

    /// The normalized path joined with `/` (empty for the root).
    pub fn path_string(&self) -> String {
        self.node().path.join("/")
    }

    /// URL pathname, including the collection's base pathname.
    pub fn pathname(&self) -> String {
        self.tree.pathname(self.id)
    }

    pub fn title(&self) -> String {
        title_case(self.segment())
    }

    pub fn order(&self) -> &Order {
        &self.node().order
    }

    pub fn depth(&self) -> usize {
        self.node().depth
    }

    pub fn kind(&self) -> SourceKind {
        self.node().kind
    }

    pub fn is_file(&self) -> bool {
        self.kind() == SourceKind::File
    }

    pub fn is_index(&self) -> bool {
        self.node().is_index
    }

    pub fn extension(&self) -> Option<&str> {
        self.node().extension.as_deref()
    }

    pub fn file_path(&self) -> &Path {
        &self.node().file_path
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.node().modified_at
    }

    pub fn parent(&self) -> Option<Source> {
        self.node().parent.map(|id| self.with_id(id))
    }

    pub fn children(&self) -> Vec<Source> {
        self.node()
            .children
            .iter()
            .map(|&id| self.with_id(id))
            .collect()
    }

    /// Ancestors from the parent up to (and including) the root.
    pub fn ancestors(&self) -> Vec<Source> {
        let mut ancestors = Vec::new();
        let mut current = self.parent();
        while let Some(source) = current {
            current = source.parent();
            ancestors.push(source);
        }
        ancestors
    }

    /// The designated index file of a directory (`index.*` or `readme.*`).
    pub fn index_file(&self) -> Option<Source> {
        if self.kind() != SourceKind::Directory {
            return None;
        }
        self.node()
            .children
            .iter()
            .find(|&&id| {
                let child = self.tree.node(id);
                child.is_index && child.kind == SourceKind::File
            })
            .map(|&id| self.with_id(id))
    }

    /// Previous and next node among the parent's ordered children.
    pub fn siblings(&self) -> (Option<Source>, Option<Source>) {
        let Some(parent) = self.node().parent else {
            return (None, None);
        };
        let children = &self.tree.node(parent).children;
        neighbors(children, self.id, |id| self.with_id(id))
    }

    /// Previous and next file in whole-tree reading order, crossing directory
    /// boundaries.
    pub fn reading_siblings(&self) -> (Option<Source>, Option<Source>) {
        let files: Vec<NodeId> = self
            .tree
            .sorted
            .iter()
            .copied()
            .filter(|&id| self.tree.node(id).kind == SourceKind::File)
            .collect();
        neighbors(&files, self.id, |id| self.with_id(id))
    }

    pub(crate) fn export_cache(&self) -> Arc<ExportCache> {
        self.tree.export_cache(self.id)
    }

    fn with_id(&self, id: NodeId) -> Source {
        Source {
            tree: Arc::clone(&self.tree),
            id,
        }
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tree, &other.tree) && self.id == other.id
    }
}

impl Eq for Source {}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("path", &self.path_string())
            .field("order", &self.order().to_string())
            .field("kind", &self.kind())
            .finish()
    }
}

fn neighbors(
    ids: &[NodeId],
    target: NodeId,
    to_source: impl Fn(NodeId) -> Source,
) -> (Option<Source>, Option<Source>) {
    let Some(position) = ids.iter().position(|&id| id == target) else {
        return (None, None);
    };
    let previous = position
        .checked_sub(1)
        .and_then(|p| ids.get(p))
        .map(|&id| to_source(id));
    let next = ids.get(position + 1).map(|&id| to_source(id));
    (previous, next)
}

fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
