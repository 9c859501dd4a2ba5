//! Directory node discovery
//!
//! A scan needs the full list of authoritative nodes before it starts:
//! every node keeps its own un-replicated counters, so missing one means
//! missing data. The `NodeDirectory` trait abstracts where that list comes
//! from. Two sources ship with the tool: an in-memory list and a hosts
//! file with one node per line.

use crate::error::RunError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Identity of a single directory node
///
/// Node names are unique within a fleet and key the side store during
/// collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    /// Host name of the node
    pub name: String,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Source of the node list for a scan
///
/// Implementations return every authoritative node, or
/// `RunError::DirectoryUnavailable` when the source cannot be read at all.
/// An empty list is returned as-is; the coordinator treats it as fatal.
pub trait NodeDirectory: Send + Sync {
    /// List all nodes that must be queried
    fn list_nodes(&self) -> Result<Vec<Node>, RunError>;
}

/// Fixed in-memory node list
pub struct StaticDirectory {
    nodes: Vec<Node>,
}

impl StaticDirectory {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nodes: names.into_iter().map(Node::new).collect(),
        }
    }
}

impl NodeDirectory for StaticDirectory {
    fn list_nodes(&self) -> Result<Vec<Node>, RunError> {
        Ok(self.nodes.clone())
    }
}

/// Node list read from a hosts file
///
/// One node name per line. Blank lines and lines starting with `#` are
/// skipped.
pub struct FileDirectory {
    path: PathBuf,
}

impl FileDirectory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl NodeDirectory for FileDirectory {
    fn list_nodes(&self) -> Result<Vec<Node>, RunError> {
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            RunError::DirectoryUnavailable(format!(
                "failed to read node list {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let nodes = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(Node::new)
            .collect();

        Ok(nodes)
    }
}
