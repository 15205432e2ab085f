//! Normalized change events.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The canonical change taxonomy every backend is translated into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Updated,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Added => "added",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        };
        write!(f, "{}", s)
    }
}

/// A single change, expressed against the root the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Path of the changed file or folder.
    pub path: PathBuf,

    /// What happened to it.
    #[serde(rename = "changeKind")]
    pub kind: ChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

impl fmt::Display for FileChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let change = FileChange::new("/a/b.txt", ChangeKind::Deleted);
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["path"], "/a/b.txt");
        assert_eq!(json["changeKind"], "deleted");
    }

    #[test]
    fn test_display() {
        let change = FileChange::new("/a/b.txt", ChangeKind::Added);
        assert_eq!(change.to_string(), "[added] /a/b.txt");
    }
}
