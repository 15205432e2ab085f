//! Reduces a desired set of watch requests to the roots worth subscribing.
//!
//! Recursive watches already cover their subfolders, so a request nested
//! under another accepted request is redundant. The exception is a nested
//! path that is really a symlink: backends do not follow symlinks while
//! recursing, so it needs a subscription of its own.

use crate::resolver::PathResolver;
use canopy_core::WatchRequest;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Why a request was left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Already covered by the recursive watch on `parent`.
    Nested { parent: PathBuf },
    /// Nested under `parent` and its real path could not be resolved.
    Unresolvable { parent: PathBuf, reason: String },
    /// The excludes rule out every file.
    ExcludesEverything,
    /// The path is a file, not a folder.
    NotADirectory,
    /// The path could not be stat'ed.
    Missing { reason: String },
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Nested { parent } => {
                write!(f, "its parent '{}' is already watched", parent.display())
            }
            DropReason::Unresolvable { parent, reason } => write!(
                f,
                "its parent '{}' is already watched and its real path failed to resolve ({})",
                parent.display(),
                reason
            ),
            DropReason::ExcludesEverything => write!(f, "all of its files are excluded"),
            DropReason::NotADirectory => write!(f, "it is a file and not a folder"),
            DropReason::Missing { reason } => {
                write!(f, "its stat info failed to resolve ({})", reason)
            }
        }
    }
}

/// A request that did not make the cut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedRequest {
    pub path: PathBuf,
    pub reason: DropReason,
}

/// Output of [`RequestNormalizer::normalize`].
#[derive(Debug, Default)]
pub struct Normalized {
    pub accepted: Vec<WatchRequest>,
    pub dropped: Vec<DroppedRequest>,
}

/// Computes the minimal set of requests to subscribe to.
#[derive(Debug, Clone)]
pub struct RequestNormalizer {
    resolver: PathResolver,
    ignore_case: bool,
    validate_paths: bool,
}

impl RequestNormalizer {
    pub fn new(ignore_case: bool, validate_paths: bool) -> Self {
        Self {
            resolver: PathResolver::new(),
            ignore_case,
            validate_paths,
        }
    }

    /// Normalizes `requests`. The order of the result carries no meaning.
    pub fn normalize(&self, mut requests: Vec<WatchRequest>) -> Normalized {
        // Fewest components first so parents are accepted before their
        // children. `components` already skips interior `.` and `//`.
        requests.sort_by_key(|r| r.path.components().count());

        let mut trie = PathTrie::new(self.ignore_case);
        let mut accepted: Vec<WatchRequest> = Vec::new();
        let mut slots: HashMap<PathBuf, usize> = HashMap::new();
        let mut dropped = Vec::new();

        for request in requests {
            if let Some(reason) = self.drop_reason(&request, &trie) {
                dropped.push(DroppedRequest {
                    path: request.path,
                    reason,
                });
                continue;
            }

            // Same path again: the later request replaces the earlier one.
            let key = trie.key_path(&request.path);
            if let Some(&slot) = slots.get(&key) {
                accepted[slot] = request;
                continue;
            }

            trie.insert(&request.path);
            slots.insert(key, accepted.len());
            accepted.push(request);
        }

        Normalized { accepted, dropped }
    }

    fn drop_reason(&self, request: &WatchRequest, trie: &PathTrie) -> Option<DropReason> {
        if request.excludes_everything() {
            return Some(DropReason::ExcludesEverything);
        }

        if let Some(parent) = trie.find_ancestor(&request.path) {
            match self.resolver.real_path(&request.path) {
                Ok(real) if real == request.path => return Some(DropReason::Nested { parent }),
                Ok(_) => {}
                Err(e) => {
                    return Some(DropReason::Unresolvable {
                        parent,
                        reason: e.to_string(),
                    })
                }
            }
        }

        if self.validate_paths {
            match fs::metadata(&request.path) {
                Ok(meta) if !meta.is_dir() => return Some(DropReason::NotADirectory),
                Ok(_) => {}
                Err(e) => {
                    return Some(DropReason::Missing {
                        reason: e.to_string(),
                    })
                }
            }
        }

        None
    }
}

/// Prefix index over accepted paths, keyed by path component.
#[derive(Debug)]
struct PathTrie {
    root: TrieNode,
    ignore_case: bool,
}

#[derive(Debug, Default)]
struct TrieNode {
    /// The accepted path ending here, as it was requested.
    accepted: Option<PathBuf>,
    children: HashMap<OsString, TrieNode>,
}

impl PathTrie {
    fn new(ignore_case: bool) -> Self {
        Self {
            root: TrieNode::default(),
            ignore_case,
        }
    }

    fn key(&self, component: &OsStr) -> OsString {
        match component.to_str() {
            Some(s) if self.ignore_case => OsString::from(s.to_lowercase()),
            _ => component.to_os_string(),
        }
    }

    fn keys(&self, path: &Path) -> Vec<OsString> {
        path.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .map(|c| self.key(c.as_os_str()))
            .collect()
    }

    fn key_path(&self, path: &Path) -> PathBuf {
        self.keys(path).into_iter().collect()
    }

    fn insert(&mut self, path: &Path) {
        let keys = self.keys(path);
        let mut node = &mut self.root;
        for key in keys {
            node = node.children.entry(key).or_default();
        }
        node.accepted = Some(path.to_path_buf());
    }

    /// The closest accepted path that is a strict ancestor of `path`.
    fn find_ancestor(&self, path: &Path) -> Option<PathBuf> {
        let keys = self.keys(path);
        let mut node = &self.root;
        let mut found = None;

        for key in &keys {
            if let Some(accepted) = &node.accepted {
                found = Some(accepted);
            }
            match node.children.get(key) {
                Some(child) => node = child,
                None => break,
            }
        }

        found.cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn paths(normalized: &Normalized) -> Vec<PathBuf> {
        let mut paths: Vec<_> = normalized.accepted.iter().map(|r| r.path.clone()).collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_trie_is_component_wise() {
        let mut trie = PathTrie::new(false);
        trie.insert(Path::new("/root/app"));

        assert_eq!(
            trie.find_ancestor(Path::new("/root/app/src")),
            Some(PathBuf::from("/root/app"))
        );
        assert_eq!(trie.find_ancestor(Path::new("/root/application")), None);
        assert_eq!(trie.find_ancestor(Path::new("/root/app")), None);
        assert_eq!(trie.find_ancestor(Path::new("/root")), None);
    }

    #[test]
    fn test_trie_ignore_case() {
        let mut trie = PathTrie::new(true);
        trie.insert(Path::new("/Root/App"));
        assert_eq!(
            trie.find_ancestor(Path::new("/root/app/src")),
            Some(PathBuf::from("/Root/App"))
        );

        let mut trie = PathTrie::new(false);
        trie.insert(Path::new("/Root/App"));
        assert!(trie.find_ancestor(Path::new("/root/app/src")).is_none());
    }

    #[test]
    fn test_nested_request_dropped() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let child = root.join("child");
        fs::create_dir(&child).unwrap();

        let normalized = RequestNormalizer::new(false, true).normalize(vec![
            WatchRequest::new(&child),
            WatchRequest::new(&root),
        ]);

        assert_eq!(paths(&normalized), vec![root.clone()]);
        assert_eq!(
            normalized.dropped,
            vec![DroppedRequest {
                path: child,
                reason: DropReason::Nested { parent: root },
            }]
        );
    }

    #[test]
    fn test_sibling_prefix_is_not_nested() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let app = root.join("app");
        let application = root.join("application");
        fs::create_dir(&app).unwrap();
        fs::create_dir(&application).unwrap();

        let normalized = RequestNormalizer::new(false, true)
            .normalize(vec![WatchRequest::new(&app), WatchRequest::new(&application)]);

        assert_eq!(paths(&normalized), vec![app, application]);
    }

    #[cfg(unix)]
    #[test]
    fn test_nested_symlink_kept() {
        let dir = tempdir().unwrap();
        let base = fs::canonicalize(dir.path()).unwrap();
        let root = base.join("root");
        let other = base.join("other");
        fs::create_dir(&root).unwrap();
        fs::create_dir(&other).unwrap();
        let child = root.join("child");
        std::os::unix::fs::symlink(&other, &child).unwrap();

        let normalized = RequestNormalizer::new(false, true)
            .normalize(vec![WatchRequest::new(&root), WatchRequest::new(&child)]);

        assert_eq!(paths(&normalized), vec![root, child]);
        assert!(normalized.dropped.is_empty());
    }

    #[test]
    fn test_unresolvable_nested_request_dropped() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let ghost = root.join("ghost");

        let normalized = RequestNormalizer::new(false, false)
            .normalize(vec![WatchRequest::new(&root), WatchRequest::new(&ghost)]);

        assert_eq!(paths(&normalized), vec![root]);
        assert!(matches!(
            normalized.dropped[0].reason,
            DropReason::Unresolvable { .. }
        ));
    }

    #[test]
    fn test_same_path_later_request_wins() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();

        let normalized = RequestNormalizer::new(false, true).normalize(vec![
            WatchRequest::new(&root).with_excludes(["a"]),
            WatchRequest::new(&root).with_excludes(["b"]),
        ]);

        assert_eq!(normalized.accepted.len(), 1);
        assert_eq!(normalized.accepted[0].excludes, vec!["b".to_string()]);
        assert!(normalized.dropped.is_empty());
    }

    #[test]
    fn test_excludes_everything_dropped() {
        let dir = tempdir().unwrap();
        let normalized = RequestNormalizer::new(false, true)
            .normalize(vec![WatchRequest::new(dir.path()).with_excludes(["**"])]);

        assert!(normalized.accepted.is_empty());
        assert_eq!(normalized.dropped[0].reason, DropReason::ExcludesEverything);
    }

    #[test]
    fn test_validation() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "hello").unwrap();
        let missing = dir.path().join("missing");

        let normalized = RequestNormalizer::new(false, true)
            .normalize(vec![WatchRequest::new(&file), WatchRequest::new(&missing)]);
        assert!(normalized.accepted.is_empty());
        assert_eq!(normalized.dropped.len(), 2);

        let normalized =
            RequestNormalizer::new(false, false).normalize(vec![WatchRequest::new(&missing)]);
        assert_eq!(normalized.accepted.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_siblings_kept_apart() {
        use std::os::unix::ffi::OsStrExt;

        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let first = root.join(OsStr::from_bytes(b"\xff"));
        let second = root.join(OsStr::from_bytes(b"\xfe"));
        let nested = first.join("src");
        fs::create_dir(&first).unwrap();
        fs::create_dir(&second).unwrap();
        fs::create_dir(&nested).unwrap();

        for ignore_case in [false, true] {
            let normalized = RequestNormalizer::new(ignore_case, true).normalize(vec![
                WatchRequest::new(&first),
                WatchRequest::new(&second),
                WatchRequest::new(&nested),
            ]);

            let mut expected = vec![first.clone(), second.clone()];
            expected.sort();
            assert_eq!(paths(&normalized), expected);
            assert_eq!(
                normalized.dropped,
                vec![DroppedRequest {
                    path: nested.clone(),
                    reason: DropReason::Nested {
                        parent: first.clone()
                    },
                }]
            );
        }
    }

    #[test]
    fn test_dot_components_do_not_reorder_parents() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let child = root.join("child");
        fs::create_dir(&child).unwrap();
        let dotted = PathBuf::from(format!("{}/./././", root.display()));

        let normalized = RequestNormalizer::new(false, true)
            .normalize(vec![WatchRequest::new(&child), WatchRequest::new(&dotted)]);

        assert_eq!(normalized.accepted.len(), 1);
        assert_eq!(normalized.accepted[0].path.as_os_str(), dotted.as_os_str());
        assert_eq!(normalized.dropped.len(), 1);
        assert_eq!(normalized.dropped[0].path, child);
    }

    #[test]
    fn test_nested_notice_names_requested_parent() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let child = root.join("child");
        fs::create_dir(&child).unwrap();
        let upper = PathBuf::from(root.to_string_lossy().to_uppercase());
        let lower_child = PathBuf::from(child.to_string_lossy().to_lowercase());

        let mut trie = PathTrie::new(true);
        trie.insert(&upper);
        assert_eq!(trie.find_ancestor(&lower_child), Some(upper));
    }
}
