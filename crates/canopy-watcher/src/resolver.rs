//! Resolves requested roots to the path actually on disk.
//!
//! Native backends cannot follow a symlinked root and report paths in
//! the on-disk casing, so we subscribe to the real path and remember how
//! to map events back.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Where a requested root really lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// The canonical on-disk path.
    pub real_path: PathBuf,

    /// Whether `real_path` differs from what was requested.
    pub real_path_differs: bool,

    /// Byte length of `real_path`, used to rewrite event paths.
    pub real_path_len: usize,
}

impl ResolvedPath {
    /// The fallback when resolution fails: watch the literal path.
    pub fn literal(path: &Path) -> Self {
        Self {
            real_path: path.to_path_buf(),
            real_path_differs: false,
            real_path_len: path.as_os_str().len(),
        }
    }
}

/// Resolves symlinks first, then filesystem casing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl PathResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolves `requested`, falling back to the literal path on any error.
    pub fn resolve(&self, requested: &Path) -> ResolvedPath {
        let mut real = match self.real_path(requested) {
            Ok(real) => real,
            Err(_) => return ResolvedPath::literal(requested),
        };

        if real == requested {
            if let Some(cased) = real_case(requested) {
                real = cased;
            }
        }

        if real == requested {
            return ResolvedPath::literal(requested);
        }

        ResolvedPath {
            real_path_len: real.as_os_str().len(),
            real_path: real,
            real_path_differs: true,
        }
    }

    /// Follows symlinks, like `realpath(3)`.
    pub fn real_path(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }
}

/// Rebuilds `path` using the casing of the entries found on disk.
///
/// Returns `None` if any component cannot be found.
fn real_case(path: &Path) -> Option<PathBuf> {
    let mut resolved = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(name) => {
                let parent = if resolved.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    resolved.as_path()
                };
                let actual = find_entry(parent, name)?;
                resolved.push(actual);
            }
            other => resolved.push(other.as_os_str()),
        }
    }

    Some(resolved)
}

fn find_entry(parent: &Path, name: &OsStr) -> Option<std::ffi::OsString> {
    let mut folded = None;

    for entry in fs::read_dir(parent).ok()?.flatten() {
        let entry_name = entry.file_name();
        if entry_name == name {
            return Some(entry_name);
        }
        if folded.is_none() && eq_ignore_case(&entry_name, name) {
            folded = Some(entry_name);
        }
    }

    folded
}

fn eq_ignore_case(a: &OsStr, b: &OsStr) -> bool {
    match (a.to_str(), b.to_str()) {
        (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_plain_directory_resolves_to_itself() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();

        let resolved = PathResolver::new().resolve(&root);
        assert_eq!(resolved, ResolvedPath::literal(&root));
        assert!(!resolved.real_path_differs);
    }

    #[test]
    fn test_missing_path_falls_back_to_literal() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");

        let resolved = PathResolver::new().resolve(&missing);
        assert_eq!(resolved.real_path, missing);
        assert!(!resolved.real_path_differs);
        assert_eq!(resolved.real_path_len, missing.as_os_str().len());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_resolves_to_target() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let target = root.join("real");
        let link = root.join("link");
        fs::create_dir(&target).unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let resolved = PathResolver::new().resolve(&link);
        assert_eq!(resolved.real_path, target);
        assert!(resolved.real_path_differs);
        assert_eq!(resolved.real_path_len, target.as_os_str().len());
    }

    #[test]
    fn test_real_case_keeps_exact_names() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let nested = root.join("Mixed").join("Case");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(real_case(&nested), Some(nested));
    }

    #[test]
    fn test_find_entry_folds_case() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("Folder")).unwrap();

        let found = find_entry(dir.path(), OsStr::new("folder"));
        assert_eq!(found.as_deref(), Some(OsStr::new("Folder")));
        assert_eq!(find_entry(dir.path(), OsStr::new("other")), None);
    }
}
