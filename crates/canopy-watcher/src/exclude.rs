//! Compiles a request's excludes into a path predicate.
//!
//! Patterns use gitignore syntax through the `ignore` crate, rooted at
//! the directory the backend actually subscribed to.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};

/// An exclude pattern that failed to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPattern {
    pub pattern: String,
    pub reason: String,
}

/// The excludes of one watcher, ready to test paths against.
#[derive(Debug, Clone)]
pub struct CompiledIgnore {
    root: PathBuf,
    matcher: Option<Gitignore>,
}

impl CompiledIgnore {
    /// A predicate that ignores nothing.
    pub fn none(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            matcher: None,
        }
    }

    /// Compiles `patterns` relative to `root`.
    ///
    /// Absolute patterns that point under `root` or one of `aliases`
    /// are anchored to the root. Patterns that fail to compile are
    /// skipped and returned so the caller can report them.
    pub fn compile(
        root: &Path,
        aliases: &[&Path],
        patterns: &[String],
    ) -> (Self, Vec<InvalidPattern>) {
        if patterns.is_empty() {
            return (Self::none(root), Vec::new());
        }

        let mut builder = GitignoreBuilder::new(root);
        let mut invalid = Vec::new();

        for pattern in patterns {
            let line = anchor(pattern, root, aliases);
            if let Err(e) = builder.add_line(None, &line) {
                invalid.push(InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                });
            }
        }

        match builder.build() {
            Ok(matcher) => (
                Self {
                    root: root.to_path_buf(),
                    matcher: Some(matcher),
                },
                invalid,
            ),
            Err(e) => {
                invalid.push(InvalidPattern {
                    pattern: patterns.join(", "),
                    reason: e.to_string(),
                });
                (Self::none(root), invalid)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matcher.as_ref().map_or(true, |m| m.is_empty())
    }

    /// Whether `path`, or any folder between it and the root, is excluded.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let Some(matcher) = &self.matcher else {
            return false;
        };

        // Only paths under the root can match; the matcher asserts this.
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        if relative.as_os_str().is_empty() {
            return false;
        }

        matcher
            .matched_path_or_any_parents(relative, false)
            .is_ignore()
    }
}

fn anchor(pattern: &str, root: &Path, aliases: &[&Path]) -> String {
    let candidate = Path::new(pattern);
    if !candidate.is_absolute() {
        return pattern.to_string();
    }

    std::iter::once(root)
        .chain(aliases.iter().copied())
        .find_map(|base| candidate.strip_prefix(base).ok())
        .map(|rel| format!("/{}", rel.to_string_lossy().replace('\\', "/")))
        .unwrap_or_else(|| pattern.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(root: &str, patterns: &[&str]) -> CompiledIgnore {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        let (ignore, invalid) = CompiledIgnore::compile(Path::new(root), &[], &patterns);
        assert!(invalid.is_empty(), "unexpected invalid patterns: {:?}", invalid);
        ignore
    }

    #[test]
    fn test_globstar_folder() {
        let ignore = compile("/a", &["**/.git"]);
        assert!(ignore.is_ignored(Path::new("/a/.git/HEAD")));
        assert!(ignore.is_ignored(Path::new("/a/sub/.git/refs/main")));
        assert!(!ignore.is_ignored(Path::new("/a/src/main.rs")));
    }

    #[test]
    fn test_extension_pattern() {
        let ignore = compile("/a", &["*.log"]);
        assert!(ignore.is_ignored(Path::new("/a/deep/debug.log")));
        assert!(!ignore.is_ignored(Path::new("/a/deep/debug.txt")));
    }

    #[test]
    fn test_paths_outside_root_never_match() {
        let ignore = compile("/a", &["**/.git"]);
        assert!(!ignore.is_ignored(Path::new("/b/.git/HEAD")));
        assert!(!ignore.is_ignored(Path::new("/a")));
    }

    #[test]
    fn test_absolute_patterns_are_anchored() {
        let patterns = vec!["/link/build".to_string()];
        let (ignore, _) =
            CompiledIgnore::compile(Path::new("/real"), &[Path::new("/link")], &patterns);
        assert!(ignore.is_ignored(Path::new("/real/build/out.o")));
        assert!(!ignore.is_ignored(Path::new("/real/src/build/out.o")));
    }

    #[test]
    fn test_no_patterns() {
        let ignore = CompiledIgnore::none("/a");
        assert!(ignore.is_empty());
        assert!(!ignore.is_ignored(Path::new("/a/.git/HEAD")));
    }
}
