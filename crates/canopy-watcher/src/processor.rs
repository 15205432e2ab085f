//! Turns raw backend batches into normalized changes for one watcher.

use crate::backend::{RawChangeKind, RawEvent};
use crate::exclude::CompiledIgnore;
use crate::resolver::ResolvedPath;
use canopy_core::{ChangeKind, FileChange, WatchRequest};
use std::path::{Path, PathBuf};
use unicode_normalization::{is_nfc, UnicodeNormalization};

/// Maps a backend change kind onto the canonical taxonomy.
pub fn translate(kind: RawChangeKind) -> ChangeKind {
    match kind {
        RawChangeKind::Create => ChangeKind::Added,
        RawChangeKind::Update => ChangeKind::Updated,
        RawChangeKind::Delete => ChangeKind::Deleted,
    }
}

/// Per-watcher event pipeline.
///
/// Raw events are filtered and accumulated as they arrive; path
/// rewriting happens once, when the accumulated batch is flushed.
/// Nothing leaves the processor except through [`EventProcessor::flush`].
#[derive(Debug)]
pub struct EventProcessor {
    requested: PathBuf,
    resolved: ResolvedPath,
    ignore: CompiledIgnore,
    normalize_unicode: bool,
    pending: Vec<FileChange>,
    carried: Vec<FileChange>,
}

impl EventProcessor {
    pub fn new(
        request: &WatchRequest,
        resolved: ResolvedPath,
        ignore: CompiledIgnore,
        normalize_unicode: bool,
    ) -> Self {
        Self {
            requested: request.path.clone(),
            resolved,
            ignore,
            normalize_unicode,
            pending: Vec::new(),
            carried: Vec::new(),
        }
    }

    /// Filters `events` against the excludes and adds the rest to the
    /// accumulator. Returns how many were kept.
    pub fn accumulate(&mut self, events: Vec<RawEvent>) -> usize {
        let before = self.pending.len();
        for event in events {
            if self.ignore.is_ignored(&event.path) {
                continue;
            }
            self.pending.push(FileChange::new(event.path, translate(event.kind)));
        }
        self.pending.len() - before
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || !self.carried.is_empty()
    }

    /// Takes over already-normalized changes from a watcher this one
    /// replaces. They lead the next flush.
    pub fn carry_over(&mut self, changes: Vec<FileChange>) {
        self.carried.extend(changes);
    }

    /// Drains everything accumulated, rewritten against the requested root.
    pub fn flush(&mut self) -> Vec<FileChange> {
        let mut batch = std::mem::take(&mut self.carried);
        batch.reserve(self.pending.len());

        for change in std::mem::take(&mut self.pending) {
            let path = self.normalize_path(change.path);
            batch.push(FileChange::new(path, change.kind));
        }

        batch
    }

    fn normalize_path(&self, path: PathBuf) -> PathBuf {
        let path = if self.resolved.real_path_differs {
            self.rewrite(path)
        } else {
            path
        };

        if self.normalize_unicode {
            to_nfc(path)
        } else {
            path
        }
    }

    /// Replaces the real-path prefix with the requested path. Runs before
    /// NFC so the prefix still matches the real path as resolved.
    fn rewrite(&self, path: PathBuf) -> PathBuf {
        let real = &self.resolved.real_path;
        if let Ok(rest) = path.strip_prefix(real) {
            return join(&self.requested, rest);
        }

        // Some backends hand out composed names even when the disk
        // stores them decomposed.
        if self.normalize_unicode {
            if let Ok(rest) = path.strip_prefix(to_nfc(real.clone())) {
                return join(&self.requested, rest);
            }
        }

        // Same length, different bytes (case). Only cut at a separator.
        let len = self.resolved.real_path_len;
        match path.to_str() {
            Some(s) if s.is_char_boundary(len) && s.len() >= len => {
                let rest = &s[len..];
                if rest.is_empty() {
                    self.requested.clone()
                } else if rest.starts_with(std::path::MAIN_SEPARATOR) {
                    join(&self.requested, Path::new(&rest[1..]))
                } else {
                    path
                }
            }
            _ => path,
        }
    }
}

fn join(base: &Path, rest: &Path) -> PathBuf {
    if rest.as_os_str().is_empty() {
        base.to_path_buf()
    } else {
        base.join(rest)
    }
}

fn to_nfc(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) if !is_nfc(s) => PathBuf::from(s.nfc().collect::<String>()),
        _ => path,
    }
}
