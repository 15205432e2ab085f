//! Merges changes to the same path within one batch.

use canopy_core::{ChangeKind, FileChange};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collapses a batch so each path appears at most once.
///
/// - added then deleted: both dropped
/// - deleted then added: updated
/// - added then updated: still added
/// - anything else: the later kind wins
///
/// Paths keep the position of their first surviving change.
pub fn coalesce_changes(changes: Vec<FileChange>) -> Vec<FileChange> {
    let mut slots: Vec<Option<FileChange>> = Vec::with_capacity(changes.len());
    let mut index: HashMap<PathBuf, usize> = HashMap::new();

    for change in changes {
        let Some(&slot) = index.get(&change.path) else {
            index.insert(change.path.clone(), slots.len());
            slots.push(Some(change));
            continue;
        };

        let Some(existing) = slots[slot].as_mut() else {
            continue;
        };

        match (existing.kind, change.kind) {
            (ChangeKind::Added, ChangeKind::Deleted) => {
                slots[slot] = None;
                index.remove(&change.path);
            }
            (ChangeKind::Deleted, ChangeKind::Added) => existing.kind = ChangeKind::Updated,
            (ChangeKind::Added, ChangeKind::Updated) => {}
            (_, kind) => existing.kind = kind,
        }
    }

    slots.into_iter().flatten().collect()
}
