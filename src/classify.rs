//! Change classification.
//!
//! Turns the ordered diff produced by [`crate::sync`] into the two sets the
//! pipeline acts on: paths whose artifacts must be removed and paths that
//! must be re-rendered and re-indexed. Only recognized source files
//! (`*.md`, case-insensitive) are considered.

use crate::models::{ChangeKind, ChangeRecord, ChangeSet};

/// Partitions change records into `deleted` and `changed_or_new`.
///
/// | kind   | effect                                        |
/// |--------|-----------------------------------------------|
/// | Delete | old path → deleted                            |
/// | Add    | new path → changed_or_new                     |
/// | Modify | new path → changed_or_new                     |
/// | Copy   | new path → changed_or_new                     |
/// | Rename | old path → deleted; new path → changed_or_new |
/// | Other  | ignored                                       |
///
/// A path can land in both sets (renamed away and re-created in the same
/// batch); the pipeline resolves that by applying every deletion before any
/// re-index, so the surviving state reflects the new paths only.
pub fn classify(changes: &[ChangeRecord]) -> ChangeSet {
    let mut set = ChangeSet::default();

    for change in changes {
        match change.kind {
            ChangeKind::Delete => {
                if let Some(old) = md_path(&change.old_path) {
                    set.deleted.insert(old);
                }
            }
            ChangeKind::Add | ChangeKind::Modify | ChangeKind::Copy => {
                if let Some(new) = md_path(&change.new_path) {
                    set.changed_or_new.insert(new);
                }
            }
            ChangeKind::Rename => {
                if let Some(old) = md_path(&change.old_path) {
                    set.deleted.insert(old);
                }
                if let Some(new) = md_path(&change.new_path) {
                    set.changed_or_new.insert(new);
                }
            }
            ChangeKind::Other => {}
        }
    }

    set
}

fn md_path(path: &Option<String>) -> Option<String> {
    path.as_ref()
        .filter(|p| p.to_lowercase().ends_with(".md"))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: ChangeKind, old: Option<&str>, new: Option<&str>) -> ChangeRecord {
        ChangeRecord {
            kind,
            old_path: old.map(str::to_string),
            new_path: new.map(str::to_string),
        }
    }

    #[test]
    fn test_add_and_modify_go_to_changed() {
        let set = classify(&[
            record(ChangeKind::Add, None, Some("2024/new.md")),
            record(ChangeKind::Modify, None, Some("2023/old.md")),
        ]);
        assert!(set.deleted.is_empty());
        assert_eq!(set.changed_or_new.len(), 2);
        assert!(set.changed_or_new.contains("2024/new.md"));
        assert!(set.changed_or_new.contains("2023/old.md"));
    }

    #[test]
    fn test_delete_goes_to_deleted() {
        let set = classify(&[record(ChangeKind::Delete, Some("2022/gone.md"), None)]);
        assert!(set.deleted.contains("2022/gone.md"));
        assert!(set.changed_or_new.is_empty());
    }

    #[test]
    fn test_rename_splits_old_and_new() {
        let set = classify(&[record(
            ChangeKind::Rename,
            Some("2020/a.md"),
            Some("2020/b.md"),
        )]);
        assert!(set.deleted.contains("2020/a.md"));
        assert!(set.changed_or_new.contains("2020/b.md"));
    }

    #[test]
    fn test_rename_then_modify_same_batch() {
        // The new path also shows up as modified; it must end in
        // changed_or_new only, with the old path in deleted.
        let set = classify(&[
            record(ChangeKind::Rename, Some("2020/a.md"), Some("2020/b.md")),
            record(ChangeKind::Modify, None, Some("2020/b.md")),
        ]);
        assert!(set.deleted.contains("2020/a.md"));
        assert!(!set.deleted.contains("2020/b.md"));
        assert!(set.changed_or_new.contains("2020/b.md"));
        assert_eq!(set.changed_or_new.len(), 1);
    }

    #[test]
    fn test_non_md_paths_ignored() {
        let set = classify(&[
            record(ChangeKind::Add, None, Some("assets/logo.png")),
            record(ChangeKind::Delete, Some("templates/page.html"), None),
            record(ChangeKind::Modify, None, Some("2024/post.MD")),
        ]);
        assert!(set.deleted.is_empty());
        // extension match is case-insensitive
        assert!(set.changed_or_new.contains("2024/post.MD"));
        assert_eq!(set.changed_or_new.len(), 1);
    }

    #[test]
    fn test_other_kind_ignored() {
        let set = classify(&[record(ChangeKind::Other, Some("2024/x.md"), Some("2024/y.md"))]);
        assert!(set.is_empty());
    }

    #[test]
    fn test_copy_goes_to_changed() {
        let set = classify(&[record(
            ChangeKind::Copy,
            Some("2024/src.md"),
            Some("2024/copy.md"),
        )]);
        assert!(set.deleted.is_empty());
        assert!(set.changed_or_new.contains("2024/copy.md"));
    }
}
