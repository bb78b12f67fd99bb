//! Moving watches along with a renamed directory tree.

use sift_core::WatchPath;
use std::collections::BTreeSet;
use tracing::debug;

use crate::backend::NativeBackend;
use crate::registry::MonitorRegistry;

/// Where each watched descendant of `old_root` lands under `new_root`.
///
/// Only strict descendants are returned, deduplicated and sorted.
pub fn relocation_targets<'a>(
    watched: impl IntoIterator<Item = &'a WatchPath>,
    old_root: &WatchPath,
    new_root: &WatchPath,
) -> Vec<WatchPath> {
    watched
        .into_iter()
        .filter(|path| path.is_descendant_of(old_root))
        .filter_map(|path| path.rebase(old_root, new_root))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Re-point the watches of a moved directory tree.
///
/// All new watches are added before any old one is removed, since a
/// backend may recycle subscription identifiers on removal. Adds can be
/// refused at the watch ceiling like any other add.
///
/// Returns whether at least one descendant was relocated.
pub fn relocate<B: NativeBackend>(
    registry: &mut MonitorRegistry<B>,
    old_root: &WatchPath,
    new_root: &WatchPath,
) -> bool {
    if old_root == new_root {
        return false;
    }

    let targets = relocation_targets(registry.paths(), old_root, new_root);

    registry.add(new_root);
    for target in &targets {
        registry.add(target);
    }
    registry.remove_recursive(old_root);

    debug!(
        "Moved monitors from '{old_root}' to '{new_root}', {} descendants relocated",
        targets.len()
    );
    !targets.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use std::path::PathBuf;

    fn wp(path: &str) -> WatchPath {
        WatchPath::new(path).unwrap()
    }

    #[test]
    fn test_relocation_targets() {
        let watched = [wp("/a"), wp("/a/x"), wp("/a/x/y"), wp("/ab/z"), wp("/other")];
        let targets = relocation_targets(&watched, &wp("/a"), &wp("/b"));
        assert_eq!(targets, vec![wp("/b/x"), wp("/b/x/y")]);
    }

    #[test]
    fn test_relocate_moves_whole_tree() {
        let backend = MemoryBackend::default();
        let mut registry = MonitorRegistry::new(backend.clone(), 100, true);
        for path in ["/data/a", "/data/a/x", "/data/a/x/y", "/data/ab"] {
            registry.add(&wp(path));
        }

        assert!(relocate(&mut registry, &wp("/data/a"), &wp("/data/b")));

        let mut watched: Vec<String> = registry.paths().map(ToString::to_string).collect();
        watched.sort();
        assert_eq!(watched, vec!["/data/ab", "/data/b", "/data/b/x", "/data/b/x/y"]);
        assert_eq!(
            backend.active_paths(),
            vec![
                PathBuf::from("/data/ab"),
                PathBuf::from("/data/b"),
                PathBuf::from("/data/b/x"),
                PathBuf::from("/data/b/x/y"),
            ]
        );
    }

    #[test]
    fn test_relocate_adds_before_removing() {
        let backend = MemoryBackend::default();
        let mut registry = MonitorRegistry::new(backend.clone(), 100, true);
        registry.add(&wp("/a"));
        registry.add(&wp("/a/x"));

        relocate(&mut registry, &wp("/a"), &wp("/b"));

        // Handles 1 and 2 are the old watches, 3 and 4 the new ones
        assert_eq!(backend.subscribe_calls(), 4);
        assert_eq!(backend.cancel_calls(), 2);
        assert_eq!(backend.active_count(), 2);
    }

    #[test]
    fn test_relocate_without_descendants() {
        let mut registry = MonitorRegistry::new(MemoryBackend::default(), 100, true);
        registry.add(&wp("/a"));

        assert!(!relocate(&mut registry, &wp("/a"), &wp("/b")));
        assert!(registry.is_watched(&wp("/b")));
        assert!(!registry.is_watched(&wp("/a")));
    }

    #[test]
    fn test_relocate_onto_itself_is_noop() {
        let mut registry = MonitorRegistry::new(MemoryBackend::default(), 100, true);
        registry.add(&wp("/a"));
        registry.add(&wp("/a/x"));

        assert!(!relocate(&mut registry, &wp("/a"), &wp("/a")));
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_relocate_at_ceiling_keeps_count_bounded() {
        let mut registry = MonitorRegistry::new(MemoryBackend::default(), 2, true);
        registry.add(&wp("/a"));
        registry.add(&wp("/a/x"));

        relocate(&mut registry, &wp("/a"), &wp("/b"));

        assert!(registry.count() <= 2);
        assert_eq!(registry.ignored_count(), 2);
        assert!(!registry.is_watched(&wp("/a")));
    }
}
