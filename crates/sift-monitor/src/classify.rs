//! File-type lookup used to decide whether an event concerns a directory.

use std::fs;
use std::path::Path;

/// What a path currently names on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    Other,
    /// Nothing there any more (deleted or moved away)
    Missing,
}

/// Looks up the current type of a path.
pub trait FileTypeProbe {
    fn probe(&self, path: &Path) -> EntryKind;
}

/// Probe backed by a real `stat`.
///
/// Symlinks are followed; a dangling link counts as [`EntryKind::Other`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StatProbe;

impl FileTypeProbe for StatProbe {
    fn probe(&self, path: &Path) -> EntryKind {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => EntryKind::Directory,
            Ok(_) => EntryKind::Other,
            Err(_) if fs::symlink_metadata(path).is_ok() => EntryKind::Other,
            Err(_) => EntryKind::Missing,
        }
    }
}

impl<F> FileTypeProbe for F
where
    F: Fn(&Path) -> EntryKind,
{
    fn probe(&self, path: &Path) -> EntryKind {
        self(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stat_probe() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("note.txt");
        fs::write(&file, "hello").unwrap();

        assert_eq!(StatProbe.probe(temp.path()), EntryKind::Directory);
        assert_eq!(StatProbe.probe(&file), EntryKind::Other);
        assert_eq!(StatProbe.probe(&temp.path().join("gone")), EntryKind::Missing);
    }

    #[cfg(unix)]
    #[test]
    fn test_stat_probe_dangling_symlink() {
        let temp = TempDir::new().unwrap();
        let link = temp.path().join("link");
        std::os::unix::fs::symlink(temp.path().join("missing"), &link).unwrap();

        assert_eq!(StatProbe.probe(&link), EntryKind::Other);
    }

    #[test]
    fn test_closure_probe() {
        let probe = |path: &Path| {
            if path.ends_with("dir") {
                EntryKind::Directory
            } else {
                EntryKind::Missing
            }
        };
        assert_eq!(probe.probe(Path::new("/x/dir")), EntryKind::Directory);
        assert_eq!(probe.probe(Path::new("/x/file")), EntryKind::Missing);
    }
}
