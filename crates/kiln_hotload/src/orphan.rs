//! Orphaned temp-copy cleanup
//!
//! A process that crashes or is killed leaves its temp copy behind. At
//! startup and shutdown the module directory is swept for files named like
//! copies of the canonical module and each is deleted independently.

use crate::temp_copy::is_temp_copy_of;
use std::path::{Path, PathBuf};

/// Outcome of one sweep
#[derive(Debug, Default)]
pub struct OrphanSweep {
    /// Copies that were deleted
    pub removed: Vec<PathBuf>,
    /// Copies that could not be deleted, with the reason
    pub failed: Vec<(PathBuf, std::io::Error)>,
}

impl OrphanSweep {
    /// True when nothing was found
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.failed.is_empty()
    }
}

/// Directory the module and its copies live in
fn module_dir(module_path: &Path) -> &Path {
    match module_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// List copies of `module_path` present in its directory
pub fn find_orphans(module_path: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut orphans = Vec::new();

    for entry in std::fs::read_dir(module_dir(module_path))? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if path.is_file() && is_temp_copy_of(&path, module_path) {
            orphans.push(path);
        }
    }

    orphans.sort();
    Ok(orphans)
}

/// Delete every copy of `module_path` in its directory
///
/// Best-effort: a copy that cannot be deleted (for instance because another
/// process still has it loaded) is logged and skipped.
pub fn sweep_orphans(module_path: &Path) -> OrphanSweep {
    let orphans = match find_orphans(module_path) {
        Ok(orphans) => orphans,
        Err(e) => {
            log::warn!(
                "Could not scan '{}' for orphaned module copies: {}",
                module_dir(module_path).display(),
                e
            );
            return OrphanSweep::default();
        }
    };

    remove_orphans(orphans)
}

/// Delete each of `orphans`, carrying on past any that fail
fn remove_orphans(orphans: Vec<PathBuf>) -> OrphanSweep {
    let mut sweep = OrphanSweep::default();

    for path in orphans {
        match std::fs::remove_file(&path) {
            Ok(()) => {
                log::info!("Removed orphaned module copy '{}'", path.display());
                sweep.removed.push(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                log::warn!("Could not remove orphaned module copy '{}': {}", path.display(), e);
                sweep.failed.push((path, e));
            }
        }
    }

    sweep
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_removes_only_copies() {
        let dir = tempfile::tempdir().unwrap();
        let module = dir.path().join("libgame.so");
        for name in [
            "libgame.so",
            "libgame_1700000000000.so",
            "libgame_1700000000001.so",
            "libgame_notes.txt",
            "libother_1700000000000.so",
            "libgame_1700000000002.dll",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let sweep = sweep_orphans(&module);
        assert_eq!(sweep.removed.len(), 2);
        assert!(sweep.failed.is_empty());

        let mut left: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec![
                "libgame.so",
                "libgame_1700000000002.dll",
                "libgame_notes.txt",
                "libother_1700000000000.so",
            ]
        );
    }

    #[test]
    fn test_sweep_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sweep = sweep_orphans(&dir.path().join("gone").join("libgame.so"));
        assert!(sweep.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_undeletable_orphan_does_not_stop_sweep() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked_dir = dir.path().join("locked");
        std::fs::create_dir(&locked_dir).unwrap();
        let locked = locked_dir.join("libgame_1700000000000.so");
        let free = dir.path().join("libgame_1700000000001.so");
        std::fs::write(&locked, b"x").unwrap();
        std::fs::write(&free, b"x").unwrap();

        std::fs::set_permissions(&locked_dir, std::fs::Permissions::from_mode(0o555)).unwrap();
        // Permission bits do not bind root
        let unrestricted = std::fs::write(locked_dir.join("write_check"), b"x").is_ok();
        if unrestricted {
            std::fs::set_permissions(&locked_dir, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let sweep = remove_orphans(vec![locked.clone(), free.clone()]);

        std::fs::set_permissions(&locked_dir, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(sweep.removed, vec![free.clone()]);
        assert_eq!(sweep.failed.len(), 1);
        assert_eq!(sweep.failed[0].0, locked);
        assert!(locked.exists());
        assert!(!free.exists());
    }

    #[test]
    fn test_module_dir_of_bare_name() {
        assert_eq!(module_dir(Path::new("libgame.so")), Path::new("."));
        assert_eq!(module_dir(Path::new("mods/libgame.so")), Path::new("mods"));
    }
}
