//! Temp-copy loading
//!
//! The canonical module file is never opened directly. Each load copies it
//! to `<stem>_<token>.<ext>` next to the original and opens the copy, so the
//! build system can overwrite the canonical file while the process still
//! maps the previous copy.

use crate::error::{HotloadError, Result};
use crate::library::{LibraryLoader, ModuleHandle};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Last token handed out, shared by every loader in the process
static LAST_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Next copy token: the current time in milliseconds, bumped past the last
/// token so two copies made within the same millisecond never collide
fn next_token() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let mut last = LAST_TOKEN.load(Ordering::Relaxed);
    loop {
        let token = now.max(last + 1);
        match LAST_TOKEN.compare_exchange_weak(last, token, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return token,
            Err(actual) => last = actual,
        }
    }
}

/// Stem and extension of a module file, as used in copy names
fn split_name(original: &Path) -> (String, Option<String>) {
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string());
    let extension = original
        .extension()
        .map(|e| e.to_string_lossy().into_owned());
    (stem, extension)
}

/// Path of the copy of `original` identified by `token`
pub fn temp_copy_path(original: &Path, token: u64) -> PathBuf {
    let (stem, extension) = split_name(original);
    let name = match extension {
        Some(ext) => format!("{}_{}.{}", stem, token, ext),
        None => format!("{}_{}", stem, token),
    };
    original.with_file_name(name)
}

/// Check whether `candidate` is named like a copy of `original`
///
/// Matches `<stem>_<digits>.<ext>` only, so the canonical file and unrelated
/// files sharing the stem are never mistaken for copies.
pub fn is_temp_copy_of(candidate: &Path, original: &Path) -> bool {
    let Some(file_name) = candidate.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let (stem, extension) = split_name(original);

    let Some(rest) = file_name.strip_prefix(stem.as_str()) else {
        return false;
    };
    let Some(rest) = rest.strip_prefix('_') else {
        return false;
    };
    let token = match &extension {
        Some(ext) => match rest.strip_suffix(ext.as_str()).and_then(|r| r.strip_suffix('.')) {
            Some(token) => token,
            None => return false,
        },
        None => rest,
    };

    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// A copy of the canonical module file made for one load
///
/// The file on disk belongs to this record until [`remove`](Self::remove)
/// is called. It must not be removed while a handle to it is still loaded.
#[derive(Debug)]
pub struct TempCopy {
    original: PathBuf,
    path: PathBuf,
    created_at: SystemTime,
}

impl TempCopy {
    /// Copy `original` to a fresh temp name next to it
    ///
    /// A copy that fails partway is deleted before the error is returned.
    pub fn create(original: &Path) -> Result<Self> {
        Self::create_with_token(original, next_token())
    }

    pub(crate) fn create_with_token(original: &Path, token: u64) -> Result<Self> {
        if !original.is_file() {
            return Err(HotloadError::NotFound(original.to_path_buf()));
        }

        let path = temp_copy_path(original, token);

        // std::fs::copy truncates an existing file of the same name
        if let Err(e) = std::fs::copy(original, &path) {
            if path.is_file() {
                if let Err(remove_err) = std::fs::remove_file(&path) {
                    log::warn!(
                        "Could not remove partial copy '{}': {}",
                        path.display(),
                        remove_err
                    );
                }
            }
            return Err(HotloadError::filesystem("copy module to", &path, e));
        }

        log::debug!("Copied '{}' to '{}'", original.display(), path.display());

        Ok(Self {
            original: original.to_path_buf(),
            path,
            created_at: SystemTime::now(),
        })
    }

    /// Canonical file this is a copy of
    pub fn original(&self) -> &Path {
        &self.original
    }

    /// Path of the copy
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the copy was made
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Delete the copy
    ///
    /// Some platforms keep the file locked for a moment after the library is
    /// unloaded, so a failed delete is retried once after `grace`. A file
    /// that is already gone counts as removed.
    pub fn remove(self, grace: Duration) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                log::debug!(
                    "Delete of '{}' failed ({}), retrying in {:?}",
                    self.path.display(),
                    e,
                    grace
                );
            }
        }

        thread::sleep(grace);

        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HotloadError::filesystem("delete", &self.path, e)),
        }
    }
}

/// Load a copy of `canonical` so the original stays writable
///
/// On failure nothing is left behind: a copy that the loader rejects is
/// deleted before the error is returned.
pub fn load_for_hot_reload(
    loader: &dyn LibraryLoader,
    canonical: &Path,
) -> Result<(ModuleHandle, TempCopy)> {
    let copy = TempCopy::create(canonical)?;

    match ModuleHandle::open(loader, copy.path()) {
        Ok(handle) => Ok((handle, copy)),
        Err(e) => {
            let path = copy.path().to_path_buf();
            if let Err(remove_err) = copy.remove(Duration::ZERO) {
                log::warn!("Could not remove rejected copy '{}': {}", path.display(), remove_err);
            }
            Err(e)
        }
    }
}
