//! Module file watcher
//!
//! Watches the module's directory and reports when the canonical file has
//! changed and then stayed quiet for the debounce window. Temp copies and
//! other files in the directory are ignored.

use crate::error::{HotloadError, Result};
use crossbeam_channel::{unbounded, Receiver};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Trailing-edge debounce for a burst of change events
#[derive(Debug, Clone)]
struct Debounce {
    window: Duration,
    last_change: Option<Instant>,
}

impl Debounce {
    fn new(window: Duration) -> Self {
        Self { window, last_change: None }
    }

    fn note_change(&mut self, at: Instant) {
        self.last_change = Some(at);
    }

    /// True once per burst, after `window` has passed with no new change
    fn fire(&mut self, now: Instant) -> bool {
        match self.last_change {
            Some(at) if now.saturating_duration_since(at) >= self.window => {
                self.last_change = None;
                true
            }
            _ => false,
        }
    }
}

/// Watches one module file for rebuilds
pub struct ModuleWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    module_path: PathBuf,
    file_name: OsString,
    debounce: Debounce,
}

impl ModuleWatcher {
    /// Start watching the directory containing `module_path`
    ///
    /// The module file itself need not exist yet.
    pub fn new(module_path: impl Into<PathBuf>, debounce: Duration) -> Result<Self> {
        let module_path = module_path.into();
        let file_name = module_path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| {
                HotloadError::Watch(format!("'{}' has no file name", module_path.display()))
            })?;

        let dir = match module_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = unbounded();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|e| HotloadError::Watch(format!("Failed to create file watcher: {}", e)))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| HotloadError::Watch(format!("Failed to watch {:?}: {}", dir, e)))?;

        log::info!("Watching '{}' for changes", module_path.display());

        Ok(Self {
            _watcher: watcher,
            rx,
            module_path,
            file_name,
            debounce: Debounce::new(debounce),
        })
    }

    /// Module file being watched
    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    /// Drain pending events; true when a settled change is ready to reload
    ///
    /// Never blocks. Call once per frame.
    pub fn poll(&mut self) -> bool {
        let now = Instant::now();

        while let Ok(result) = self.rx.try_recv() {
            match result {
                Ok(event) => {
                    if self.is_module_event(&event) {
                        log::debug!("Module change detected: {:?}", event.kind);
                        self.debounce.note_change(now);
                    }
                }
                Err(e) => log::warn!("File watcher error: {}", e),
            }
        }

        self.debounce.fire(now)
    }

    fn is_module_event(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
            && event
                .paths
                .iter()
                .any(|path| path.file_name() == Some(self.file_name.as_os_str()))
    }
}

impl std::fmt::Debug for ModuleWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleWatcher")
            .field("module_path", &self.module_path)
            .field("debounce", &self.debounce)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debounce_waits_for_quiet() {
        let start = Instant::now();
        let mut debounce = Debounce::new(Duration::from_millis(300));
        assert!(!debounce.fire(start));

        debounce.note_change(start);
        assert!(!debounce.fire(start + Duration::from_millis(100)));

        // A second write in the same burst pushes the deadline out
        debounce.note_change(start + Duration::from_millis(200));
        assert!(!debounce.fire(start + Duration::from_millis(400)));
        assert!(debounce.fire(start + Duration::from_millis(500)));

        // One report per burst
        assert!(!debounce.fire(start + Duration::from_millis(900)));
        assert!(debounce.last_change.is_none());
    }

    #[test]
    fn test_zero_window_fires_immediately() {
        let now = Instant::now();
        let mut debounce = Debounce::new(Duration::ZERO);
        debounce.note_change(now);
        assert!(debounce.fire(now));
    }

    #[test]
    fn test_watcher_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let module = dir.path().join("libgame.so");
        let mut watcher = ModuleWatcher::new(&module, Duration::ZERO).unwrap();

        std::fs::write(dir.path().join("libgame_123.so"), b"copy").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"text").unwrap();
        std::thread::sleep(Duration::from_millis(200));

        assert!(!watcher.poll());
        assert_eq!(watcher.module_path(), module.as_path());
    }
}
