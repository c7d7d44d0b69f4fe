//! # kiln_hotload - Native Module Hot-Reload
//!
//! Loads a game module built as a shared library, drives it through the
//! `kiln_abi` entry points, and swaps it for a fresh build while the host
//! keeps running.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │  libgame.so     │────▶│  TempCopy       │  libgame_<token>.so
//! │  (canonical)    │copy │                 │
//! └────────┬────────┘     └────────┬────────┘
//!          │ notify                │ LibraryLoader (libloading)
//!          ▼                       ▼
//! ┌─────────────────┐     ┌───────────────────┐
//! │  ModuleWatcher  │────▶│ ReloadCoordinator │──▶ ModuleApi ──▶ GameInstance
//! └─────────────────┘poll └───────────────────┘
//! ```
//!
//! The canonical file is never opened directly, so the build can overwrite
//! it at any time. Copies are deleted after unload and swept at startup
//! and shutdown.
//!
//! ## Example
//!
//! ```ignore
//! use kiln_hotload::prelude::*;
//!
//! let mut coordinator = ReloadCoordinator::native(
//!     module_path("target/debug", "kiln_game"),
//!     ReloadConfig::default(),
//!     engine_api,
//! );
//! coordinator.load()?;
//!
//! loop {
//!     if watcher.poll() {
//!         coordinator.trigger_reload();
//!     }
//!     coordinator.update(1.0 / 60.0);
//! }
//! ```

mod api_table;
mod config;
mod coordinator;
mod error;
mod library;
mod orphan;
mod platform;
mod temp_copy;

#[cfg(feature = "hot-reload")]
mod watcher;

pub use api_table::{GameInstance, ModuleApi, SerializedState};
pub use config::ReloadConfig;
pub use coordinator::{ModuleState, ReloadCoordinator};
pub use error::{FailureKind, HotloadError, Result};
pub use library::{LibraryLoader, LoadedLibrary, ModuleHandle, NativeLoader, RawSymbol};
pub use orphan::{find_orphans, sweep_orphans, OrphanSweep};
pub use platform::{module_file_name, module_path, MODULE_EXTENSION, MODULE_PREFIX};
pub use temp_copy::{is_temp_copy_of, load_for_hot_reload, temp_copy_path, TempCopy};

#[cfg(feature = "hot-reload")]
pub use watcher::ModuleWatcher;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::ReloadConfig;
    pub use crate::coordinator::{ModuleState, ReloadCoordinator};
    pub use crate::error::{FailureKind, HotloadError, Result};
    pub use crate::library::{LibraryLoader, NativeLoader};
    pub use crate::platform::module_path;

    #[cfg(feature = "hot-reload")]
    pub use crate::watcher::ModuleWatcher;
}
