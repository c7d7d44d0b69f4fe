//! Platform naming conventions for module files

use std::path::{Path, PathBuf};

/// File name prefix the platform linker gives shared libraries
#[cfg(windows)]
pub const MODULE_PREFIX: &str = "";
#[cfg(not(windows))]
pub const MODULE_PREFIX: &str = "lib";

/// Shared library extension, without the dot
#[cfg(windows)]
pub const MODULE_EXTENSION: &str = "dll";
#[cfg(target_os = "macos")]
pub const MODULE_EXTENSION: &str = "dylib";
#[cfg(all(not(windows), not(target_os = "macos")))]
pub const MODULE_EXTENSION: &str = "so";

/// Platform file name for a module called `name`
///
/// `game` becomes `game.dll`, `libgame.dylib` or `libgame.so`.
pub fn module_file_name(name: &str) -> String {
    format!("{}{}.{}", MODULE_PREFIX, name, MODULE_EXTENSION)
}

/// Full path of the canonical module file inside `dir`
pub fn module_path(dir: impl AsRef<Path>, name: &str) -> PathBuf {
    dir.as_ref().join(module_file_name(name))
}
