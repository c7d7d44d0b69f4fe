//! Shared-library loading
//!
//! A thin seam over the OS dynamic linker. [`NativeLoader`] is the real
//! implementation; tests substitute their own [`LibraryLoader`].

use crate::error::{HotloadError, Result};
use libloading::Library;
use std::ffi::c_void;
use std::path::{Path, PathBuf};

/// Address of an exported symbol
pub type RawSymbol = *const c_void;

/// A shared library opened by a [`LibraryLoader`]
pub trait LoadedLibrary {
    /// Path the library was opened from
    fn path(&self) -> &Path;

    /// Look up an exported symbol, `None` if the library does not export it
    fn symbol(&self, name: &str) -> Option<RawSymbol>;

    /// Close the library
    ///
    /// Every address obtained from [`symbol`](Self::symbol) is dangling
    /// afterwards.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Opens shared libraries
pub trait LibraryLoader {
    /// Open the library at `path`
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>>;
}

/// Exclusive handle to one loaded copy of a module
///
/// Not `Clone`: there is exactly one live handle per loaded copy.
pub struct ModuleHandle {
    library: Box<dyn LoadedLibrary>,
}

impl ModuleHandle {
    /// Open `path` through `loader`
    pub fn open(loader: &dyn LibraryLoader, path: &Path) -> Result<Self> {
        let library = loader.open(path)?;
        log::debug!("Opened module library '{}'", path.display());
        Ok(Self { library })
    }

    /// Path of the loaded file
    pub fn path(&self) -> &Path {
        self.library.path()
    }

    /// Look up an exported symbol
    pub fn symbol(&self, name: &str) -> Option<RawSymbol> {
        self.library.symbol(name)
    }

    /// Unload the library
    ///
    /// The handle is gone either way. After an error the OS may still have
    /// the file mapped, so the caller must leave it on disk.
    pub fn unload(self) -> Result<()> {
        let path = self.library.path().to_path_buf();
        self.library.close()?;
        log::debug!("Unloaded module library '{}'", path.display());
        Ok(())
    }
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle").field("path", &self.path()).finish()
    }
}

/// Loader backed by the OS dynamic linker (`dlopen` / `LoadLibrary`)
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeLoader;

impl NativeLoader {
    pub fn new() -> Self {
        Self
    }
}

impl LibraryLoader for NativeLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>> {
        let library = open_platform(path)
            .map_err(|e| HotloadError::load_failure(path, e.to_string()))?;

        Ok(Box::new(NativeLibrary {
            library,
            path: path.to_path_buf(),
        }))
    }
}

// Resolve every relocation up front so a missing transitive dependency
// surfaces as a load failure rather than a crash on first call.
#[cfg(unix)]
fn open_platform(path: &Path) -> std::result::Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};

    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL) }.map(Library::from)
}

#[cfg(windows)]
fn open_platform(path: &Path) -> std::result::Result<Library, libloading::Error> {
    unsafe { Library::new(path) }
}

struct NativeLibrary {
    library: Library,
    path: PathBuf,
}

impl LoadedLibrary for NativeLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn symbol(&self, name: &str) -> Option<RawSymbol> {
        let address = unsafe {
            self.library
                .get::<*const c_void>(name.as_bytes())
                .ok()
                .map(|symbol| *symbol)
        };
        address.filter(|address| !address.is_null())
    }

    fn close(self: Box<Self>) -> Result<()> {
        let NativeLibrary { library, path } = *self;
        library
            .close()
            .map_err(|e| HotloadError::load_failure(path, e.to_string()))
    }
}
