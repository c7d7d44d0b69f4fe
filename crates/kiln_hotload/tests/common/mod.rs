//! In-process stand-in for a compiled game module
//!
//! `MockLoader` reads the copied file's contents to decide which build it is
//! looking at, so a test "rebuilds" the module by writing a new variant name
//! to the canonical path. Exports are plain `extern "C"` functions; all
//! bookkeeping is thread-local because every test runs on its own thread.

#![allow(dead_code)]

use kiln_abi::{
    alloc_state_buffer, symbols, EngineApi, GameApiVersionFn, GameDeserializeStateFn, GameInitFn,
    GameSerializeStateFn, GameShutdownFn, GameUpdateFn, KILN_ABI_VERSION,
};
use kiln_hotload::{HotloadError, LibraryLoader, LoadedLibrary, RawSymbol, Result};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};

// ========== Instrumentation ==========

thread_local! {
    static EVENTS: RefCell<Vec<String>> = RefCell::new(Vec::new());
    static LIVE: Cell<i64> = Cell::new(0);
    static LAST_PRESSES: Cell<i32> = Cell::new(-1);
}

fn record(event: impl Into<String>) {
    EVENTS.with(|events| events.borrow_mut().push(event.into()));
}

/// Every export call and library close so far, in order
pub fn events() -> Vec<String> {
    EVENTS.with(|events| events.borrow().clone())
}

/// How many times `name` appears in [`events`]
pub fn count(name: &str) -> usize {
    events().iter().filter(|e| e.as_str() == name).count()
}

/// Instances created and not yet shut down
pub fn live_instances() -> i64 {
    LIVE.with(|live| live.get())
}

/// Press count seen by the most recent update or restore
pub fn last_presses() -> i32 {
    LAST_PRESSES.with(|p| p.get())
}

// ========== Game ==========

struct MockGame {
    presses: i32,
}

fn new_instance(presses: i32) -> *mut c_void {
    LIVE.with(|live| live.set(live.get() + 1));
    Box::into_raw(Box::new(MockGame { presses })) as *mut c_void
}

unsafe fn step(instance: *mut c_void, by: i32) {
    let game = &mut *(instance as *mut MockGame);
    game.presses += by;
    LAST_PRESSES.with(|p| p.set(game.presses));
}

unsafe extern "C" fn game_init(api: *const EngineApi) -> *mut c_void {
    record(if api.is_null() { "init(null-api)" } else { "init" });
    new_instance(0)
}

unsafe extern "C" fn game_init_null(_api: *const EngineApi) -> *mut c_void {
    record("init");
    std::ptr::null_mut()
}

unsafe extern "C" fn game_update_v1(instance: *mut c_void, _delta_time: f32) {
    record("update");
    step(instance, 1);
}

unsafe extern "C" fn game_update_v2(instance: *mut c_void, _delta_time: f32) {
    record("update");
    step(instance, 100);
}

unsafe extern "C" fn game_shutdown(instance: *mut c_void) {
    record("shutdown");
    LIVE.with(|live| live.set(live.get() - 1));
    drop(Box::from_raw(instance as *mut MockGame));
}

unsafe extern "C" fn game_serialize(instance: *mut c_void, out_size: *mut usize) -> *mut c_void {
    record("serialize");
    let game = &*(instance as *const MockGame);
    let bytes = game.presses.to_le_bytes();
    *out_size = bytes.len();
    alloc_state_buffer(&bytes)
}

unsafe extern "C" fn game_serialize_nothing(_instance: *mut c_void, out_size: *mut usize) -> *mut c_void {
    record("serialize");
    *out_size = 0;
    std::ptr::null_mut()
}

unsafe extern "C" fn game_deserialize(
    _api: *const EngineApi,
    data: *const c_void,
    size: usize,
) -> *mut c_void {
    record("deserialize");
    let bytes = std::slice::from_raw_parts(data as *const u8, size);
    let Ok(bytes) = <[u8; 4]>::try_from(bytes) else {
        return std::ptr::null_mut();
    };
    let presses = i32::from_le_bytes(bytes);
    LAST_PRESSES.with(|p| p.set(presses));
    new_instance(presses)
}

unsafe extern "C" fn game_deserialize_reject(
    _api: *const EngineApi,
    _data: *const c_void,
    _size: usize,
) -> *mut c_void {
    record("deserialize");
    std::ptr::null_mut()
}

extern "C" fn version_current() -> u32 {
    KILN_ABI_VERSION
}

extern "C" fn version_future() -> u32 {
    KILN_ABI_VERSION + 1
}

// ========== Builds ==========

/// Module builds a test can write to the canonical file
pub mod build {
    /// Every export, update adds 1
    pub const FULL: &str = "full";
    /// Every export, update adds 100
    pub const FULL_V2: &str = "full-v2";
    /// Required exports only
    pub const NO_STATE: &str = "no-state";
    /// Serialize without deserialize
    pub const HALF_STATE: &str = "half-state";
    /// Missing `GameShutdown`
    pub const NO_SHUTDOWN: &str = "no-shutdown";
    /// Reports a newer ABI version
    pub const FUTURE_ABI: &str = "future-abi";
    /// `GameInit` returns null
    pub const NULL_INIT: &str = "null-init";
    /// Serializer produces nothing
    pub const EMPTY_STATE: &str = "empty-state";
    /// Deserializer rejects every buffer
    pub const REJECT_STATE: &str = "reject-state";
    /// Every export, but the OS refuses to close it
    pub const STUCK: &str = "stuck";
}

fn exports_for(build_name: &str) -> Option<HashMap<&'static str, RawSymbol>> {
    let init = game_init as GameInitFn as RawSymbol;
    let update_v1 = game_update_v1 as GameUpdateFn as RawSymbol;
    let shutdown = game_shutdown as GameShutdownFn as RawSymbol;
    let serialize = game_serialize as GameSerializeStateFn as RawSymbol;
    let deserialize = game_deserialize as GameDeserializeStateFn as RawSymbol;
    let version = version_current as GameApiVersionFn as RawSymbol;

    let mut exports: HashMap<&'static str, RawSymbol> = HashMap::from([
        (symbols::GAME_API_VERSION, version),
        (symbols::GAME_INIT, init),
        (symbols::GAME_UPDATE, update_v1),
        (symbols::GAME_SHUTDOWN, shutdown),
        (symbols::GAME_SERIALIZE_STATE, serialize),
        (symbols::GAME_DESERIALIZE_STATE, deserialize),
    ]);

    match build_name {
        build::FULL | build::STUCK => {}
        build::FULL_V2 => {
            exports.insert(symbols::GAME_UPDATE, game_update_v2 as GameUpdateFn as RawSymbol);
        }
        build::NO_STATE => {
            exports.remove(symbols::GAME_SERIALIZE_STATE);
            exports.remove(symbols::GAME_DESERIALIZE_STATE);
        }
        build::HALF_STATE => {
            exports.remove(symbols::GAME_DESERIALIZE_STATE);
        }
        build::NO_SHUTDOWN => {
            exports.remove(symbols::GAME_SHUTDOWN);
        }
        build::FUTURE_ABI => {
            exports.insert(symbols::GAME_API_VERSION, version_future as GameApiVersionFn as RawSymbol);
        }
        build::NULL_INIT => {
            exports.insert(symbols::GAME_INIT, game_init_null as GameInitFn as RawSymbol);
        }
        build::EMPTY_STATE => {
            exports.insert(
                symbols::GAME_SERIALIZE_STATE,
                game_serialize_nothing as GameSerializeStateFn as RawSymbol,
            );
        }
        build::REJECT_STATE => {
            exports.insert(
                symbols::GAME_DESERIALIZE_STATE,
                game_deserialize_reject as GameDeserializeStateFn as RawSymbol,
            );
        }
        _ => return None,
    }
    Some(exports)
}

// ========== Loader ==========

struct MockLibrary {
    path: PathBuf,
    exports: HashMap<&'static str, RawSymbol>,
    stuck: bool,
}

impl LoadedLibrary for MockLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn symbol(&self, name: &str) -> Option<RawSymbol> {
        self.exports.get(name).copied()
    }

    fn close(self: Box<Self>) -> Result<()> {
        if self.stuck {
            record("close(failed)");
            return Err(HotloadError::load_failure(&self.path, "library is still in use"));
        }
        // The copy must still be on disk when its library is closed
        record(if self.path.exists() { "close" } else { "close(missing-file)" });
        Ok(())
    }
}

/// Loader that "opens" a copy by reading which build it contains
#[derive(Default)]
pub struct MockLoader {
    failures_left: Cell<u32>,
    opened: RefCell<Vec<PathBuf>>,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` opens as if the OS loader refused them
    pub fn failing(n: u32) -> Self {
        let loader = Self::default();
        loader.failures_left.set(n);
        loader
    }

    /// Paths handed to `open`, in order
    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened.borrow().clone()
    }
}

impl LibraryLoader for MockLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>> {
        self.opened.borrow_mut().push(path.to_path_buf());

        let left = self.failures_left.get();
        if left > 0 {
            self.failures_left.set(left - 1);
            return Err(HotloadError::load_failure(path, "file is still being written"));
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| HotloadError::load_failure(path, e.to_string()))?;
        let build_name = contents.trim();
        let exports = exports_for(build_name)
            .ok_or_else(|| HotloadError::load_failure(path, "not a shared object"))?;

        record("open");
        Ok(Box::new(MockLibrary {
            path: path.to_path_buf(),
            exports,
            stuck: build_name == build::STUCK,
        }))
    }
}

// ========== Fixtures ==========

/// A module directory holding `libgame.so`
pub struct ModuleDir {
    pub dir: tempfile::TempDir,
    pub module: PathBuf,
}

impl ModuleDir {
    pub fn new(build_name: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let module = dir.path().join("libgame.so");
        std::fs::write(&module, build_name).expect("write module");
        Self { dir, module }
    }

    /// Overwrite the canonical file with another build
    pub fn rebuild(&self, build_name: &str) {
        std::fs::write(&self.module, build_name).expect("rewrite module");
    }

    /// File names in the directory, sorted
    pub fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .expect("read dir")
            .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Temp copies of the module currently on disk
    pub fn copies(&self) -> Vec<PathBuf> {
        kiln_hotload::find_orphans(&self.module).expect("list copies")
    }
}
