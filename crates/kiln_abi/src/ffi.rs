//! FFI types and function signatures for host/module interop
//!
//! This module defines the C ABI types used to communicate between the
//! host process and a game module. All types use `#[repr(C)]` for ABI
//! compatibility, so a module may be written in any language that can
//! export C symbols.

use std::ffi::{c_char, c_int, c_void, CStr, CString};

/// ABI version for compatibility checking
///
/// Bump whenever the layout of [`EngineApi`] or any export signature changes.
pub const KILN_ABI_VERSION: u32 = 1;

/// Width and height of a world chunk, in tiles
pub const CHUNK_SIZE: u32 = 16;

/// Number of tiles in one chunk
pub const TILES_PER_CHUNK: u32 = CHUNK_SIZE * CHUNK_SIZE;

/// Exported symbol names a module provides
pub mod symbols {
    /// `(const EngineApi*) -> GameInstance`, required
    pub const GAME_INIT: &str = "GameInit";
    /// `(GameInstance, float) -> void`, required
    pub const GAME_UPDATE: &str = "GameUpdate";
    /// `(GameInstance) -> void`, required
    pub const GAME_SHUTDOWN: &str = "GameShutdown";
    /// `(GameInstance, size_t*) -> void*`, optional
    pub const GAME_SERIALIZE_STATE: &str = "GameSerializeState";
    /// `(const EngineApi*, const void*, size_t) -> GameInstance`, optional
    pub const GAME_DESERIALIZE_STATE: &str = "GameDeserializeState";
    /// `() -> uint32_t`, optional
    pub const GAME_API_VERSION: &str = "GameApiVersion";

    /// Symbols without which a module is rejected
    pub const REQUIRED: [&str; 3] = [GAME_INIT, GAME_UPDATE, GAME_SHUTDOWN];
}

/// Function pointer types for the module exports
pub type GameInitFn = unsafe extern "C" fn(*const EngineApi) -> *mut c_void;
pub type GameUpdateFn = unsafe extern "C" fn(*mut c_void, f32);
pub type GameShutdownFn = unsafe extern "C" fn(*mut c_void);
pub type GameSerializeStateFn = unsafe extern "C" fn(*mut c_void, *mut usize) -> *mut c_void;
pub type GameDeserializeStateFn =
    unsafe extern "C" fn(*const EngineApi, *const c_void, usize) -> *mut c_void;
pub type GameApiVersionFn = unsafe extern "C" fn() -> u32;

/// Function pointer types for the host callbacks
///
/// Every callback receives [`EngineApi::context`] as its first argument.
pub type LogFn = unsafe extern "C" fn(*mut c_void, c_int, *const c_char);
pub type InitWorldRenderingFn = unsafe extern "C" fn(*mut c_void, u32, u32);
pub type UpdateChunkTilesFn = unsafe extern "C" fn(*mut c_void, u32, u32, *const RenderTile, u32);
pub type GetNoise2DFn = unsafe extern "C" fn(*mut c_void, u32, u32, *mut f32);
pub type KeyQueryFn = unsafe extern "C" fn(*mut c_void, c_int) -> c_int;
pub type GetMousePositionFn = unsafe extern "C" fn(*mut c_void, *mut f32, *mut f32);
pub type MouseButtonQueryFn = unsafe extern "C" fn(*mut c_void, c_int) -> c_int;
pub type GetTotalTimeFn = unsafe extern "C" fn(*mut c_void) -> f32;

/// Log levels carried across the ABI as plain integers
pub mod log_level {
    use std::ffi::c_int;

    pub const ERROR: c_int = 0;
    pub const WARN: c_int = 1;
    pub const INFO: c_int = 2;
    pub const DEBUG: c_int = 3;
    pub const TRACE: c_int = 4;
}

/// Key codes (GLFW-compatible values)
pub mod keys {
    use std::ffi::c_int;

    pub const SPACE: c_int = 32;
    pub const KEY_0: c_int = 48;
    pub const KEY_9: c_int = 57;
    pub const A: c_int = 65;
    pub const Q: c_int = 81;
    pub const R: c_int = 82;
    pub const Z: c_int = 90;
    pub const ESCAPE: c_int = 256;
    pub const ENTER: c_int = 257;

    /// Map a key name such as `"space"`, `"q"` or `"7"` to its code
    pub fn from_name(name: &str) -> Option<c_int> {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "space" => Some(SPACE),
            "escape" | "esc" => Some(ESCAPE),
            "enter" | "return" => Some(ENTER),
            _ => {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_alphabetic() => {
                        Some(c.to_ascii_uppercase() as c_int)
                    }
                    (Some(c), None) if c.is_ascii_digit() => Some(c as c_int),
                    _ => None,
                }
            }
        }
    }
}

/// One tile as uploaded to the renderer
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderTile {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    /// Top-left UV of the atlas slot
    pub frame_slot_x: f32,
    pub frame_slot_y: f32,
    /// UV width and height of the atlas slot
    pub frame_slot_w: f32,
    pub frame_slot_h: f32,
    pub texture_index: f32,
}

/// Host services handed to a module at init/deserialize time
///
/// The table and the context it points at are owned by the host and stay at
/// a fixed address for the whole process lifetime, across any number of
/// reloads. A module may keep the pointer it was given for as long as its
/// instance lives.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct EngineApi {
    /// Opaque host context, passed back as the first argument of every callback
    pub context: *mut c_void,

    // Logging
    pub log: Option<LogFn>,

    // World / rendering
    pub init_world_rendering: Option<InitWorldRenderingFn>,
    pub update_chunk_tiles: Option<UpdateChunkTilesFn>,

    // Noise
    pub get_noise_2d: Option<GetNoise2DFn>,

    // Input
    pub is_key_down: Option<KeyQueryFn>,
    pub is_key_start_press: Option<KeyQueryFn>,
    pub is_key_end_press: Option<KeyQueryFn>,
    pub get_mouse_position: Option<GetMousePositionFn>,
    pub is_mouse_button_down: Option<MouseButtonQueryFn>,

    // Timing
    pub get_total_time: Option<GetTotalTimeFn>,
}

impl Default for EngineApi {
    fn default() -> Self {
        Self {
            context: std::ptr::null_mut(),
            log: None,
            init_world_rendering: None,
            update_chunk_tiles: None,
            get_noise_2d: None,
            is_key_down: None,
            is_key_start_press: None,
            is_key_end_press: None,
            get_mouse_position: None,
            is_mouse_button_down: None,
            get_total_time: None,
        }
    }
}

impl std::fmt::Debug for EngineApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineApi")
            .field("context", &self.context)
            .field("log", &self.log.is_some())
            .field("init_world_rendering", &self.init_world_rendering.is_some())
            .field("update_chunk_tiles", &self.update_chunk_tiles.is_some())
            .field("get_noise_2d", &self.get_noise_2d.is_some())
            .field("is_key_down", &self.is_key_down.is_some())
            .field("get_total_time", &self.get_total_time.is_some())
            .finish()
    }
}

// Module-side convenience wrappers. A missing callback behaves like the host
// answering "nothing": no log, no key pressed, zero time.
//
// These assume the table came from the host, i.e. `context` is whatever the
// callbacks expect.
impl EngineApi {
    /// Send a log line to the host
    pub fn log(&self, level: c_int, message: &str) {
        if let Some(log) = self.log {
            if let Ok(message) = CString::new(message) {
                unsafe { log(self.context, level, message.as_ptr()) };
            }
        }
    }

    /// Tell the host how large the tile world is, in chunks
    pub fn init_world_rendering(&self, width_in_chunks: u32, height_in_chunks: u32) {
        if let Some(f) = self.init_world_rendering {
            unsafe { f(self.context, width_in_chunks, height_in_chunks) };
        }
    }

    /// Upload the tiles of one chunk
    pub fn update_chunk_tiles(&self, chunk_x: u32, chunk_y: u32, tiles: &[RenderTile]) {
        if let Some(f) = self.update_chunk_tiles {
            let count = u32::try_from(tiles.len()).unwrap_or(u32::MAX);
            unsafe { f(self.context, chunk_x, chunk_y, tiles.as_ptr(), count) };
        }
    }

    /// Fill `out` with `width * height` noise samples in `[-1, 1]`, row-major
    ///
    /// Nothing is written when `out` is shorter than `width * height`.
    pub fn noise_2d(&self, width: u32, height: u32, out: &mut [f32]) {
        let needed = width as usize * height as usize;
        if out.len() < needed {
            return;
        }
        if let Some(f) = self.get_noise_2d {
            unsafe { f(self.context, width, height, out.as_mut_ptr()) };
        }
    }

    pub fn is_key_down(&self, key: c_int) -> bool {
        self.query_key(self.is_key_down, key)
    }

    pub fn is_key_start_press(&self, key: c_int) -> bool {
        self.query_key(self.is_key_start_press, key)
    }

    pub fn is_key_end_press(&self, key: c_int) -> bool {
        self.query_key(self.is_key_end_press, key)
    }

    pub fn mouse_position(&self) -> (f32, f32) {
        let (mut x, mut y) = (0.0, 0.0);
        if let Some(f) = self.get_mouse_position {
            unsafe { f(self.context, &mut x, &mut y) };
        }
        (x, y)
    }

    pub fn is_mouse_button_down(&self, button: c_int) -> bool {
        self.query_key(self.is_mouse_button_down, button)
    }

    /// Seconds since the host started
    pub fn total_time(&self) -> f32 {
        match self.get_total_time {
            Some(f) => unsafe { f(self.context) },
            None => 0.0,
        }
    }

    fn query_key(&self, query: Option<KeyQueryFn>, code: c_int) -> bool {
        match query {
            Some(f) => unsafe { f(self.context, code) != 0 },
            None => false,
        }
    }
}

/// Read a C string handed across the ABI
///
/// # Safety
/// `ptr` must be null or point at a null-terminated string that stays valid
/// for the duration of the call.
pub unsafe fn c_str_lossy(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

/// Release a buffer returned by `GameSerializeState`
///
/// Modules allocate state buffers with the C allocator so that the host can
/// release them regardless of which allocator the module itself links.
///
/// # Safety
/// `ptr` must be null or a pointer obtained from `malloc` that has not been
/// freed yet.
pub unsafe fn free_state_buffer(ptr: *mut c_void) {
    if !ptr.is_null() {
        libc::free(ptr);
    }
}

/// Allocate a state buffer with the C allocator and copy `bytes` into it
///
/// Returns null for an empty slice or when the allocation fails.
pub fn alloc_state_buffer(bytes: &[u8]) -> *mut c_void {
    if bytes.is_empty() {
        return std::ptr::null_mut();
    }
    unsafe {
        let buffer = libc::malloc(bytes.len());
        if !buffer.is_null() {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), buffer as *mut u8, bytes.len());
        }
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names() {
        assert_eq!(keys::from_name("space"), Some(keys::SPACE));
        assert_eq!(keys::from_name("q"), Some(keys::Q));
        assert_eq!(keys::from_name("Q"), Some(keys::Q));
        assert_eq!(keys::from_name("7"), Some(55));
        assert_eq!(keys::from_name("ctrl"), None);
        assert_eq!(keys::from_name(""), None);
    }

    #[test]
    fn test_default_api_answers_nothing() {
        let api = EngineApi::default();
        api.log(log_level::INFO, "ignored");
        assert!(!api.is_key_down(keys::SPACE));
        assert_eq!(api.total_time(), 0.0);
        assert_eq!(api.mouse_position(), (0.0, 0.0));
    }

    #[test]
    fn test_state_buffer_roundtrip() {
        let ptr = alloc_state_buffer(&[1, 2, 3]);
        assert!(!ptr.is_null());
        let copied = unsafe { std::slice::from_raw_parts(ptr as *const u8, 3) }.to_vec();
        assert_eq!(copied, vec![1, 2, 3]);
        unsafe { free_state_buffer(ptr) };

        assert!(alloc_state_buffer(&[]).is_null());
    }

    unsafe extern "C" fn total_time_from_context(context: *mut c_void) -> f32 {
        *(context as *const f32)
    }

    #[test]
    fn test_callbacks_receive_context() {
        let mut seconds = 4.5f32;
        let api = EngineApi {
            context: &mut seconds as *mut f32 as *mut c_void,
            get_total_time: Some(total_time_from_context),
            ..EngineApi::default()
        };
        assert_eq!(api.total_time(), 4.5);
    }
}
