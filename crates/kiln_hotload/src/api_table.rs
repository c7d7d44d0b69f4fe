//! Module ABI table
//!
//! Resolves the fixed exports of a loaded module into typed function
//! pointers. Serialization is modelled as an optional capability: either
//! both halves are present or the module has none.

use crate::error::{HotloadError, Result};
use crate::library::{ModuleHandle, RawSymbol};
use kiln_abi::{
    free_state_buffer, symbols, EngineApi, GameApiVersionFn, GameDeserializeStateFn, GameInitFn,
    GameSerializeStateFn, GameShutdownFn, GameUpdateFn, KILN_ABI_VERSION,
};
use std::ffi::c_void;
use std::ptr::NonNull;

/// Opaque per-load state object owned by the module
///
/// The host never looks behind the pointer. Move-only: it is consumed by
/// exactly one `GameShutdown` call.
#[derive(Debug)]
pub struct GameInstance(NonNull<c_void>);

impl GameInstance {
    fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(GameInstance)
    }

    fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// State bytes captured from one instance to seed the next
///
/// Owned by the host; the module's own allocation is released as soon as the
/// bytes have been copied out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedState {
    bytes: Vec<u8>,
}

impl SerializedState {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The serialize/deserialize export pair
#[derive(Clone, Copy)]
pub struct StateTransfer {
    serialize: GameSerializeStateFn,
    deserialize: GameDeserializeStateFn,
}

/// Entry points resolved from one loaded module
///
/// Only valid while the [`ModuleHandle`] it was resolved from stays loaded;
/// the coordinator keeps the two together and drops them together.
pub struct ModuleApi {
    init: GameInitFn,
    update: GameUpdateFn,
    shutdown: GameShutdownFn,
    state_transfer: Option<StateTransfer>,
}

/// Reinterpret a symbol address as a function pointer
///
/// # Safety
/// `F` must be the function pointer type the symbol was exported with.
unsafe fn cast_symbol<F: Copy>(address: RawSymbol) -> F {
    debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<RawSymbol>());
    std::mem::transmute_copy::<RawSymbol, F>(&address)
}

fn module_name(handle: &ModuleHandle) -> String {
    handle.path().display().to_string()
}

fn required(handle: &ModuleHandle, name: &str) -> Result<RawSymbol> {
    handle
        .symbol(name)
        .ok_or_else(|| HotloadError::missing_symbol(module_name(handle), name))
}

impl ModuleApi {
    /// Resolve the ABI table from a loaded module
    ///
    /// Fails if any required export is missing or the module reports a
    /// different ABI version. The caller owns cleanup of `handle` on failure.
    pub fn resolve(handle: &ModuleHandle) -> Result<Self> {
        if let Some(address) = handle.symbol(symbols::GAME_API_VERSION) {
            let version_fn: GameApiVersionFn = unsafe { cast_symbol(address) };
            let version = unsafe { version_fn() };
            if version != KILN_ABI_VERSION {
                return Err(HotloadError::VersionMismatch {
                    module_version: version,
                    expected_version: KILN_ABI_VERSION,
                });
            }
        }

        let [init, update, shutdown] = symbols::REQUIRED;
        let init: GameInitFn = unsafe { cast_symbol(required(handle, init)?) };
        let update: GameUpdateFn = unsafe { cast_symbol(required(handle, update)?) };
        let shutdown: GameShutdownFn = unsafe { cast_symbol(required(handle, shutdown)?) };

        let serialize = handle.symbol(symbols::GAME_SERIALIZE_STATE);
        let deserialize = handle.symbol(symbols::GAME_DESERIALIZE_STATE);

        let state_transfer = match (serialize, deserialize) {
            (Some(serialize), Some(deserialize)) => Some(StateTransfer {
                serialize: unsafe { cast_symbol(serialize) },
                deserialize: unsafe { cast_symbol(deserialize) },
            }),
            (None, None) => {
                log::warn!(
                    "Module '{}' exports no state serialization; reloads will start fresh",
                    module_name(handle)
                );
                None
            }
            (serialize, _) => {
                let missing = if serialize.is_none() {
                    symbols::GAME_SERIALIZE_STATE
                } else {
                    symbols::GAME_DESERIALIZE_STATE
                };
                log::warn!(
                    "Module '{}' is missing '{}'; reloads will start fresh",
                    module_name(handle),
                    missing
                );
                None
            }
        };

        Ok(Self {
            init,
            update,
            shutdown,
            state_transfer,
        })
    }

    /// Whether state can be carried across a reload
    pub fn has_state_transfer(&self) -> bool {
        self.state_transfer.is_some()
    }

    /// Call `GameInit`
    ///
    /// # Safety
    /// The module this table was resolved from must still be loaded, and
    /// `engine_api` must outlive the returned instance.
    pub(crate) unsafe fn init(&self, engine_api: *const EngineApi) -> Option<GameInstance> {
        GameInstance::from_raw((self.init)(engine_api))
    }

    /// Call `GameUpdate`
    ///
    /// # Safety
    /// The module must still be loaded and `instance` must come from it.
    pub(crate) unsafe fn update(&self, instance: &mut GameInstance, delta_time: f32) {
        (self.update)(instance.as_ptr(), delta_time)
    }

    /// Call `GameShutdown`, consuming the instance
    ///
    /// # Safety
    /// The module must still be loaded and `instance` must come from it.
    pub(crate) unsafe fn shutdown(&self, instance: GameInstance) {
        (self.shutdown)(instance.as_ptr())
    }

    /// Call `GameSerializeState`
    ///
    /// Returns `Ok(None)` when the module has no serialization support and
    /// an error when it has support but produced nothing.
    ///
    /// # Safety
    /// The module must still be loaded and `instance` must come from it.
    pub(crate) unsafe fn serialize(&self, instance: &GameInstance) -> Result<Option<SerializedState>> {
        let Some(transfer) = self.state_transfer else {
            return Ok(None);
        };

        let mut size = 0usize;
        let buffer = (transfer.serialize)(instance.as_ptr(), &mut size);
        if buffer.is_null() || size == 0 {
            free_state_buffer(buffer);
            return Err(HotloadError::SerializeFailure(format!(
                "{} returned {} bytes at {:?}",
                symbols::GAME_SERIALIZE_STATE,
                size,
                buffer
            )));
        }

        let bytes = std::slice::from_raw_parts(buffer as *const u8, size).to_vec();
        free_state_buffer(buffer);

        Ok(Some(SerializedState::new(bytes)))
    }

    /// Call `GameDeserializeState`
    ///
    /// `None` when the module has no deserializer or it returned null.
    ///
    /// # Safety
    /// The module must still be loaded, and `engine_api` must outlive the
    /// returned instance.
    pub(crate) unsafe fn deserialize(
        &self,
        engine_api: *const EngineApi,
        state: &SerializedState,
    ) -> Option<GameInstance> {
        let transfer = self.state_transfer?;
        let bytes = state.as_bytes();
        GameInstance::from_raw((transfer.deserialize)(
            engine_api,
            bytes.as_ptr() as *const c_void,
            bytes.len(),
        ))
    }
}

impl std::fmt::Debug for ModuleApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleApi")
            .field("state_transfer", &self.state_transfer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_state() {
        let state = SerializedState::new(vec![3, 0, 0, 0]);
        assert_eq!(state.len(), 4);
        assert!(!state.is_empty());
        assert_eq!(state.as_bytes(), &[3, 0, 0, 0]);
    }

    #[test]
    fn test_null_instance_rejected() {
        assert!(GameInstance::from_raw(std::ptr::null_mut()).is_none());
    }
}
