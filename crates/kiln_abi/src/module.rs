//! Module-side helpers
//!
//! A game module implements [`GameModule`] and invokes
//! [`export_game_module!`](crate::export_game_module) once. The macro emits
//! the C-linkage exports the host resolves by name.
//!
//! The boxed instance handed to the host carries the `EngineApi` pointer it
//! was created with, so `update` receives the API as an argument instead of
//! reading a process-global.

use crate::ffi::EngineApi;

/// Game logic hosted behind the module ABI
pub trait GameModule: Sized + 'static {
    /// Create a fresh instance
    fn init(api: &EngineApi) -> Self;

    /// Advance one fixed update tick
    fn update(&mut self, api: &EngineApi, delta_time: f32);

    /// Release resources before the instance is destroyed
    fn shutdown(&mut self, _api: &EngineApi) {}

    /// Capture state to carry across a reload
    ///
    /// `None` or an empty buffer means "nothing to carry"; the host then
    /// initializes the next instance from scratch.
    fn save_state(&self) -> Option<Vec<u8>> {
        None
    }

    /// Rebuild an instance from a buffer produced by [`save_state`](Self::save_state)
    ///
    /// Returning `None` falls back to [`init`](Self::init).
    fn restore_state(_api: &EngineApi, _data: &[u8]) -> Option<Self> {
        None
    }
}

/// Export a [`GameModule`] under the fixed symbol names
///
/// `export_game_module!(MyGame)` exports `GameInit`, `GameUpdate`,
/// `GameShutdown` and `GameApiVersion`. Add `with_state` to also export
/// `GameSerializeState` / `GameDeserializeState`.
#[macro_export]
macro_rules! export_game_module {
    ($game:ty) => {
        #[no_mangle]
        #[allow(non_snake_case)]
        pub extern "C" fn GameApiVersion() -> u32 {
            $crate::KILN_ABI_VERSION
        }

        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe extern "C" fn GameInit(
            api: *const $crate::EngineApi,
        ) -> *mut ::std::ffi::c_void {
            $crate::module::__private::init::<$game>(api)
        }

        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe extern "C" fn GameUpdate(instance: *mut ::std::ffi::c_void, delta_time: f32) {
            $crate::module::__private::update::<$game>(instance, delta_time)
        }

        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe extern "C" fn GameShutdown(instance: *mut ::std::ffi::c_void) {
            $crate::module::__private::shutdown::<$game>(instance)
        }
    };
    ($game:ty, with_state) => {
        $crate::export_game_module!($game);

        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe extern "C" fn GameSerializeState(
            instance: *mut ::std::ffi::c_void,
            out_size: *mut usize,
        ) -> *mut ::std::ffi::c_void {
            $crate::module::__private::serialize_state::<$game>(instance, out_size)
        }

        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe extern "C" fn GameDeserializeState(
            api: *const $crate::EngineApi,
            data: *const ::std::ffi::c_void,
            size: usize,
        ) -> *mut ::std::ffi::c_void {
            $crate::module::__private::deserialize_state::<$game>(api, data, size)
        }
    };
}

#[doc(hidden)]
pub mod __private {
    use super::GameModule;
    use crate::ffi::{alloc_state_buffer, log_level, EngineApi};
    use std::ffi::c_void;
    use std::ptr;

    /// What the opaque instance pointer really points at
    pub struct Hosted<T> {
        api: *const EngineApi,
        game: T,
    }

    fn into_instance<T: GameModule>(api: *const EngineApi, game: T) -> *mut c_void {
        Box::into_raw(Box::new(Hosted { api, game })) as *mut c_void
    }

    pub unsafe fn init<T: GameModule>(api: *const EngineApi) -> *mut c_void {
        let Some(api_ref) = api.as_ref() else {
            return ptr::null_mut();
        };
        into_instance(api, T::init(api_ref))
    }

    pub unsafe fn update<T: GameModule>(instance: *mut c_void, delta_time: f32) {
        let Some(hosted) = (instance as *mut Hosted<T>).as_mut() else {
            return;
        };
        let api = &*hosted.api;
        hosted.game.update(api, delta_time);
    }

    pub unsafe fn shutdown<T: GameModule>(instance: *mut c_void) {
        if instance.is_null() {
            return;
        }
        let mut hosted = Box::from_raw(instance as *mut Hosted<T>);
        let api = &*hosted.api;
        hosted.game.shutdown(api);
    }

    pub unsafe fn serialize_state<T: GameModule>(
        instance: *mut c_void,
        out_size: *mut usize,
    ) -> *mut c_void {
        if out_size.is_null() {
            return ptr::null_mut();
        }
        *out_size = 0;

        let Some(hosted) = (instance as *const Hosted<T>).as_ref() else {
            return ptr::null_mut();
        };
        let Some(bytes) = hosted.game.save_state() else {
            return ptr::null_mut();
        };

        let buffer = alloc_state_buffer(&bytes);
        if !buffer.is_null() {
            *out_size = bytes.len();
        }
        buffer
    }

    pub unsafe fn deserialize_state<T: GameModule>(
        api: *const EngineApi,
        data: *const c_void,
        size: usize,
    ) -> *mut c_void {
        let Some(api_ref) = api.as_ref() else {
            return ptr::null_mut();
        };
        let bytes: &[u8] = if data.is_null() || size == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(data as *const u8, size)
        };

        let game = match T::restore_state(api_ref, bytes) {
            Some(game) => game,
            None => {
                api_ref.log(
                    log_level::WARN,
                    &format!("Could not restore {} bytes of state, starting fresh", size),
                );
                T::init(api_ref)
            }
        };
        into_instance(api, game)
    }
}

#[cfg(test)]
mod tests {
    use super::__private;
    use super::GameModule;
    use crate::ffi::{free_state_buffer, EngineApi};
    use std::ffi::c_void;

    struct Counter {
        ticks: u32,
    }

    impl GameModule for Counter {
        fn init(_api: &EngineApi) -> Self {
            Counter { ticks: 0 }
        }

        fn update(&mut self, _api: &EngineApi, _delta_time: f32) {
            self.ticks += 1;
        }

        fn save_state(&self) -> Option<Vec<u8>> {
            Some(self.ticks.to_le_bytes().to_vec())
        }

        fn restore_state(_api: &EngineApi, data: &[u8]) -> Option<Self> {
            let bytes: [u8; 4] = data.try_into().ok()?;
            Some(Counter { ticks: u32::from_le_bytes(bytes) })
        }
    }

    #[test]
    fn test_state_survives_instance_swap() {
        let api = EngineApi::default();
        unsafe {
            let first = __private::init::<Counter>(&api);
            assert!(!first.is_null());
            __private::update::<Counter>(first, 0.016);
            __private::update::<Counter>(first, 0.016);

            let mut size = 0usize;
            let buffer = __private::serialize_state::<Counter>(first, &mut size);
            assert_eq!(size, 4);
            __private::shutdown::<Counter>(first);

            let second = __private::deserialize_state::<Counter>(&api, buffer as *const c_void, size);
            free_state_buffer(buffer);

            let mut size = 0usize;
            let buffer = __private::serialize_state::<Counter>(second, &mut size);
            let ticks = std::slice::from_raw_parts(buffer as *const u8, size);
            assert_eq!(ticks, &2u32.to_le_bytes());
            free_state_buffer(buffer);
            __private::shutdown::<Counter>(second);
        }
    }

    #[test]
    fn test_bad_state_falls_back_to_init() {
        let api = EngineApi::default();
        unsafe {
            let junk = [1u8, 2, 3];
            let instance =
                __private::deserialize_state::<Counter>(&api, junk.as_ptr() as *const c_void, junk.len());
            assert!(!instance.is_null());

            let mut size = 0usize;
            let buffer = __private::serialize_state::<Counter>(instance, &mut size);
            let ticks = std::slice::from_raw_parts(buffer as *const u8, size);
            assert_eq!(ticks, &0u32.to_le_bytes());
            free_state_buffer(buffer);
            __private::shutdown::<Counter>(instance);
        }
    }

    #[test]
    fn test_null_api_yields_null_instance() {
        unsafe {
            assert!(__private::init::<Counter>(std::ptr::null()).is_null());
            __private::update::<Counter>(std::ptr::null_mut(), 0.016);
            __private::shutdown::<Counter>(std::ptr::null_mut());
        }
    }
}
