//! # kiln_abi - Host/Module ABI
//!
//! The stable C contract between the Kiln host and a hot-reloadable game
//! module. The host resolves five fixed symbols from the module:
//!
//! | Symbol | Signature | Required |
//! |---|---|---|
//! | `GameInit` | `(const EngineApi*) -> GameInstance` | yes |
//! | `GameUpdate` | `(GameInstance, float) -> void` | yes |
//! | `GameShutdown` | `(GameInstance) -> void` | yes |
//! | `GameSerializeState` | `(GameInstance, size_t*) -> void*` | no |
//! | `GameDeserializeState` | `(const EngineApi*, const void*, size_t) -> GameInstance` | no |
//!
//! plus the optional `GameApiVersion() -> uint32_t` handshake.
//!
//! ## Module Side
//!
//! ```ignore
//! use kiln_abi::{export_game_module, EngineApi, GameModule};
//!
//! struct MyGame { score: u32 }
//!
//! impl GameModule for MyGame {
//!     fn init(_api: &EngineApi) -> Self { MyGame { score: 0 } }
//!     fn update(&mut self, api: &EngineApi, _dt: f32) {
//!         if api.is_key_start_press(kiln_abi::keys::SPACE) {
//!             self.score += 1;
//!         }
//!     }
//! }
//!
//! export_game_module!(MyGame);
//! ```

pub mod ffi;
pub mod module;

pub use ffi::*;
pub use module::GameModule;
