//! # kiln_game - Reference Game Module
//!
//! Built as a `cdylib` and loaded by the Kiln host. Generates a noise tile
//! world at init and counts `Q` presses; the press count survives reloads.
//!
//! Rebuild while the host runs (`cargo build -p kiln_game`) and the host
//! swaps in the new code without losing the count.

pub mod game;
pub mod world;

pub use game::{Game, GameData};
pub use world::{Chunk, TileType, World};

kiln_abi::export_game_module!(Game, with_state);
