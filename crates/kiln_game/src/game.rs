//! Game state and per-tick logic

use crate::world::World;
use kiln_abi::{keys, log_level, EngineApi, GameModule};
use serde::{Deserialize, Serialize};

/// World size in chunks along each axis
pub const WORLD_CHUNKS: u32 = 10;

/// Side length of the noise field sampled at init
pub const NOISE_SIZE: u32 = 128;

/// State that survives a reload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameData {
    pub button_presses: i32,
}

impl GameData {
    fn encode(&self) -> Option<Vec<u8>> {
        bincode::serialize(self).ok()
    }

    /// Decode a buffer from [`encode`](Self::encode); trailing bytes are rejected
    fn decode(bytes: &[u8]) -> Option<Self> {
        let data: GameData = bincode::deserialize(bytes).ok()?;
        let expected = bincode::serialized_size(&data).ok()?;
        (expected == bytes.len() as u64).then_some(data)
    }
}

pub struct Game {
    world: World,
    data: GameData,
}

impl Game {
    pub fn data(&self) -> GameData {
        self.data
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    fn print_data(&self, api: &EngineApi) {
        api.log(
            log_level::INFO,
            &format!("We have {} button presses.", self.data.button_presses),
        );
    }
}

impl GameModule for Game {
    fn init(api: &EngineApi) -> Self {
        api.log(log_level::WARN, "Game init");

        let mut world = World::init(api, WORLD_CHUNKS, WORLD_CHUNKS);

        let mut noise = vec![0.0; (NOISE_SIZE * NOISE_SIZE) as usize];
        api.noise_2d(NOISE_SIZE, NOISE_SIZE, &mut noise);
        world.set_tile_data(&noise);
        let uploaded = world.upload_dirty_chunks(api);

        api.log(
            log_level::INFO,
            &format!("World generated, {} chunks uploaded", uploaded),
        );

        Game {
            world,
            data: GameData::default(),
        }
    }

    fn update(&mut self, api: &EngineApi, _delta_time: f32) {
        if api.is_key_start_press(keys::Q) {
            self.data.button_presses += 1;
            self.print_data(api);
        }

        self.world.upload_dirty_chunks(api);
    }

    fn shutdown(&mut self, api: &EngineApi) {
        api.log(log_level::WARN, "Game shutdown");
    }

    fn save_state(&self) -> Option<Vec<u8>> {
        self.data.encode()
    }

    fn restore_state(api: &EngineApi, bytes: &[u8]) -> Option<Self> {
        let data = GameData::decode(bytes)?;
        let mut game = Game::init(api);
        game.data = data;
        game.print_data(api);
        api.log(log_level::INFO, "Restored game state from serialized data");
        Some(game)
    }
}
