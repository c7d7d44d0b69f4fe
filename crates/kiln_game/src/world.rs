//! Tile world
//!
//! A grid of chunks, each `CHUNK_SIZE` x `CHUNK_SIZE` tiles. Tile types come
//! from host noise; chunks that changed since their last upload are marked
//! dirty and re-sent through `update_chunk_tiles`.

use kiln_abi::{log_level, EngineApi, RenderTile, CHUNK_SIZE, TILES_PER_CHUNK};

/// Noise value above which a tile is rock
pub const ROCK_THRESHOLD: f32 = 0.5;

/// Atlas columns; the atlas is one row of tile images
const ATLAS_COLUMNS: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TileType {
    #[default]
    Grass = 0,
    Rock = 1,
}

impl TileType {
    pub fn from_noise(value: f32) -> Self {
        if value > ROCK_THRESHOLD {
            TileType::Rock
        } else {
            TileType::Grass
        }
    }

    /// UV rectangle `(x, y, w, h)` of this tile in the atlas
    fn atlas_slot(self) -> (f32, f32, f32, f32) {
        let width = 1.0 / ATLAS_COLUMNS;
        (self as u8 as f32 * width, 0.0, width, 1.0)
    }
}

#[derive(Debug, Clone)]
pub struct Chunk {
    x: u32,
    y: u32,
    tiles: Vec<TileType>,
    dirty: bool,
}

impl Chunk {
    fn new(x: u32, y: u32) -> Self {
        Self {
            x,
            y,
            tiles: vec![TileType::Grass; TILES_PER_CHUNK as usize],
            dirty: true,
        }
    }

    pub fn position(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    pub fn tiles(&self) -> &[TileType] {
        &self.tiles
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Tiles in renderer layout, positioned in world space
    pub fn render_tiles(&self) -> Vec<RenderTile> {
        self.tiles
            .iter()
            .enumerate()
            .map(|(index, tile)| {
                let index = index as u32;
                let (slot_x, slot_y, slot_w, slot_h) = tile.atlas_slot();
                RenderTile {
                    x: (self.x * CHUNK_SIZE + index % CHUNK_SIZE) as f32,
                    y: (self.y * CHUNK_SIZE + index / CHUNK_SIZE) as f32,
                    z: 0.0,
                    scale_x: 1.0,
                    scale_y: 1.0,
                    frame_slot_x: slot_x,
                    frame_slot_y: slot_y,
                    frame_slot_w: slot_w,
                    frame_slot_h: slot_h,
                    texture_index: 0.0,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct World {
    width_in_chunks: u32,
    height_in_chunks: u32,
    chunks: Vec<Chunk>,
}

impl World {
    /// All-grass world; every chunk starts dirty
    pub fn new(width_in_chunks: u32, height_in_chunks: u32) -> Self {
        let mut chunks = Vec::with_capacity((width_in_chunks * height_in_chunks) as usize);
        for y in 0..height_in_chunks {
            for x in 0..width_in_chunks {
                chunks.push(Chunk::new(x, y));
            }
        }

        Self {
            width_in_chunks,
            height_in_chunks,
            chunks,
        }
    }

    /// Create the world and register its size with the host renderer
    pub fn init(api: &EngineApi, width_in_chunks: u32, height_in_chunks: u32) -> Self {
        api.init_world_rendering(width_in_chunks, height_in_chunks);
        let world = Self::new(width_in_chunks, height_in_chunks);
        api.log(
            log_level::INFO,
            &format!("World initialized: {}x{} chunks", width_in_chunks, height_in_chunks),
        );
        world
    }

    pub fn size_in_chunks(&self) -> (u32, u32) {
        (self.width_in_chunks, self.height_in_chunks)
    }

    pub fn chunk(&self, chunk_x: u32, chunk_y: u32) -> Option<&Chunk> {
        if chunk_x >= self.width_in_chunks || chunk_y >= self.height_in_chunks {
            return None;
        }
        self.chunks.get((chunk_y * self.width_in_chunks + chunk_x) as usize)
    }

    pub fn tile(&self, world_x: u32, world_y: u32) -> Option<TileType> {
        let chunk = self.chunk(world_x / CHUNK_SIZE, world_y / CHUNK_SIZE)?;
        let index = (world_y % CHUNK_SIZE) * CHUNK_SIZE + world_x % CHUNK_SIZE;
        chunk.tiles.get(index as usize).copied()
    }

    /// Assign tile types from a flat run of noise samples
    ///
    /// Samples fill chunks in storage order, `TILES_PER_CHUNK` per chunk;
    /// extra samples are ignored and chunks past the end keep their tiles.
    /// Every chunk is marked dirty.
    pub fn set_tile_data(&mut self, data: &[f32]) {
        for (chunk, samples) in self.chunks.iter_mut().zip(data.chunks(TILES_PER_CHUNK as usize)) {
            for (tile, &sample) in chunk.tiles.iter_mut().zip(samples) {
                *tile = TileType::from_noise(sample);
            }
        }
        for chunk in &mut self.chunks {
            chunk.dirty = true;
        }
    }

    pub fn dirty_chunks(&self) -> usize {
        self.chunks.iter().filter(|c| c.dirty).count()
    }

    /// Send every dirty chunk to the host and clear its flag
    ///
    /// Returns the number of chunks uploaded.
    pub fn upload_dirty_chunks(&mut self, api: &EngineApi) -> usize {
        let mut uploaded = 0;
        for chunk in self.chunks.iter_mut().filter(|c| c.dirty) {
            api.update_chunk_tiles(chunk.x, chunk.y, &chunk.render_tiles());
            chunk.dirty = false;
            uploaded += 1;
        }
        uploaded
    }
}
