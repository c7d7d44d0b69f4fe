//! Host side of the `EngineApi`
//!
//! [`EngineServices`] holds everything a module can reach. It lives in an
//! `Arc<Mutex<_>>` whose address becomes the table's `context`, and each
//! callback is an `extern "C"` trampoline that locks it for the duration of
//! one call.

use crate::input::InputState;
use kiln_abi::{c_str_lossy, log_level, EngineApi, RenderTile};
use noise::{NoiseFn, OpenSimplex};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Log target for messages sent by the game module
pub const MODULE_LOG_TARGET: &str = "kiln_game";

/// Headless stand-in for the renderer
///
/// Records what the module asked to draw.
#[derive(Debug, Default)]
pub struct RenderSink {
    /// World size in chunks, from the last `init_world_rendering`
    pub world_size: Option<(u32, u32)>,
    /// Tiles last uploaded per chunk
    pub chunks: HashMap<(u32, u32), Vec<RenderTile>>,
    /// Chunk uploads since start
    pub uploads: u64,
    /// Frames presented since start
    pub frames: u64,
}

impl RenderSink {
    pub fn init_world(&mut self, width_in_chunks: u32, height_in_chunks: u32) {
        log::info!("World rendering initialized: {}x{} chunks", width_in_chunks, height_in_chunks);
        self.world_size = Some((width_in_chunks, height_in_chunks));
        self.chunks.clear();
    }

    pub fn upload_chunk(&mut self, chunk_x: u32, chunk_y: u32, tiles: &[RenderTile]) {
        if let Some((width, height)) = self.world_size {
            if chunk_x >= width || chunk_y >= height {
                log::warn!("Ignoring upload for chunk ({}, {}) outside the world", chunk_x, chunk_y);
                return;
            }
        }
        self.chunks.insert((chunk_x, chunk_y), tiles.to_vec());
        self.uploads += 1;
    }

    pub fn present(&mut self) {
        self.frames += 1;
    }
}

/// Everything reachable through the `EngineApi`
pub struct EngineServices {
    pub input: InputState,
    pub render: RenderSink,
    noise: OpenSimplex,
    noise_frequency: f64,
    started: Instant,
}

/// Services shared between the host loop and the API trampolines
pub type SharedServices = Arc<Mutex<EngineServices>>;

impl EngineServices {
    /// `seed` of `None` picks one from the clock
    pub fn new(seed: Option<u32>, noise_frequency: f64) -> Self {
        let seed = seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.subsec_nanos() ^ d.as_secs() as u32)
                .unwrap_or(0)
        });
        log::debug!("Noise seed {}", seed);

        Self {
            input: InputState::new(),
            render: RenderSink::default(),
            noise: OpenSimplex::new(seed),
            noise_frequency,
            started: Instant::now(),
        }
    }

    pub fn shared(self) -> SharedServices {
        Arc::new(Mutex::new(self))
    }

    /// Fill `out` row-major with noise in `[-1, 1]`
    pub fn noise_2d(&self, width: u32, height: u32, out: &mut [f32]) {
        let width = width as usize;
        for (index, value) in out.iter_mut().enumerate().take(width * height as usize) {
            let x = (index % width) as f64 * self.noise_frequency;
            let y = (index / width) as f64 * self.noise_frequency;
            *value = self.noise.get([x, y]) as f32;
        }
    }

    /// Seconds since the services were created
    pub fn total_time(&self) -> f32 {
        self.started.elapsed().as_secs_f32()
    }
}

/// Build the table handed to the module
///
/// The table borrows `services` by raw pointer: the caller must keep the
/// `Arc` alive for as long as any module instance may use the table.
pub fn build_engine_api(services: &SharedServices) -> EngineApi {
    EngineApi {
        context: Arc::as_ptr(services) as *mut c_void,
        log: Some(api_log),
        init_world_rendering: Some(api_init_world_rendering),
        update_chunk_tiles: Some(api_update_chunk_tiles),
        get_noise_2d: Some(api_get_noise_2d),
        is_key_down: Some(api_is_key_down),
        is_key_start_press: Some(api_is_key_start_press),
        is_key_end_press: Some(api_is_key_end_press),
        get_mouse_position: Some(api_get_mouse_position),
        is_mouse_button_down: Some(api_is_mouse_button_down),
        get_total_time: Some(api_get_total_time),
    }
}

/// # Safety
/// `context` must be the pointer set by [`build_engine_api`], still alive.
unsafe fn services<'a>(context: *mut c_void) -> Option<&'a Mutex<EngineServices>> {
    (context as *const Mutex<EngineServices>).as_ref()
}

fn level_from_abi(level: c_int) -> log::Level {
    match level {
        log_level::ERROR => log::Level::Error,
        log_level::WARN => log::Level::Warn,
        log_level::INFO => log::Level::Info,
        log_level::DEBUG => log::Level::Debug,
        _ => log::Level::Trace,
    }
}

unsafe extern "C" fn api_log(_context: *mut c_void, level: c_int, message: *const c_char) {
    let message = c_str_lossy(message);
    log::log!(target: MODULE_LOG_TARGET, level_from_abi(level), "{}", message);
}

unsafe extern "C" fn api_init_world_rendering(context: *mut c_void, width: u32, height: u32) {
    if let Some(services) = services(context) {
        services.lock().render.init_world(width, height);
    }
}

unsafe extern "C" fn api_update_chunk_tiles(
    context: *mut c_void,
    chunk_x: u32,
    chunk_y: u32,
    tiles: *const RenderTile,
    count: u32,
) {
    let Some(services) = services(context) else { return };
    let tiles: &[RenderTile] = if tiles.is_null() || count == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(tiles, count as usize)
    };
    services.lock().render.upload_chunk(chunk_x, chunk_y, tiles);
}

unsafe extern "C" fn api_get_noise_2d(context: *mut c_void, width: u32, height: u32, out: *mut f32) {
    let Some(services) = services(context) else { return };
    if out.is_null() {
        return;
    }
    let out = std::slice::from_raw_parts_mut(out, width as usize * height as usize);
    services.lock().noise_2d(width, height, out);
}

unsafe extern "C" fn api_is_key_down(context: *mut c_void, key: c_int) -> c_int {
    services(context).map_or(0, |s| s.lock().input.is_key_down(key) as c_int)
}

unsafe extern "C" fn api_is_key_start_press(context: *mut c_void, key: c_int) -> c_int {
    services(context).map_or(0, |s| s.lock().input.is_key_start_press(key) as c_int)
}

unsafe extern "C" fn api_is_key_end_press(context: *mut c_void, key: c_int) -> c_int {
    services(context).map_or(0, |s| s.lock().input.is_key_end_press(key) as c_int)
}

unsafe extern "C" fn api_get_mouse_position(context: *mut c_void, out_x: *mut f32, out_y: *mut f32) {
    let (x, y) = services(context).map_or((0.0, 0.0), |s| s.lock().input.mouse_position());
    if let Some(out_x) = out_x.as_mut() {
        *out_x = x;
    }
    if let Some(out_y) = out_y.as_mut() {
        *out_y = y;
    }
}

unsafe extern "C" fn api_is_mouse_button_down(context: *mut c_void, button: c_int) -> c_int {
    services(context).map_or(0, |s| s.lock().input.is_mouse_button_down(button) as c_int)
}

unsafe extern "C" fn api_get_total_time(context: *mut c_void) -> f32 {
    services(context).map_or(0.0, |s| s.lock().total_time())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_abi::{keys, TILES_PER_CHUNK};

    fn setup() -> (SharedServices, EngineApi) {
        let services = EngineServices::new(Some(7), 0.1).shared();
        let api = build_engine_api(&services);
        (services, api)
    }

    #[test]
    fn test_key_edges_through_api() {
        let (services, api) = setup();
        services.lock().input.tap(keys::Q);
        services.lock().input.advance();

        assert!(api.is_key_start_press(keys::Q));
        assert!(api.is_key_down(keys::Q));
        assert!(!api.is_key_start_press(keys::SPACE));

        services.lock().input.advance();
        assert!(api.is_key_end_press(keys::Q));
    }

    #[test]
    fn test_noise_is_seeded() {
        let (_services, api) = setup();
        let mut first = vec![0.0; 64];
        let mut second = vec![0.0; 64];
        api.noise_2d(8, 8, &mut first);
        EngineServices::new(Some(7), 0.1).noise_2d(8, 8, &mut second);

        assert_eq!(first, second);
        assert!(first.iter().all(|v| (-1.0..=1.0).contains(v)));
        assert!(first.iter().any(|v| *v != 0.0));
    }

    #[test]
    fn test_render_sink_records_uploads() {
        let (services, api) = setup();
        api.init_world_rendering(2, 2);
        api.update_chunk_tiles(1, 1, &vec![RenderTile::default(); TILES_PER_CHUNK as usize]);
        api.update_chunk_tiles(5, 0, &[RenderTile::default()]);

        let services = services.lock();
        assert_eq!(services.render.world_size, Some((2, 2)));
        assert_eq!(services.render.uploads, 1);
        assert_eq!(services.render.chunks[&(1, 1)].len(), TILES_PER_CHUNK as usize);
    }

    #[test]
    fn test_mouse_and_time() {
        let (services, api) = setup();
        services.lock().input.set_mouse_position(10.0, 20.0);
        services.lock().input.set_mouse_button(1, true);

        assert_eq!(api.mouse_position(), (10.0, 20.0));
        assert!(api.is_mouse_button_down(1));
        assert!(api.total_time() >= 0.0);
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(level_from_abi(log_level::ERROR), log::Level::Error);
        assert_eq!(level_from_abi(log_level::INFO), log::Level::Info);
        assert_eq!(level_from_abi(99), log::Level::Trace);
        let (_services, api) = setup();
        api.log(log_level::INFO, "hello from the module");
    }
}
