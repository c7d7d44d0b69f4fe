//! Host loop
//!
//! Fixed-timestep driver around the reload coordinator. Each frame:
//!
//! 1. drain stdin commands
//! 2. service a pending reload (explicit or from the file watcher)
//! 3. run as many fixed update ticks as the accumulator holds
//! 4. present a headless frame when the frame accumulator is due
//!
//! Module failures never stop the loop; with no module loaded the update
//! ticks simply do nothing.

use crate::config::{HostConfig, KilnConfig};
use crate::engine_api::{build_engine_api, EngineServices, SharedServices};
use crate::error::Result;
use crate::input::{Command, HELP};
use crossbeam_channel::Receiver;
use kiln_hotload::{LibraryLoader, NativeLoader, ReloadCoordinator};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "hot-reload")]
use kiln_hotload::ModuleWatcher;

/// Longest frame the accumulators will absorb; anything above is dropped
/// so a stall (debugger, long reload) does not trigger a burst of updates
const MAX_FRAME_TIME: Duration = Duration::from_millis(250);

/// Counters reported by `status`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    pub updates: u64,
    pub frames: u64,
    pub reload_requests: u64,
}

pub struct Host<L: LibraryLoader = NativeLoader> {
    // Dropped before `services`: the module holds a pointer into it
    coordinator: ReloadCoordinator<L>,
    #[cfg(feature = "hot-reload")]
    watcher: Option<ModuleWatcher>,
    services: SharedServices,
    commands: Receiver<Command>,
    running: Arc<AtomicBool>,
    update_step: Duration,
    frame_step: Duration,
    update_accumulator: Duration,
    frame_accumulator: Duration,
    reload_requested: bool,
    stats: HostStats,
}

impl Host<NativeLoader> {
    /// Host for the module named in `config`, loaded with the OS linker
    pub fn new(config: &KilnConfig, commands: Receiver<Command>, running: Arc<AtomicBool>) -> Result<Self> {
        Self::with_loader(NativeLoader::new(), config, commands, running)
    }
}

impl<L: LibraryLoader> Host<L> {
    pub fn with_loader(
        loader: L,
        config: &KilnConfig,
        commands: Receiver<Command>,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        config.validate()?;

        let services = EngineServices::new(config.host.noise_seed, config.host.noise_frequency).shared();
        let engine_api = build_engine_api(&services);
        let module_path = config.module_path();

        #[cfg(feature = "hot-reload")]
        let watcher = if config.reload.watch {
            match ModuleWatcher::new(&module_path, config.reload.debounce()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    log::warn!("Hot-reload watcher unavailable, use 'r' to reload: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let coordinator = ReloadCoordinator::new(loader, module_path, config.reload.clone(), engine_api);
        let (update_step, frame_step) = steps(&config.host);

        Ok(Self {
            coordinator,
            #[cfg(feature = "hot-reload")]
            watcher,
            services,
            commands,
            running,
            update_step,
            frame_step,
            update_accumulator: Duration::ZERO,
            frame_accumulator: Duration::ZERO,
            reload_requested: false,
            stats: HostStats::default(),
        })
    }

    pub fn coordinator(&self) -> &ReloadCoordinator<L> {
        &self.coordinator
    }

    pub fn services(&self) -> &SharedServices {
        &self.services
    }

    pub fn stats(&self) -> HostStats {
        self.stats
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask for a reload at the start of the next frame
    pub fn request_reload(&mut self) {
        self.reload_requested = true;
    }

    /// Initial load; a missing or broken module is logged, not fatal
    pub fn start(&mut self) {
        if self.coordinator.load().is_err() {
            log::warn!(
                "Running without a game module; rebuild it or press 'r' to retry"
            );
        }
    }

    /// Run until stopped, then unload
    pub fn run(&mut self) {
        self.start();

        let mut last = Instant::now();
        while self.is_running() {
            let now = Instant::now();
            self.frame(now - last);
            last = now;

            // Sleep until the earlier of the next update or frame
            let until_update = self.update_step.saturating_sub(self.update_accumulator);
            let until_frame = self.frame_step.saturating_sub(self.frame_accumulator);
            let wait = until_update.min(until_frame);
            if !wait.is_zero() {
                thread::sleep(wait);
            }
        }

        self.shutdown();
    }

    /// One iteration of the loop, `elapsed` after the previous one
    pub fn frame(&mut self, elapsed: Duration) {
        self.handle_commands();
        if !self.is_running() {
            return;
        }

        #[cfg(feature = "hot-reload")]
        if let Some(watcher) = self.watcher.as_mut() {
            if watcher.poll() {
                log::info!("Module file changed");
                self.reload_requested = true;
            }
        }

        if std::mem::take(&mut self.reload_requested) {
            self.stats.reload_requests += 1;
            self.coordinator.trigger_reload();
        }

        let elapsed = elapsed.min(MAX_FRAME_TIME);
        self.update_accumulator += elapsed;
        self.frame_accumulator += elapsed;

        while self.update_accumulator >= self.update_step {
            self.update_accumulator -= self.update_step;
            self.tick();
        }

        if self.frame_accumulator >= self.frame_step {
            self.frame_accumulator = Duration::ZERO;
            self.services.lock().render.present();
            self.stats.frames += 1;
        }
    }

    /// One fixed update tick
    fn tick(&mut self) {
        // The lock must be released before the module runs; its callbacks
        // take it again
        self.services.lock().input.advance();
        self.coordinator.update(self.update_step.as_secs_f32());
        self.stats.updates += 1;
    }

    fn handle_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Reload => self.reload_requested = true,
                Command::Quit => {
                    log::info!("Quit requested");
                    self.running.store(false, Ordering::SeqCst);
                }
                Command::Status => self.log_status(),
                Command::Help => log::info!("{}", HELP),
                Command::Tap(key) => self.services.lock().input.tap(key),
            }
        }
    }

    fn log_status(&self) {
        let (uploads, world_size, chunks) = {
            let services = self.services.lock();
            let render = &services.render;
            (render.uploads, render.world_size, render.chunks.len())
        };
        log::info!(
            "Module {:?} ({}), reloads: {}, last failure: {}",
            self.coordinator.state(),
            self.coordinator.module_path().display(),
            self.coordinator.reload_count(),
            self.coordinator
                .last_failure()
                .map(|kind| kind.to_string())
                .unwrap_or_else(|| "none".into())
        );
        log::info!(
            "Updates: {}, frames: {}, chunk uploads: {}",
            self.stats.updates,
            self.stats.frames,
            uploads
        );
        if let Some((width, height)) = world_size {
            log::info!("World: {}x{} chunks, {} drawn", width, height, chunks);
        }
    }

    /// Final unload and orphan sweep
    pub fn shutdown(&mut self) {
        log::info!("Shutting down");
        self.coordinator.unload();
    }
}

fn steps(config: &HostConfig) -> (Duration, Duration) {
    (
        Duration::from_secs_f64(1.0 / f64::from(config.updates_per_second.max(1))),
        Duration::from_secs_f64(1.0 / f64::from(config.frames_per_second.max(1))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{unbounded, Sender};
    use kiln_abi::keys;
    use kiln_hotload::ModuleState;

    fn host(dir: &std::path::Path) -> (Host, Sender<Command>) {
        let mut config = KilnConfig::default();
        config.module.directory = dir.to_path_buf();
        config.reload = kiln_hotload::ReloadConfig::immediate();
        config.reload.watch = false;
        config.host.noise_seed = Some(1);

        let (tx, rx) = unbounded();
        let host = Host::new(&config, rx, Arc::new(AtomicBool::new(true))).unwrap();
        (host, tx)
    }

    #[test]
    fn test_runs_without_module() {
        let dir = tempfile::tempdir().unwrap();
        let (mut host, _tx) = host(dir.path());

        host.start();
        assert_eq!(host.coordinator().state(), ModuleState::Unloaded);

        // Just over 100ms at 60Hz
        host.frame(Duration::from_millis(101));
        assert_eq!(host.stats().updates, 6);
        assert_eq!(host.stats().frames, 1);
    }

    #[test]
    fn test_stall_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let (mut host, _tx) = host(dir.path());

        host.frame(Duration::from_secs(10));
        // 250ms worth at most
        assert!((14..=15).contains(&host.stats().updates));
    }

    #[test]
    fn test_commands() {
        let dir = tempfile::tempdir().unwrap();
        let (mut host, tx) = host(dir.path());

        tx.send(Command::Tap(keys::SPACE)).unwrap();
        tx.send(Command::Reload).unwrap();
        tx.send(Command::Status).unwrap();
        host.frame(Duration::from_millis(17));

        assert_eq!(host.stats().reload_requests, 1);
        assert_eq!(host.stats().updates, 1);
        assert!(host.services().lock().input.is_key_start_press(keys::SPACE));
        assert!(host.is_running());

        tx.send(Command::Quit).unwrap();
        host.frame(Duration::from_millis(17));
        assert!(!host.is_running());
        assert_eq!(host.stats().updates, 1);
    }

    #[test]
    fn test_broken_module_is_survivable() {
        let dir = tempfile::tempdir().unwrap();
        let module = kiln_hotload::module_path(dir.path(), "kiln_game");
        std::fs::write(&module, b"not a library").unwrap();
        let (mut host, _tx) = host(dir.path());

        host.start();
        host.request_reload();
        host.frame(Duration::from_millis(17));

        assert_eq!(host.coordinator().state(), ModuleState::Unloaded);
        assert!(host.coordinator().last_failure().is_some());
        host.shutdown();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_steps() {
        let config = HostConfig {
            updates_per_second: 50,
            frames_per_second: 25,
            ..HostConfig::default()
        };
        let (update, frame) = steps(&config);
        assert_eq!(update, Duration::from_millis(20));
        assert_eq!(frame, Duration::from_millis(40));
    }
}
