//! Reload coordinator
//!
//! Owns the one loaded module (handle, ABI table, temp copy and game
//! instance, as a single unit) and drives the load, reload and unload
//! sequences. Every failure resolves to one of two outcomes: module loaded
//! and ready, or nothing loaded and ready to retry.

use crate::api_table::{GameInstance, ModuleApi, SerializedState};
use crate::config::ReloadConfig;
use crate::error::{FailureKind, HotloadError, Result};
use crate::library::{LibraryLoader, ModuleHandle, NativeLoader};
use crate::orphan::sweep_orphans;
use crate::temp_copy::{load_for_hot_reload, TempCopy};
use kiln_abi::EngineApi;
use std::path::{Path, PathBuf};
use std::thread;

/// Lifecycle state of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// No module loaded; `update` does nothing
    Unloaded,
    /// Module loaded with a live instance
    Loaded,
    /// Inside `reload`; never observable between calls
    Reloading,
}

/// A loaded module copy together with everything resolved from it
struct LoadedModule {
    handle: ModuleHandle,
    api: ModuleApi,
    temp: TempCopy,
    instance: Option<GameInstance>,
}

/// Drives the module lifecycle
///
/// ```text
/// Unloaded --load--> Loaded --reload--> (Reloading) --> Loaded | Unloaded
///     ^                 |
///     +-----unload------+
/// ```
pub struct ReloadCoordinator<L: LibraryLoader = NativeLoader> {
    /// Loader used for every copy
    loader: L,
    /// Canonical module file; only ever read
    module_path: PathBuf,
    /// Timing and retry policy
    config: ReloadConfig,
    /// Host services, boxed so its address is stable across reloads
    engine_api: Box<EngineApi>,
    /// The loaded module, if any
    module: Option<LoadedModule>,
    /// Current state
    state: ModuleState,
    /// Classification of the most recent failure
    last_failure: Option<FailureKind>,
    /// Successful reloads so far
    reload_count: u64,
    /// Whether the startup orphan sweep has run
    swept: bool,
}

impl ReloadCoordinator<NativeLoader> {
    /// Coordinator using the OS dynamic linker
    pub fn native(module_path: impl Into<PathBuf>, config: ReloadConfig, engine_api: EngineApi) -> Self {
        Self::new(NativeLoader::new(), module_path, config, engine_api)
    }
}

impl<L: LibraryLoader> ReloadCoordinator<L> {
    /// Create a coordinator; nothing is loaded until [`load`](Self::load)
    pub fn new(
        loader: L,
        module_path: impl Into<PathBuf>,
        config: ReloadConfig,
        engine_api: EngineApi,
    ) -> Self {
        Self {
            loader,
            module_path: module_path.into(),
            config,
            engine_api: Box::new(engine_api),
            module: None,
            state: ModuleState::Unloaded,
            last_failure: None,
            reload_count: 0,
            swept: false,
        }
    }

    // ========== Queries ==========

    /// Current lifecycle state
    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Whether a module with a live instance is loaded
    pub fn is_loaded(&self) -> bool {
        self.state == ModuleState::Loaded
    }

    /// Classification of the most recent failure
    ///
    /// Cleared by every successful load or reload.
    pub fn last_failure(&self) -> Option<FailureKind> {
        self.last_failure
    }

    /// Number of successful reloads
    pub fn reload_count(&self) -> u64 {
        self.reload_count
    }

    /// Whether the loaded module can carry state across a reload
    pub fn has_state_transfer(&self) -> bool {
        self.module
            .as_ref()
            .map(|m| m.api.has_state_transfer())
            .unwrap_or(false)
    }

    /// Path of the temp copy currently loaded
    pub fn temp_path(&self) -> Option<&Path> {
        self.module.as_ref().map(|m| m.temp.path())
    }

    /// Canonical module file
    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    /// Reload policy
    pub fn config(&self) -> &ReloadConfig {
        &self.config
    }

    /// The loader
    pub fn loader(&self) -> &L {
        &self.loader
    }

    fn engine_api_ptr(&self) -> *const EngineApi {
        &*self.engine_api
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.last_failure = None,
            Err(e) => self.last_failure = Some(e.kind()),
        }
        result
    }

    // ========== Lifecycle ==========

    /// Load the module and create its first instance via `GameInit`
    ///
    /// The first call also sweeps orphaned copies left by earlier processes.
    pub fn load(&mut self) -> Result<()> {
        if self.module.is_some() {
            return Err(HotloadError::InvalidState(format!(
                "module '{}' is already loaded",
                self.module_path.display()
            )));
        }

        self.sweep_at_startup();

        let result = self.open_module().and_then(|module| self.start_instance(module, None));
        let result = self.record(result);

        match &result {
            Ok(()) => log::info!("Loaded module '{}'", self.module_path.display()),
            Err(e) => log::error!("Failed to load module '{}': {}", self.module_path.display(), e),
        }
        result
    }

    /// Swap the running module for a fresh copy of the canonical file
    ///
    /// State is serialized from the old instance when possible and handed to
    /// `GameDeserializeState` on the new one; otherwise the new instance comes
    /// from `GameInit`. On failure the coordinator is left unloaded.
    pub fn reload(&mut self) -> Result<()> {
        self.sweep_at_startup();
        self.state = ModuleState::Reloading;
        log::info!("Reloading module '{}'", self.module_path.display());

        let saved = self.capture_state();

        if let Some(module) = self.module.take() {
            self.teardown(module);
        }

        let result = self
            .open_module_with_retry()
            .and_then(|module| self.start_instance(module, saved));
        let result = self.record(result);

        match &result {
            Ok(()) => {
                self.reload_count += 1;
                log::info!(
                    "Reloaded module '{}' (reload #{})",
                    self.module_path.display(),
                    self.reload_count
                );
            }
            Err(e) => {
                self.state = ModuleState::Unloaded;
                log::error!(
                    "Reload of '{}' failed, module offline until next reload: {}",
                    self.module_path.display(),
                    e
                );
            }
        }
        result
    }

    /// Reload, logging the outcome instead of returning it
    ///
    /// Callers that need the outcome check [`state`](Self::state) and
    /// [`last_failure`](Self::last_failure) afterwards.
    pub fn trigger_reload(&mut self) {
        // Outcome already logged by reload()
        let _ = self.reload();
    }

    /// Run one update tick of the game
    ///
    /// The update entry point is taken from the live table on every call.
    /// Without a loaded module this does nothing.
    pub fn update(&mut self, delta_time: f32) {
        if let Some(module) = self.module.as_mut() {
            if let Some(instance) = module.instance.as_mut() {
                unsafe { module.api.update(instance, delta_time) };
            }
        }
    }

    /// Shut down the instance, unload the module and remove its copy
    ///
    /// Also sweeps any orphaned copies. Safe to call when nothing is loaded.
    pub fn unload(&mut self) {
        if let Some(module) = self.module.take() {
            self.teardown(module);
            log::info!("Unloaded module '{}'", self.module_path.display());
        }
        self.state = ModuleState::Unloaded;

        let sweep = sweep_orphans(&self.module_path);
        if !sweep.removed.is_empty() {
            log::info!("Removed {} orphaned module copies at shutdown", sweep.removed.len());
        }
    }

    // ========== Steps ==========

    /// Sweep copies left by earlier processes, once per coordinator
    fn sweep_at_startup(&mut self) {
        if self.swept {
            return;
        }
        self.swept = true;
        let sweep = sweep_orphans(&self.module_path);
        if !sweep.removed.is_empty() {
            log::info!("Removed {} orphaned module copies at startup", sweep.removed.len());
        }
    }

    /// Copy, open and resolve; cleans up after itself on failure
    fn open_module(&self) -> Result<(ModuleHandle, ModuleApi, TempCopy)> {
        let (handle, temp) = load_for_hot_reload(&self.loader, &self.module_path)?;

        match ModuleApi::resolve(&handle) {
            Ok(api) => Ok((handle, api, temp)),
            Err(e) => {
                self.release(handle, temp);
                Err(e)
            }
        }
    }

    /// [`open_module`](Self::open_module) with the settle delay and backoff
    fn open_module_with_retry(&self) -> Result<(ModuleHandle, ModuleApi, TempCopy)> {
        let attempts = self.config.load_attempts();
        let mut attempt = 0;

        loop {
            let delay = self.config.attempt_delay(attempt);
            if !delay.is_zero() {
                thread::sleep(delay);
            }

            match self.open_module() {
                Ok(opened) => return Ok(opened),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    log::warn!(
                        "Load attempt {}/{} failed, retrying: {}",
                        attempt + 1,
                        attempts,
                        e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Create the instance for a freshly opened module and install it
    ///
    /// `saved` is consumed here whatever happens.
    fn start_instance(
        &mut self,
        (handle, api, temp): (ModuleHandle, ModuleApi, TempCopy),
        saved: Option<SerializedState>,
    ) -> Result<()> {
        let engine_api = self.engine_api_ptr();

        let restored = saved.and_then(|state| {
            if !api.has_state_transfer() {
                log::info!(
                    "New module cannot restore state, dropping {} bytes",
                    state.len()
                );
                return None;
            }
            let instance = unsafe { api.deserialize(engine_api, &state) };
            match &instance {
                Some(_) => log::info!("Restored {} bytes of game state", state.len()),
                None => log::warn!(
                    "GameDeserializeState returned no instance for {} bytes, falling back to GameInit",
                    state.len()
                ),
            }
            instance
        });

        let instance = match restored {
            Some(instance) => Some(instance),
            None => unsafe { api.init(engine_api) },
        };

        let Some(instance) = instance else {
            self.release(handle, temp);
            self.state = ModuleState::Unloaded;
            return Err(HotloadError::InitFailure(
                "GameInit returned a null instance".into(),
            ));
        };

        self.module = Some(LoadedModule {
            handle,
            api,
            temp,
            instance: Some(instance),
        });
        self.state = ModuleState::Loaded;
        Ok(())
    }

    /// Serialize the running instance if the module and config allow it
    fn capture_state(&self) -> Option<SerializedState> {
        if !self.config.preserve_state {
            return None;
        }
        let module = self.module.as_ref()?;
        let instance = module.instance.as_ref()?;

        match unsafe { module.api.serialize(instance) } {
            Ok(Some(state)) => {
                log::debug!("Serialized {} bytes of game state", state.len());
                Some(state)
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("{}; reloading with fresh state", e);
                None
            }
        }
    }

    /// Shutdown, then unload, then delete the copy, in that order
    fn teardown(&self, mut module: LoadedModule) {
        if let Some(instance) = module.instance.take() {
            unsafe { module.api.shutdown(instance) };
        }

        let LoadedModule { handle, api, temp, .. } = module;
        drop(api);
        self.release(handle, temp);
    }

    /// Unload `handle`, then delete its copy only if the unload succeeded
    fn release(&self, handle: ModuleHandle, temp: TempCopy) {
        match handle.unload() {
            Ok(()) => self.remove_copy(temp),
            Err(e) => log::error!(
                "Failed to unload '{}', leaving the copy for the orphan sweep: {}",
                temp.path().display(),
                e
            ),
        }
    }

    fn remove_copy(&self, temp: TempCopy) {
        let path = temp.path().to_path_buf();
        if let Err(e) = temp.remove(self.config.delete_grace()) {
            log::warn!(
                "Could not delete module copy '{}', leaving it for the orphan sweep: {}",
                path.display(),
                e
            );
        }
    }
}

impl<L: LibraryLoader> Drop for ReloadCoordinator<L> {
    fn drop(&mut self) {
        if self.module.is_some() {
            self.unload();
        }
    }
}
