//! Error types for the hot-reload system

use std::path::PathBuf;
use thiserror::Error;

/// Result type for hot-reload operations
pub type Result<T> = std::result::Result<T, HotloadError>;

/// Coarse classification of a failure, as reported by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Canonical module file absent
    NotFound,
    /// OS loader rejected the copy
    LoadFailure,
    /// Required export missing or ABI version rejected
    AbiMismatch,
    /// Copy or delete failed
    Filesystem,
    /// Module produced no state to carry over
    SerializeFailure,
    /// Module could not produce a new instance
    InitFailure,
    /// Operation not valid in the current coordinator state
    InvalidState,
    /// File watcher could not be set up
    Watch,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::NotFound => "not-found",
            FailureKind::LoadFailure => "load-failure",
            FailureKind::AbiMismatch => "abi-mismatch",
            FailureKind::Filesystem => "filesystem",
            FailureKind::SerializeFailure => "serialize-failure",
            FailureKind::InitFailure => "init-failure",
            FailureKind::InvalidState => "invalid-state",
            FailureKind::Watch => "watch",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while loading or reloading a module
#[derive(Debug, Error)]
pub enum HotloadError {
    /// Module file does not exist (usually: not built yet)
    #[error("Module '{0}' not found")]
    NotFound(PathBuf),

    /// Failed to load dynamic library
    #[error("Failed to load module '{path}': {message}")]
    LoadFailure {
        path: PathBuf,
        message: String,
    },

    /// Module does not export a required symbol
    #[error("Symbol '{symbol}' not found in module '{module}'")]
    MissingSymbol {
        module: String,
        symbol: String,
    },

    /// Module was built against another ABI version
    #[error("ABI version mismatch: module version {module_version}, expected {expected_version}")]
    VersionMismatch {
        module_version: u32,
        expected_version: u32,
    },

    /// Copy or delete on the module directory failed
    #[error("Failed to {operation} '{path}': {source}")]
    Filesystem {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialize returned nothing usable
    #[error("Serialization failed: {0}")]
    SerializeFailure(String),

    /// Init or Deserialize returned a null instance
    #[error("Failed to create game instance: {0}")]
    InitFailure(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File watcher error
    #[error("Watch error: {0}")]
    Watch(String),
}

impl HotloadError {
    /// Create a load error
    pub fn load_failure(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        HotloadError::LoadFailure {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a symbol not found error
    pub fn missing_symbol(module: impl Into<String>, symbol: impl Into<String>) -> Self {
        HotloadError::MissingSymbol {
            module: module.into(),
            symbol: symbol.into(),
        }
    }

    /// Create a filesystem error
    pub fn filesystem(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        HotloadError::Filesystem {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Classify this error
    pub fn kind(&self) -> FailureKind {
        match self {
            HotloadError::NotFound(_) => FailureKind::NotFound,
            HotloadError::LoadFailure { .. } => FailureKind::LoadFailure,
            HotloadError::MissingSymbol { .. } | HotloadError::VersionMismatch { .. } => {
                FailureKind::AbiMismatch
            }
            HotloadError::Filesystem { .. } => FailureKind::Filesystem,
            HotloadError::SerializeFailure(_) => FailureKind::SerializeFailure,
            HotloadError::InitFailure(_) => FailureKind::InitFailure,
            HotloadError::InvalidState(_) => FailureKind::InvalidState,
            HotloadError::Watch(_) => FailureKind::Watch,
        }
    }

    /// Whether another load attempt after a pause may succeed
    ///
    /// Copy failures and loader rejections can be transient while a build is
    /// still writing the module or the OS still maps the previous copy.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), FailureKind::Filesystem | FailureKind::LoadFailure)
    }
}
