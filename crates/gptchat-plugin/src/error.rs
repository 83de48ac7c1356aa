//! Error taxonomy and lifecycle states.

use std::fmt;
use std::io;
use std::path::PathBuf;

use gptchat_core::RegistryError;
use thiserror::Error;

/// Caller-facing message paired with a denied confirmation.
pub const DENIED_REPLY: &str = "The user has prevented you from running this code";

/// Forward path of one `/plugin create` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStage {
    Requested,
    Validated,
    DirectoryEnsured,
    SourceWritten,
    ConfirmationPending,
    Compiling,
    Compiled,
    Loaded,
    IdentityVerified,
    Registered,
}

/// Terminal failure states. None is retried within the same request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureState {
    ValidationFailed,
    PathMissing,
    IoFailure,
    ConfirmationDenied,
    CompileFailed,
    LoadFailed,
    IdentityMismatch,
    RegistrationFailed,
}

impl fmt::Display for FailureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The source or compiled root is unusable. Fatal for the subsystem at start-up.
#[derive(Error, Debug)]
pub enum PathConfigurationError {
    #[error("plugin source path is missing: {0}")]
    SourceMissing(PathBuf),
    #[error("plugin compiled path is missing: {0}")]
    CompiledMissing(PathBuf),
    #[error("plugin path is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("cannot access plugin path {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

#[derive(Error, Debug)]
pub enum PluginError {
    #[error(transparent)]
    PathConfiguration(#[from] PathConfigurationError),
    #[error("{0}")]
    Validation(String),
    #[error("error writing plugin source {path}: {source}")]
    Persistence { path: PathBuf, source: io::Error },
    /// Carries the operator's literal answer so it can be fed back as a hint.
    #[error("{feedback}")]
    ConfirmationDenied { feedback: String },
    #[error("error compiling plugin: {reason}")]
    Compilation { reason: String, diagnostics: String },
    #[error("error opening plugin {path}: {reason}")]
    Load { path: PathBuf, reason: String },
    #[error("identifier() returned '{declared}', not the '{requested}' given to '/plugin create {requested}'")]
    IdentityMismatch { requested: String, declared: String },
    #[error("error registering plugin: {0}")]
    Registration(#[from] RegistryError),
}

impl PluginError {
    pub fn state(&self) -> FailureState {
        match self {
            PluginError::PathConfiguration(PathConfigurationError::Io { .. }) => FailureState::IoFailure,
            PluginError::PathConfiguration(_) => FailureState::PathMissing,
            PluginError::Validation(_) => FailureState::ValidationFailed,
            PluginError::Persistence { .. } => FailureState::IoFailure,
            PluginError::ConfirmationDenied { .. } => FailureState::ConfirmationDenied,
            PluginError::Compilation { .. } => FailureState::CompileFailed,
            PluginError::Load { .. } => FailureState::LoadFailed,
            PluginError::IdentityMismatch { .. } => FailureState::IdentityMismatch,
            PluginError::Registration(_) => FailureState::RegistrationFailed,
        }
    }

    /// Message returned alongside the error: compiler diagnostics verbatim, or the
    /// refusal notice. Empty for the other failures.
    pub fn reply(&self) -> &str {
        match self {
            PluginError::Compilation { diagnostics, .. } => diagnostics,
            PluginError::ConfirmationDenied { .. } => DENIED_REPLY,
            _ => "",
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        PluginError::Validation(msg.into())
    }

    pub(crate) fn compilation(reason: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        PluginError::Compilation {
            reason: reason.into(),
            diagnostics: diagnostics.into(),
        }
    }

    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PluginError::Load {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
