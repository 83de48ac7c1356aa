//! gptchat-plugin: lets the assistant extend itself with commands written during
//! a conversation.
//!
//! `/plugin create <id> { <source> }` runs the source through admission,
//! persistence under `<source-root>/<id>/`, operator confirmation (supervised
//! mode), a `cdylib` build into `<compiled-root>/<id>.<ext>`, an in-process load
//! through the `gptchat-plugin-sdk` C ABI, an identity check, and finally
//! registration as `/<id>`. See [`PluginManager`] for the state machine and
//! [`PluginError`] for the failure taxonomy.
//!
//! Loaded plugins run inside the host process. The operator confirmation is the
//! only gate in front of them.

mod admission;
mod compiler;
mod error;
mod layout;
mod loader;
mod manager;
mod module;
mod operator;
mod persist;

pub use admission::{admit, is_valid_identifier, AdmittedPlugin, PluginRequest};
pub use compiler::{BuildJob, CargoToolchain, CompilationResult, Toolchain};
pub use error::{FailureState, LifecycleStage, PathConfigurationError, PluginError, DENIED_REPLY};
pub use layout::{artifact_extension, PluginLayout, MANIFEST_FILE, SOURCE_FILE};
pub use loader::{verify_identity, CapabilityLoader, LibraryLoader, LoadedCapability};
pub use manager::{PluginManager, PluginRecord, SUCCESS_REPLY};
pub use module::PluginModule;
pub use operator::{ConfirmationGate, LineRead, OperatorPrompt, StdinLines, TerminalPrompt, ACCEPTANCE_TOKEN};
pub use persist::persist_source;
