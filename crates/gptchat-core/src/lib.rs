//! gptchat-core: configuration, slash-command parsing, the live module registry,
//! and the built-in `/help` and `/memory` modules.
//!
//! Runtime-compiled plugins (see `gptchat-plugin`) reach the registry as
//! [`Capability`] values wrapped in a [`CapabilityModule`].

mod capability;
mod command;
mod config;
mod help;
mod memory;
mod module;
mod registry;

pub use capability::{Capability, CapabilityError, CapabilityModule};
pub use command::{braces_balanced, Command};
pub use config::CoreConfig;
pub use help::HelpModule;
pub use memory::{MemoryError, MemoryModule, MemoryRecord};
pub use module::{ChatModule, CommandContext, CommandError};
pub use registry::{ModuleRegistry, RegistryError};
