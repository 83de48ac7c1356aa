//! Module Registry: the live mapping from command identifier to handler.
//!
//! Check-and-insert happens under one write lock, so two registrations racing
//! for the same identifier cannot both succeed. Handlers run with the lock
//! released, which lets a handler (e.g. `/plugin create`) register new modules.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use crate::capability::{Capability, CapabilityModule};
use crate::command::Command;
use crate::module::{ChatModule, CommandContext, CommandError};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a module with id '{0}' already exists")]
    Duplicate(String),
    #[error("module id must not be empty")]
    EmptyIdentifier,
}

pub struct ModuleRegistry {
    modules: RwLock<BTreeMap<String, Arc<dyn ChatModule>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: RwLock::new(BTreeMap::new()),
        }
    }

    // Every mutation is a single insert, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<dyn ChatModule>>> {
        self.modules.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<dyn ChatModule>>> {
        self.modules.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// Register `module` under its own id. Fails if the id is taken.
    pub fn register(&self, module: Arc<dyn ChatModule>) -> Result<(), RegistryError> {
        let id = module.id().to_string();
        if id.trim().is_empty() {
            return Err(RegistryError::EmptyIdentifier);
        }
        let mut guard = self.write();
        if guard.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        tracing::debug!(module = %id, "module registered");
        guard.insert(id, module);
        Ok(())
    }

    /// Register a loaded capability as a command named by its identifier.
    pub fn register_capability(&self, capability: Box<dyn Capability>) -> Result<(), RegistryError> {
        self.register(Arc::new(CapabilityModule::new(capability)))
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ChatModule>> {
        self.read().get(id).cloned()
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// `(id, prompt)` for every module, sorted by id.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.read()
            .iter()
            .map(|(id, m)| (id.clone(), m.prompt().to_string()))
            .collect()
    }

    pub fn dispatch(&self, command: &Command) -> Result<String, CommandError> {
        let module = self
            .get(&command.module)
            .ok_or_else(|| CommandError::UnknownModule(command.module.clone()))?;
        let ctx = CommandContext { registry: self };
        module.execute(&ctx, &command.args, &command.body)
    }

    /// Parse and dispatch a raw `/command`.
    pub fn execute(&self, text: &str) -> Result<String, CommandError> {
        let command = Command::parse(text)?;
        self.dispatch(&command)
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Static(&'static str);

    impl ChatModule for Static {
        fn id(&self) -> &str {
            self.0
        }
        fn prompt(&self) -> &str {
            "static module"
        }
        fn execute(&self, ctx: &CommandContext<'_>, args: &str, body: &str) -> Result<String, CommandError> {
            Ok(format!("{} [{}] [{}] {}", self.0, args, body, ctx.registry.ids().len()))
        }
    }

    /// Registers a module while running, like `/plugin create` does.
    struct Spawner;

    impl ChatModule for Spawner {
        fn id(&self) -> &str {
            "spawn"
        }
        fn prompt(&self) -> &str {
            "spawns"
        }
        fn execute(&self, ctx: &CommandContext<'_>, args: &str, _body: &str) -> Result<String, CommandError> {
            let id: &'static str = Box::leak(args.to_string().into_boxed_str());
            ctx.registry
                .register(Arc::new(Static(id)))
                .map_err(|e| CommandError::failed("", e))?;
            Ok(format!("spawned {}", id))
        }
    }

    #[test]
    fn register_rejects_duplicates_and_empty_ids() {
        let registry = ModuleRegistry::new();
        registry.register(Arc::new(Static("a"))).unwrap();
        assert!(registry.exists("a"));
        assert_eq!(
            registry.register(Arc::new(Static("a"))),
            Err(RegistryError::Duplicate("a".to_string()))
        );
        assert_eq!(registry.register(Arc::new(Static("  "))), Err(RegistryError::EmptyIdentifier));
        assert_eq!(registry.ids(), vec!["a".to_string()]);
    }

    #[test]
    fn dispatch_routes_and_reports_unknown() {
        let registry = ModuleRegistry::new();
        registry.register(Arc::new(Static("echo"))).unwrap();
        assert_eq!(registry.execute("/echo hi {x}").unwrap(), "echo [hi] [{x}] 1");
        assert!(matches!(registry.execute("/nope"), Err(CommandError::UnknownModule(id)) if id == "nope"));
    }

    #[test]
    fn handlers_may_register_while_running() {
        let registry = ModuleRegistry::new();
        registry.register(Arc::new(Spawner)).unwrap();
        assert_eq!(registry.execute("/spawn fresh").unwrap(), "spawned fresh");
        assert!(registry.exists("fresh"));
        let err = registry.execute("/spawn fresh").unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
