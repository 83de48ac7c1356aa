//! `/help`: what the assistant can call right now.

use crate::module::{ChatModule, CommandContext, CommandError};

pub struct HelpModule;

impl ChatModule for HelpModule {
    fn id(&self) -> &str {
        "help"
    }

    fn prompt(&self) -> &str {
        "/help lists every available command with an example of how to call it."
    }

    fn execute(&self, ctx: &CommandContext<'_>, _args: &str, _body: &str) -> Result<String, CommandError> {
        let mut out = String::from("The following commands are available:\n");
        for (id, prompt) in ctx.registry.prompts() {
            if id == self.id() {
                continue;
            }
            out.push_str(&format!("\n/{}\n{}\n", id, prompt));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModuleRegistry;
    use std::sync::Arc;

    #[test]
    fn lists_other_modules() {
        let registry = ModuleRegistry::new();
        registry.register(Arc::new(HelpModule)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let memory = crate::memory::MemoryModule::open_path(dir.path().join("m")).unwrap();
        registry.register(Arc::new(memory)).unwrap();

        let reply = registry.execute("/help").unwrap();
        assert!(reply.contains("/memory"));
        assert!(!reply.contains("/help\n"));
    }
}
