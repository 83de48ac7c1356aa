//! `/plugin`: the command surface of the lifecycle manager.

use gptchat_core::{ChatModule, CommandContext, CommandError};

use crate::admission::PluginRequest;
use crate::manager::PluginManager;

const PLUGIN_PROMPT: &str = r#"/plugin create <plugin-id> { <rust source> } compiles the source into a new command named /<plugin-id>.

The source is the whole crate root of a library built against `gptchat_plugin_sdk`
with `serde_json` available. Implement `Plugin` and export it exactly once:

/plugin create add-one {
use gptchat_plugin_sdk::{export_plugin, Plugin};
use serde_json::{json, Map, Value};

struct AddOne;

impl Plugin for AddOne {
    fn identifier(&self) -> &str {
        "add-one"
    }

    fn example(&self) -> String {
        "/add-one {\n    \"value\": 5\n}".to_string()
    }

    fn execute(&self, input: Map<String, Value>) -> Result<Map<String, Value>, String> {
        let value = input.get("value").and_then(Value::as_f64).ok_or("missing 'value'")?;
        let mut out = Map::new();
        out.insert("result".into(), json!(value + 1.0));
        Ok(out)
    }
}

export_plugin!(AddOne, AddOne);
}

identifier() must return the same <plugin-id> used in the command. Compiler
errors are returned to you so you can fix the source and retry with the same id.

/plugin list shows the plugins loaded so far."#;

pub struct PluginModule {
    manager: PluginManager,
}

impl PluginModule {
    pub fn new(manager: PluginManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &PluginManager {
        &self.manager
    }

    fn list(&self) -> String {
        let records = self.manager.records();
        if records.is_empty() {
            return "No plugins loaded.".to_string();
        }
        let mut out = String::from("Loaded plugins:\n");
        for record in records.iter().filter(|r| r.loaded) {
            out.push_str(&format!("- /{}\n", record.identifier));
        }
        out
    }
}

impl ChatModule for PluginModule {
    fn id(&self) -> &str {
        "plugin"
    }

    fn prompt(&self) -> &str {
        PLUGIN_PROMPT
    }

    fn execute(&self, ctx: &CommandContext<'_>, args: &str, body: &str) -> Result<String, CommandError> {
        let args = args.trim();
        let (sub, rest) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
        match sub {
            "create" => {
                let request = PluginRequest::new(rest.trim(), body);
                self.manager.create(ctx.registry, &request).map_err(|e| {
                    let reply = e.reply().to_string();
                    CommandError::failed(reply, e)
                })
            }
            "list" => Ok(self.list()),
            "" => Err(CommandError::InvalidInput("expected '/plugin create <id> {...}' or '/plugin list'".to_string())),
            other => Err(CommandError::NotImplemented(format!("/plugin {}", other))),
        }
    }
}
