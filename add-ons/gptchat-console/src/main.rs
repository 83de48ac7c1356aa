//! gptchat operator console
//!
//! Reads slash-commands from stdin and prints the replies. A command may span
//! several lines; it is dispatched once its braces balance. The same stdin feeds
//! the plugin confirmation prompt.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use gptchat_core::{braces_balanced, CoreConfig, HelpModule, MemoryModule, ModuleRegistry};
use gptchat_plugin::{LineRead, PluginManager, PluginModule, StdinLines, TerminalPrompt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[gptchat-console] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match CoreConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("[gptchat-console] invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let lines = StdinLines::spawn();
    let registry = ModuleRegistry::new();
    if let Err(e) = build_registry(&registry, &config, &lines) {
        eprintln!("[gptchat-console] {}", e);
        return ExitCode::FAILURE;
    }

    tracing::info!(modules = ?registry.ids(), "gptchat console started");
    println!("Type /help for commands, /exit to quit.");
    repl(&registry, &lines);
    ExitCode::SUCCESS
}

fn build_registry(
    registry: &ModuleRegistry,
    config: &CoreConfig,
    lines: &Arc<StdinLines>,
) -> Result<(), Box<dyn std::error::Error>> {
    registry.register(Arc::new(HelpModule))?;

    let memory = MemoryModule::open_path(&config.memory_path)?;
    registry.register(Arc::new(memory))?;

    let prompt = TerminalPrompt::new(Arc::clone(lines));
    let manager = PluginManager::from_config(config, Box::new(prompt))?;
    let restored = manager.load_compiled(registry);
    if restored > 0 {
        tracing::info!(count = restored, "restored compiled plugins");
    }
    registry.register(Arc::new(PluginModule::new(manager)))?;
    Ok(())
}

fn repl(registry: &ModuleRegistry, lines: &StdinLines) {
    let mut pending = String::new();
    loop {
        if pending.is_empty() {
            print!("> ");
            let _ = std::io::stdout().flush();
        }
        let line = match lines.next_line(None) {
            LineRead::Line(line) => line,
            // Without a timeout the only other outcome is closed input.
            LineRead::TimedOut | LineRead::Closed => break,
        };
        if pending.is_empty() && line.trim().is_empty() {
            continue;
        }
        if pending.is_empty() && line.trim() == "/exit" {
            break;
        }

        pending.push_str(&line);
        pending.push('\n');
        if !braces_balanced(&pending) {
            continue;
        }

        let text = std::mem::take(&mut pending);
        match registry.execute(&text) {
            Ok(reply) => println!("{}", reply),
            Err(e) => {
                if let Some(reply) = e.reply() {
                    println!("{}", reply);
                }
                eprintln!("error: {}", e);
            }
        }
    }
}
