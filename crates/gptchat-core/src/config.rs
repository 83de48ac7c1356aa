//! Host configuration.
//!
//! Precedence: env `GPTCHAT_CONFIG` path > `config/gptchat.toml` > defaults, with
//! `GPTCHAT_*` environment variables layered on top (`__` separates nested keys).
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | plugin_source_path | ./module/plugin/source | Root for submitted plugin source. Must exist. |
//! | plugin_compiled_path | ./module/plugin/compiled | Root for compiled plugin libraries. Must exist. |
//! | plugin_sdk_path | ./crates/gptchat-plugin-sdk | SDK crate plugins are built against. |
//! | compiler | cargo | Toolchain executable used to build plugins. |
//! | compile_timeout_secs | 300 | Upper bound on one plugin build. |
//! | confirmation_timeout_secs | 600 | Upper bound on waiting for the operator. |
//! | supervised_mode | true | Require operator confirmation before compiling. |
//! | memory_path | ./data/memory | Sled database for `/memory`. |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_PATH: &str = "config/gptchat.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub plugin_source_path: PathBuf,
    pub plugin_compiled_path: PathBuf,
    pub plugin_sdk_path: PathBuf,
    pub compiler: String,
    pub compile_timeout_secs: u64,
    pub confirmation_timeout_secs: u64,
    pub supervised_mode: bool,
    pub memory_path: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            plugin_source_path: PathBuf::from("./module/plugin/source"),
            plugin_compiled_path: PathBuf::from("./module/plugin/compiled"),
            plugin_sdk_path: PathBuf::from("./crates/gptchat-plugin-sdk"),
            compiler: "cargo".to_string(),
            compile_timeout_secs: 300,
            confirmation_timeout_secs: 600,
            supervised_mode: true,
            memory_path: PathBuf::from("./data/memory"),
        }
    }
}

impl CoreConfig {
    /// Load from the file named by `GPTCHAT_CONFIG` (or the default path) and the environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = std::env::var("GPTCHAT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// Load from `path` if it exists, then the environment. Missing keys fall back to defaults.
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let defaults = CoreConfig::default();
        let builder = config::Config::builder()
            .set_default("plugin_source_path", path_default(&defaults.plugin_source_path))?
            .set_default("plugin_compiled_path", path_default(&defaults.plugin_compiled_path))?
            .set_default("plugin_sdk_path", path_default(&defaults.plugin_sdk_path))?
            .set_default("compiler", defaults.compiler.clone())?
            .set_default("compile_timeout_secs", defaults.compile_timeout_secs)?
            .set_default("confirmation_timeout_secs", defaults.confirmation_timeout_secs)?
            .set_default("supervised_mode", defaults.supervised_mode)?
            .set_default("memory_path", path_default(&defaults.memory_path))?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("GPTCHAT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: CoreConfig = built.try_deserialize()?;
        tracing::debug!(
            supervised = cfg.supervised_mode,
            source = %cfg.plugin_source_path.display(),
            compiled = %cfg.plugin_compiled_path.display(),
            "configuration loaded"
        );
        Ok(cfg)
    }

    pub fn is_supervised_mode(&self) -> bool {
        self.supervised_mode
    }

    /// Never zero; a zero setting is clamped to one second.
    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs.max(1))
    }

    /// Never zero; a zero setting is clamped to one second.
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs.max(1))
    }
}

fn path_default(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CoreConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.compiler, "cargo");
        assert_eq!(cfg.compile_timeout_secs, 300);
        assert_eq!(cfg.plugin_source_path, PathBuf::from("./module/plugin/source"));
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gptchat.toml");
        let file = CoreConfig {
            supervised_mode: false,
            compile_timeout_secs: 0,
            compiler: "/usr/local/bin/cargo".to_string(),
            ..CoreConfig::default()
        };
        std::fs::write(&path, toml::to_string(&file).unwrap()).unwrap();

        let cfg = CoreConfig::load_from(&path).unwrap();
        assert!(!cfg.is_supervised_mode());
        assert_eq!(cfg.compiler, "/usr/local/bin/cargo");
        assert_eq!(cfg.compile_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.confirmation_timeout(), Duration::from_secs(600));
    }
}
