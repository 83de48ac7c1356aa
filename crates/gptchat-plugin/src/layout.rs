//! On-disk layout:
//!
//! ```text
//! <source-root>/<id>/plugin.rs        submitted source
//! <source-root>/<id>/Cargo.toml       generated build manifest
//! <compiled-root>/<id>.<dll-ext>      loadable artifact
//! <compiled-root>/.build/<id>/        build scratch
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gptchat_core::CoreConfig;

use crate::admission::is_valid_identifier;
use crate::error::PathConfigurationError;

pub const SOURCE_FILE: &str = "plugin.rs";
pub const MANIFEST_FILE: &str = "Cargo.toml";
const BUILD_DIR: &str = ".build";

/// `so`, `dylib` or `dll`.
pub fn artifact_extension() -> &'static str {
    std::env::consts::DLL_EXTENSION
}

#[derive(Debug, Clone)]
pub struct PluginLayout {
    source_root: PathBuf,
    compiled_root: PathBuf,
}

impl PluginLayout {
    pub fn new(source_root: impl Into<PathBuf>, compiled_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            compiled_root: compiled_root.into(),
        }
    }

    pub fn from_config(cfg: &CoreConfig) -> Self {
        Self::new(&cfg.plugin_source_path, &cfg.plugin_compiled_path)
    }

    /// Both roots must already exist as directories. Neither is ever created here.
    pub fn check_paths(&self) -> Result<(), PathConfigurationError> {
        check_dir(&self.source_root, PathConfigurationError::SourceMissing)?;
        check_dir(&self.compiled_root, PathConfigurationError::CompiledMissing)
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn compiled_root(&self) -> &Path {
        &self.compiled_root
    }

    pub fn source_dir(&self, id: &str) -> PathBuf {
        self.source_root.join(id)
    }

    pub fn source_file(&self, id: &str) -> PathBuf {
        self.source_dir(id).join(SOURCE_FILE)
    }

    pub fn manifest_file(&self, id: &str) -> PathBuf {
        self.source_dir(id).join(MANIFEST_FILE)
    }

    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.compiled_root.join(format!("{}.{}", id, artifact_extension()))
    }

    pub fn build_root(&self) -> PathBuf {
        self.compiled_root.join(BUILD_DIR)
    }

    /// Artifacts left by earlier runs, as `(id, path)` sorted by id. Files whose
    /// stem is not a valid identifier are ignored.
    pub fn compiled_artifacts(&self) -> io::Result<Vec<(String, PathBuf)>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.compiled_root)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(artifact_extension()) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if is_valid_identifier(stem) {
                found.push((stem.to_string(), path.clone()));
            }
        }
        found.sort();
        Ok(found)
    }
}

fn check_dir(path: &Path, missing: fn(PathBuf) -> PathConfigurationError) -> Result<(), PathConfigurationError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(PathConfigurationError::NotADirectory(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(missing(path.to_path_buf())),
        Err(e) => Err(PathConfigurationError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots() -> (tempfile::TempDir, PluginLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = PluginLayout::new(dir.path().join("source"), dir.path().join("compiled"));
        (dir, layout)
    }

    #[test]
    fn missing_roots_are_distinguished() {
        let (dir, layout) = roots();
        assert!(matches!(layout.check_paths(), Err(PathConfigurationError::SourceMissing(_))));

        fs::create_dir(dir.path().join("source")).unwrap();
        assert!(matches!(layout.check_paths(), Err(PathConfigurationError::CompiledMissing(_))));

        fs::write(dir.path().join("compiled"), b"not a dir").unwrap();
        assert!(matches!(layout.check_paths(), Err(PathConfigurationError::NotADirectory(_))));

        fs::remove_file(dir.path().join("compiled")).unwrap();
        fs::create_dir(dir.path().join("compiled")).unwrap();
        layout.check_paths().unwrap();
    }

    #[test]
    fn paths_are_deterministic() {
        let (dir, layout) = roots();
        assert_eq!(layout.source_file("add-one"), dir.path().join("source/add-one/plugin.rs"));
        assert_eq!(
            layout.artifact_path("add-one"),
            dir.path().join(format!("compiled/add-one.{}", artifact_extension()))
        );
        assert_eq!(layout.build_root(), dir.path().join("compiled/.build"));
    }

    #[test]
    fn scans_only_valid_artifacts() {
        let (dir, layout) = roots();
        let compiled = dir.path().join("compiled");
        fs::create_dir(&compiled).unwrap();
        fs::write(layout.artifact_path("b-plugin"), b"").unwrap();
        fs::write(layout.artifact_path("a_plugin"), b"").unwrap();
        fs::write(compiled.join("notes.txt"), b"").unwrap();
        fs::write(compiled.join(format!("bad name.{}", artifact_extension())), b"").unwrap();
        fs::create_dir(layout.build_root()).unwrap();

        let ids: Vec<String> = layout.compiled_artifacts().unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a_plugin".to_string(), "b-plugin".to_string()]);
    }
}
