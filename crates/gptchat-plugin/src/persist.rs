//! Source persistence. The per-plugin directory survives failed attempts so a
//! corrected submission under the same id lands in the same place.

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::debug;

use crate::error::PluginError;
use crate::layout::PluginLayout;

/// Ensure `<source-root>/<id>/` exists (created only if absent, never wiped), then
/// overwrite `plugin.rs` with `source`. Returns the source file path.
pub fn persist_source(layout: &PluginLayout, id: &str, source: &str) -> Result<PathBuf, PluginError> {
    let dir = layout.source_dir(id);
    match fs::metadata(&dir) {
        Ok(meta) if meta.is_dir() => {
            debug!(target: "gptchat::plugin", plugin = %id, dir = %dir.display(), "reusing source directory");
        }
        Ok(_) => {
            return Err(PluginError::Persistence {
                path: dir,
                source: io::Error::new(io::ErrorKind::AlreadyExists, "exists and is not a directory"),
            });
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir(&dir).map_err(|source| PluginError::Persistence {
                path: dir.clone(),
                source,
            })?;
            debug!(target: "gptchat::plugin", plugin = %id, dir = %dir.display(), "created source directory");
        }
        Err(source) => return Err(PluginError::Persistence { path: dir, source }),
    }

    let file = layout.source_file(id);
    fs::write(&file, source).map_err(|source| PluginError::Persistence {
        path: file.clone(),
        source,
    })?;
    Ok(file)
}
