//! Admission control for submitted plugins. Nothing here touches the filesystem.

use gptchat_core::ModuleRegistry;

use crate::error::PluginError;

/// One `/plugin create <identifier> { <source> }` request.
#[derive(Debug, Clone)]
pub struct PluginRequest {
    pub identifier: String,
    pub source_body: String,
}

impl PluginRequest {
    pub fn new(identifier: impl Into<String>, source_body: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            source_body: source_body.into(),
        }
    }
}

/// A request that passed admission: trimmed identifier and the source with its
/// outer braces removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmittedPlugin {
    pub identifier: String,
    pub source: String,
}

/// Identifiers become a directory name and a command name: ASCII alphanumerics,
/// `-` and `_` only.
pub fn is_valid_identifier(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// The `{`/`}` check is a smoke test only; the compiler judges the interior.
pub fn admit(request: &PluginRequest, registry: &ModuleRegistry) -> Result<AdmittedPlugin, PluginError> {
    let body = request.source_body.trim();
    if body.is_empty() {
        return Err(PluginError::validation("plugin source not found"));
    }
    if !body.starts_with('{') || !body.ends_with('}') {
        return Err(PluginError::validation(
            "plugin source must be between {} in '/plugin create plugin-id {}' command",
        ));
    }

    let id = request.identifier.trim();
    if id.is_empty() {
        return Err(PluginError::validation("plugin id is invalid"));
    }
    if !is_valid_identifier(id) {
        return Err(PluginError::validation(format!(
            "plugin id '{}' may only contain ASCII letters, digits, '-' and '_'",
            id
        )));
    }
    if registry.exists(id) {
        return Err(PluginError::validation("a plugin with this id already exists"));
    }

    let inner = body.strip_suffix('}').unwrap_or(body);
    let inner = inner.strip_prefix('{').unwrap_or(inner);
    Ok(AdmittedPlugin {
        identifier: id.to_string(),
        source: inner.to_string(),
    })
}
