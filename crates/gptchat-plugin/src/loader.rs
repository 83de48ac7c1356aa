//! Dynamic loader: open a compiled plugin with libloading, resolve its vtable,
//! and expose it as a [`Capability`].

use std::ffi::{c_char, CStr, CString};
use std::path::Path;

use gptchat_core::{Capability, CapabilityError};
use gptchat_plugin_sdk::{Envelope, PluginVTable, ABI_VERSION, ENTRY_SYMBOL};
use libloading::Library;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::PluginError;

/// Turns a compiled artifact into a live capability.
pub trait CapabilityLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn Capability>, PluginError>;
}

/// Loads `cdylib` plugins built against `gptchat-plugin-sdk`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibraryLoader;

impl CapabilityLoader for LibraryLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn Capability>, PluginError> {
        // SAFETY: loading runs the library's initialisers. The artifact was
        // built from operator-reviewed source; nothing stronger is possible here.
        let library = unsafe { Library::new(path) }.map_err(|e| PluginError::load(path, format!("libloading: {}", e)))?;
        let vtable = unsafe {
            let symbol = library
                .get::<*const PluginVTable>(ENTRY_SYMBOL.as_bytes())
                .map_err(|e| PluginError::load(path, format!("symbol {}: {}", ENTRY_SYMBOL, e)))?;
            let ptr = *symbol;
            if ptr.is_null() {
                return Err(PluginError::load(path, format!("symbol {} is null", ENTRY_SYMBOL)));
            }
            *ptr
        };
        let loaded = LoadedCapability::from_vtable(vtable, Some(library), path)?;
        debug!(target: "gptchat::plugin", path = %path.display(), identifier = %loaded.identifier, "opened plugin library");
        Ok(Box::new(loaded))
    }
}

/// A resolved plugin. Holds the library open for as long as the vtable is used.
pub struct LoadedCapability {
    identifier: String,
    example: String,
    vtable: PluginVTable,
    // Declared last so the library is unmapped after everything that points into it.
    _library: Option<Library>,
}

impl LoadedCapability {
    /// `library` is `None` only for vtables that live in this binary.
    pub(crate) fn from_vtable(vtable: PluginVTable, library: Option<Library>, path: &Path) -> Result<Self, PluginError> {
        if vtable.abi_version != ABI_VERSION {
            return Err(PluginError::load(
                path,
                format!("ABI version {} is not supported (host speaks {})", vtable.abi_version, ABI_VERSION),
            ));
        }
        let identifier = take_string(&vtable, (vtable.identifier)())
            .ok_or_else(|| PluginError::load(path, "identifier() returned null"))?;
        let example = take_string(&vtable, (vtable.example)())
            .ok_or_else(|| PluginError::load(path, "example() returned null"))?;
        Ok(Self {
            identifier,
            example,
            vtable,
            _library: library,
        })
    }
}

impl Capability for LoadedCapability {
    fn identifier(&self) -> String {
        self.identifier.clone()
    }

    fn example(&self) -> String {
        self.example.clone()
    }

    fn execute(&self, input: Map<String, Value>) -> Result<Map<String, Value>, CapabilityError> {
        let json = serde_json::to_string(&Value::Object(input))?;
        let c_input = CString::new(json).map_err(|e| CapabilityError::Abi(e.to_string()))?;
        let raw = take_string(&self.vtable, (self.vtable.execute)(c_input.as_ptr()))
            .ok_or_else(|| CapabilityError::Abi("execute() returned null".to_string()))?;
        match serde_json::from_str::<Envelope>(&raw)? {
            Envelope::Output(output) => Ok(output),
            Envelope::Error(msg) => Err(CapabilityError::Execution(msg)),
        }
    }
}

/// Copy a plugin-owned string and hand it back to the plugin's allocator.
fn take_string(vtable: &PluginVTable, ptr: *mut c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: non-null strings from the vtable are NUL-terminated and owned by us until freed.
    let s = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
    (vtable.free_string)(ptr);
    Some(s)
}

/// The loaded capability must answer to the identifier it was created under.
pub fn verify_identity(requested: &str, capability: &dyn Capability) -> Result<(), PluginError> {
    let declared = capability.identifier();
    if declared != requested {
        return Err(PluginError::IdentityMismatch {
            requested: requested.to_string(),
            declared,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gptchat_plugin_sdk::{plugin_vtable, Plugin};
    use serde_json::json;
    use std::ptr;

    struct AddOne;

    impl Plugin for AddOne {
        fn identifier(&self) -> &str {
            "add-one"
        }

        fn example(&self) -> String {
            "/add-one {\"value\": 5}".to_string()
        }

        fn execute(&self, input: Map<String, Value>) -> Result<Map<String, Value>, String> {
            let value = input.get("value").and_then(Value::as_f64).ok_or("missing 'value'")?;
            let mut out = Map::new();
            out.insert("result".into(), json!(value + 1.0));
            Ok(out)
        }
    }

    static ADD_ONE: PluginVTable = plugin_vtable!(AddOne, AddOne);

    extern "C" fn null_string() -> *mut c_char {
        ptr::null_mut()
    }

    extern "C" fn null_execute(_input: *const c_char) -> *mut c_char {
        ptr::null_mut()
    }

    fn load(vtable: PluginVTable) -> Result<LoadedCapability, PluginError> {
        LoadedCapability::from_vtable(vtable, None, Path::new("in-process"))
    }

    #[test]
    fn resolves_identity_and_executes() {
        let cap = load(ADD_ONE).unwrap();
        assert_eq!(cap.identifier(), "add-one");
        assert!(cap.example().starts_with("/add-one"));

        let mut input = Map::new();
        input.insert("value".into(), json!(5));
        let out = cap.execute(input).unwrap();
        assert_eq!(out.get("result"), Some(&json!(6.0)));

        match cap.execute(Map::new()) {
            Err(CapabilityError::Execution(msg)) => assert_eq!(msg, "missing 'value'"),
            other => panic!("expected execution error, got {:?}", other),
        }
    }

    #[test]
    fn rejects_foreign_abi_versions() {
        let vtable = PluginVTable {
            abi_version: ABI_VERSION + 1,
            ..ADD_ONE
        };
        match load(vtable) {
            Err(PluginError::Load { reason, .. }) => assert!(reason.contains("ABI version")),
            Err(other) => panic!("expected load error, got {:?}", other),
            Ok(_) => panic!("foreign ABI accepted"),
        }
    }

    #[test]
    fn null_strings_are_abi_violations() {
        let vtable = PluginVTable {
            identifier: null_string,
            ..ADD_ONE
        };
        assert!(matches!(load(vtable), Err(PluginError::Load { .. })));

        let cap = load(PluginVTable {
            execute: null_execute,
            ..ADD_ONE
        })
        .unwrap();
        assert!(matches!(cap.execute(Map::new()), Err(CapabilityError::Abi(_))));
    }

    #[test]
    fn identity_must_match_request() {
        let cap = load(ADD_ONE).unwrap();
        verify_identity("add-one", &cap).unwrap();
        match verify_identity("plus-one", &cap) {
            Err(PluginError::IdentityMismatch { requested, declared }) => {
                assert_eq!(requested, "plus-one");
                assert_eq!(declared, "add-one");
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn non_library_files_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("fake.{}", std::env::consts::DLL_EXTENSION));
        std::fs::write(&path, b"definitely not a shared object").unwrap();
        match LibraryLoader.load(&path) {
            Err(PluginError::Load { path: p, .. }) => assert_eq!(p, path),
            Err(other) => panic!("expected load error, got {:?}", other),
            Ok(_) => panic!("garbage loaded as a library"),
        }
    }
}
