//! gptchat-plugin-sdk: the ABI boundary between the gptchat host and plugins
//! compiled at conversation time.
//!
//! ## Contract (cdylib)
//!
//! A plugin library exports exactly one symbol, [`ENTRY_SYMBOL`], bound to a
//! static [`PluginVTable`]. Strings cross the boundary as NUL-terminated UTF-8
//! allocated by the plugin and released through `free_string`. `execute` takes
//! a JSON object and returns an [`Envelope`] rendered as JSON.
//!
//! Plugin authors implement [`Plugin`] and call [`export_plugin!`]:
//!
//! ```ignore
//! use gptchat_plugin_sdk::{export_plugin, Plugin};
//! use serde_json::{json, Map, Value};
//!
//! struct AddOne;
//!
//! impl Plugin for AddOne {
//!     fn identifier(&self) -> &str {
//!         "add-one"
//!     }
//!     fn example(&self) -> String {
//!         "/add-one {\n    \"value\": 5\n}".to_string()
//!     }
//!     fn execute(&self, input: Map<String, Value>) -> Result<Map<String, Value>, String> {
//!         let value = input.get("value").and_then(Value::as_f64).ok_or("missing 'value'")?;
//!         let mut out = Map::new();
//!         out.insert("result".into(), json!(value + 1.0));
//!         Ok(out)
//!     }
//! }
//!
//! export_plugin!(AddOne, AddOne);
//! ```
//!
//! ## Host dependency contract
//!
//! The host calls every function synchronously on its command thread. Plugins
//! are not re-entered and must not leave background threads running after
//! `execute` returns.

use std::ffi::c_char;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod ffi;

/// Bumped whenever the layout of [`PluginVTable`] changes.
pub const ABI_VERSION: u32 = 1;

/// Name of the exported static holding the plugin's [`PluginVTable`].
pub const ENTRY_SYMBOL: &str = "GPTCHAT_PLUGIN";

/// Returns an owned C string; release it with `free_string`.
pub type StringFn = extern "C" fn() -> *mut c_char;
/// `execute(input_json)`; returns an owned JSON [`Envelope`] or null.
pub type ExecuteFn = extern "C" fn(*const c_char) -> *mut c_char;
/// Frees a string previously returned by the plugin.
pub type FreeFn = extern "C" fn(*mut c_char);

#[repr(C)]
#[derive(Clone, Copy)]
pub struct PluginVTable {
    pub abi_version: u32,
    pub identifier: StringFn,
    pub example: StringFn,
    pub execute: ExecuteFn,
    pub free_string: FreeFn,
}

impl std::fmt::Debug for PluginVTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginVTable")
            .field("abi_version", &self.abi_version)
            .finish_non_exhaustive()
    }
}

/// Result of `execute` as it travels across the boundary:
/// `{"output": {...}}` or `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Envelope {
    Output(Map<String, Value>),
    Error(String),
}

/// Behaviour a plugin author implements.
pub trait Plugin: Send + Sync {
    /// Command name; must equal the identifier used in `/plugin create <id>`.
    fn identifier(&self) -> &str;

    /// Example invocation shown to the assistant in `/help`.
    fn example(&self) -> String;

    /// Input is a JSON object decoded from the command body.
    fn execute(&self, input: Map<String, Value>) -> Result<Map<String, Value>, String>;
}

/// Builds a [`PluginVTable`] for `$ty`, lazily constructing one instance with
/// `$ctor`. Usable in `static` initialisers.
#[macro_export]
macro_rules! plugin_vtable {
    ($ty:ty, $ctor:expr) => {{
        fn __gptchat_instance() -> &'static $ty {
            static INSTANCE: ::std::sync::OnceLock<$ty> = ::std::sync::OnceLock::new();
            INSTANCE.get_or_init(|| $ctor)
        }

        extern "C" fn __gptchat_identifier() -> *mut ::std::ffi::c_char {
            $crate::ffi::identifier(__gptchat_instance)
        }

        extern "C" fn __gptchat_example() -> *mut ::std::ffi::c_char {
            $crate::ffi::example(__gptchat_instance)
        }

        extern "C" fn __gptchat_execute(
            input: *const ::std::ffi::c_char,
        ) -> *mut ::std::ffi::c_char {
            // SAFETY: the host passes a NUL-terminated string or null.
            unsafe { $crate::ffi::execute(__gptchat_instance, input) }
        }

        extern "C" fn __gptchat_free(ptr: *mut ::std::ffi::c_char) {
            // SAFETY: the host only frees pointers this library handed out.
            unsafe { $crate::ffi::free_string(ptr) }
        }

        $crate::PluginVTable {
            abi_version: $crate::ABI_VERSION,
            identifier: __gptchat_identifier,
            example: __gptchat_example,
            execute: __gptchat_execute,
            free_string: __gptchat_free,
        }
    }};
}

/// Exports `$ty` as this library's plugin under [`ENTRY_SYMBOL`].
#[macro_export]
macro_rules! export_plugin {
    ($ty:ty, $ctor:expr) => {
        #[no_mangle]
        pub static GPTCHAT_PLUGIN: $crate::PluginVTable = $crate::plugin_vtable!($ty, $ctor);
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::ffi::{CStr, CString};

    struct Echo;

    impl Plugin for Echo {
        fn identifier(&self) -> &str {
            "echo"
        }

        fn example(&self) -> String {
            "/echo {}".to_string()
        }

        fn execute(&self, input: Map<String, Value>) -> Result<Map<String, Value>, String> {
            if input.contains_key("boom") {
                panic!("asked to explode");
            }
            if input.contains_key("fail") {
                return Err("told to fail".to_string());
            }
            Ok(input)
        }
    }

    static ECHO: PluginVTable = plugin_vtable!(Echo, Echo);

    fn take(vtable: &PluginVTable, ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        (vtable.free_string)(ptr);
        s
    }

    fn call(input: &str) -> Envelope {
        let c_input = CString::new(input).unwrap();
        let out = take(&ECHO, (ECHO.execute)(c_input.as_ptr()));
        serde_json::from_str(&out).unwrap()
    }

    #[test]
    fn vtable_reports_identity() {
        assert_eq!(ECHO.abi_version, ABI_VERSION);
        assert_eq!(take(&ECHO, (ECHO.identifier)()), "echo");
        assert_eq!(take(&ECHO, (ECHO.example)()), "/echo {}");
    }

    #[test]
    fn execute_wraps_output_and_errors() {
        match call(r#"{"value": 5}"#) {
            Envelope::Output(map) => assert_eq!(map.get("value"), Some(&json!(5))),
            other => panic!("unexpected envelope: {:?}", other),
        }
        assert_eq!(call(r#"{"fail": true}"#), Envelope::Error("told to fail".to_string()));
    }

    #[test]
    fn execute_rejects_non_object_input() {
        match call("[1, 2]") {
            Envelope::Error(msg) => assert!(msg.contains("invalid input")),
            other => panic!("unexpected envelope: {:?}", other),
        }
    }

    #[test]
    fn panics_do_not_cross_the_boundary() {
        match call(r#"{"boom": 1}"#) {
            Envelope::Error(msg) => assert!(msg.contains("asked to explode")),
            other => panic!("unexpected envelope: {:?}", other),
        }
    }

    #[test]
    fn envelope_wire_shape() {
        let ok = serde_json::to_value(Envelope::Output(Map::new())).unwrap();
        assert_eq!(ok, json!({ "output": {} }));
        let err = serde_json::to_value(Envelope::Error("x".into())).unwrap();
        assert_eq!(err, json!({ "error": "x" }));
    }
}
