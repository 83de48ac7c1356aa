//! Plumbing behind [`plugin_vtable!`](crate::plugin_vtable).
//!
//! Every exported function runs inside [`guard`] so a panicking plugin hands the
//! host an error instead of unwinding across `extern "C"`.

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use serde_json::{Map, Value};

use crate::{Envelope, Plugin};

/// Extract a human-readable message from a panic payload.
pub fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

/// Run `f`, converting a panic into `Err("panic in `op`: ...")`.
pub fn guard<T>(op: &'static str, f: impl FnOnce() -> T) -> Result<T, String> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(f))
        .map_err(|payload| format!("panic in plugin `{op}`: {}", panic_message(payload)))
}

/// Hand ownership of `s` to the caller. Interior NULs are dropped.
pub fn into_raw(s: String) -> *mut c_char {
    let cleaned = if s.contains('\0') { s.replace('\0', "") } else { s };
    CString::new(cleaned)
        .map(CString::into_raw)
        .unwrap_or(ptr::null_mut())
}

pub fn identifier<P: Plugin>(instance: fn() -> &'static P) -> *mut c_char {
    guard("identifier", || into_raw(instance().identifier().to_string())).unwrap_or(ptr::null_mut())
}

pub fn example<P: Plugin>(instance: fn() -> &'static P) -> *mut c_char {
    guard("example", || into_raw(instance().example())).unwrap_or(ptr::null_mut())
}

/// # Safety
///
/// `input` must be null or point to a NUL-terminated string valid for the call.
pub unsafe fn execute<P: Plugin>(instance: fn() -> &'static P, input: *const c_char) -> *mut c_char {
    let envelope = if input.is_null() {
        Envelope::Error("null input".to_string())
    } else {
        let raw = unsafe { CStr::from_ptr(input) }.to_string_lossy().into_owned();
        match serde_json::from_str::<Map<String, Value>>(&raw) {
            Err(e) => Envelope::Error(format!("invalid input: {e}")),
            Ok(map) => match guard("execute", || instance().execute(map)) {
                Ok(Ok(output)) => Envelope::Output(output),
                Ok(Err(e)) => Envelope::Error(e),
                Err(panic) => Envelope::Error(panic),
            },
        }
    };
    serde_json::to_string(&envelope)
        .map(into_raw)
        .unwrap_or(ptr::null_mut())
}

/// # Safety
///
/// `ptr` must be null or a pointer produced by [`into_raw`] that was not freed yet.
pub unsafe fn free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_reports_panic_text() {
        let err = guard("op", || -> u8 { panic!("kaput") }).unwrap_err();
        assert_eq!(err, "panic in plugin `op`: kaput");
        assert_eq!(guard("op", || 7), Ok(7));
    }

    #[test]
    fn into_raw_strips_interior_nul() {
        let ptr = into_raw("a\0b".to_string());
        let back = unsafe { CString::from_raw(ptr) };
        assert_eq!(back.to_str().unwrap(), "ab");
    }
}
