//! FFI bridge for GUI front ends
//!
//! Exposes the idereset operations via C-ABI functions. Every returned string
//! is JSON and must be freed with `idereset_free_string`.
//!
//! `selector` arguments are either NULL (every detected IDE), an IDE slug or
//! display name, or a JSON-encoded IDE descriptor.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use crate::api::{Api, Target};
use crate::automation::{AutomationOptions, CancelToken, ProgressEvent, StorageOptions};
use crate::cleaner::ResultTree;

/// Progress callback for long runs; receives one JSON event per call
pub type ProgressCallback = extern "C" fn(event_json: *const c_char);

/// Cancel tokens of operations currently running
static ACTIVE: Mutex<Vec<CancelToken>> = Mutex::new(Vec::new());

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Convert a Rust string to a C string pointer. Caller must free with `idereset_free_string`.
fn to_c_string(s: &str) -> *mut c_char {
    CString::new(s).unwrap_or_default().into_raw()
}

/// Convert a JSON-serializable value to a C string pointer.
fn json_to_c<T: serde::Serialize>(val: &T) -> *mut c_char {
    match serde_json::to_string(val) {
        Ok(s) => to_c_string(&s),
        Err(e) => error_c(&format!("Failed to serialize response: {}", e)),
    }
}

/// Return an error JSON as a C string.
fn error_c(msg: &str) -> *mut c_char {
    let val = serde_json::json!({"error": msg});
    to_c_string(&val.to_string())
}

/// Borrow an optional C string argument
fn read_arg(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_target(selector: *const c_char) -> Result<Target, String> {
    match read_arg(selector) {
        None => Ok(Target::All),
        Some(s) if s.starts_with('{') => serde_json::from_str(&s)
            .map(|d| Target::Descriptor(Box::new(d)))
            .map_err(|e| format!("Invalid IDE descriptor: {}", e)),
        Some(s) => Ok(Target::Named(s)),
    }
}

fn parse_options<T: serde::de::DeserializeOwned + Default>(
    json: *const c_char,
    what: &str,
) -> Result<T, String> {
    match read_arg(json) {
        None => Ok(T::default()),
        Some(s) => serde_json::from_str(&s).map_err(|e| format!("Invalid {}: {}", what, e)),
    }
}

/// Run `op` on a fresh Api; panics and argument errors come back as error JSON
fn with_api<F>(selector: *const c_char, op: F) -> *mut c_char
where
    F: FnOnce(&mut Api, &Target) -> ResultTree,
{
    let target = match parse_target(selector) {
        Ok(t) => t,
        Err(e) => return error_c(&e),
    };

    let mut api = Api::from_system();
    let token = api.cancel_token();
    if let Ok(mut active) = ACTIVE.lock() {
        active.push(token.clone());
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| op(&mut api, &target)));

    if let Ok(mut active) = ACTIVE.lock() {
        active.retain(|t| !t.same_as(&token));
    }

    match outcome {
        Ok(tree) => json_to_c(&tree),
        Err(_) => error_c("Operation panicked"),
    }
}

// ─── Memory Management ──────────────────────────────────────────────────────

/// Free a string returned by any idereset FFI function.
#[no_mangle]
pub extern "C" fn idereset_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}

// ─── Detection ───────────────────────────────────────────────────────────────

/// Detect installed IDEs. Returns a JSON array of descriptors.
#[no_mangle]
pub extern "C" fn idereset_detect_ides() -> *mut c_char {
    match catch_unwind(|| Api::from_system().detect_ides()) {
        Ok(ides) => json_to_c(&ides),
        Err(_) => error_c("Detection panicked"),
    }
}

// ─── Single operations ───────────────────────────────────────────────────────

#[no_mangle]
pub extern "C" fn idereset_modify_telemetry(selector: *const c_char) -> *mut c_char {
    with_api(selector, |api, target| api.modify_telemetry(target))
}

#[no_mangle]
pub extern "C" fn idereset_clean_database(selector: *const c_char) -> *mut c_char {
    with_api(selector, |api, target| api.clean_database(target))
}

#[no_mangle]
pub extern "C" fn idereset_clean_workspace(selector: *const c_char) -> *mut c_char {
    with_api(selector, |api, target| api.clean_workspace(target))
}

#[no_mangle]
pub extern "C" fn idereset_clean_global_storage(selector: *const c_char) -> *mut c_char {
    with_api(selector, |api, target| api.clean_global_storage(target))
}

/// Comprehensive storage clean.
/// options_json: `{"include_workspace_storage": bool, "include_global_storage": bool}`,
/// NULL for both.
#[no_mangle]
pub extern "C" fn idereset_clean_storage(
    selector: *const c_char,
    options_json: *const c_char,
) -> *mut c_char {
    let options: StorageOptions = match parse_options(options_json, "storage options") {
        Ok(o) => o,
        Err(e) => return error_c(&e),
    };
    with_api(selector, |api, target| {
        api.clean_storage_comprehensive(target, &options)
    })
}

// ─── Pipelines ───────────────────────────────────────────────────────────────

fn forward(callback: Option<ProgressCallback>) -> impl FnMut(ProgressEvent) {
    move |event| {
        if let Some(cb) = callback {
            if let Ok(json) = serde_json::to_string(&event) {
                if let Ok(s) = CString::new(json) {
                    cb(s.as_ptr());
                }
            }
        }
    }
}

/// Every cleaning operation on each IDE, without touching processes
#[no_mangle]
pub extern "C" fn idereset_run_all(
    selector: *const c_char,
    progress: Option<ProgressCallback>,
) -> *mut c_char {
    let mut on_event = forward(progress);
    with_api(selector, |api, target| {
        api.run_all_operations(target, &mut on_event)
    })
}

/// Full automation. options_json follows `AutomationOptions`; NULL uses the
/// configured defaults.
#[no_mangle]
pub extern "C" fn idereset_run_automation(
    selector: *const c_char,
    options_json: *const c_char,
    progress: Option<ProgressCallback>,
) -> *mut c_char {
    let options: Option<AutomationOptions> = match read_arg(options_json) {
        None => None,
        Some(s) => match serde_json::from_str(&s) {
            Ok(o) => Some(o),
            Err(e) => return error_c(&format!("Invalid automation options: {}", e)),
        },
    };
    let mut on_event = forward(progress);
    with_api(selector, |api, target| {
        api.run_full_automation(target, options.as_ref(), &mut on_event)
    })
}

/// Ask every running operation to stop after its current step.
/// Returns the number of operations signalled.
#[no_mangle]
pub extern "C" fn idereset_cancel() -> u32 {
    match ACTIVE.lock() {
        Ok(active) => {
            active.iter().for_each(CancelToken::cancel);
            active.len() as u32
        }
        Err(_) => 0,
    }
}

// ─── Version ─────────────────────────────────────────────────────────────────

/// Get idereset version string.
#[no_mangle]
pub extern "C" fn idereset_version() -> *mut c_char {
    to_c_string(env!("CARGO_PKG_VERSION"))
}
