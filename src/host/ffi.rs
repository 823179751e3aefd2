//! Raw C ABI of `liblogos_core`.
//!
//! Function pointer types for every exported symbol, plus the helpers that
//! move data across the boundary.

use crate::core::Result;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Completion callback handed to the core for asynchronous method calls.
///
/// Receives the success flag and the result payload (or error message).
pub type MethodCallback = Box<dyn FnOnce(bool, String) + Send + 'static>;

pub type AsyncCallbackFn =
    unsafe extern "C" fn(result: c_int, message: *const c_char, user_data: *mut c_void);

pub type InitFn = unsafe extern "C" fn(argc: c_int, argv: *mut *mut c_char);
pub type SetPluginsDirFn = unsafe extern "C" fn(plugins_dir: *const c_char);
pub type StartFn = unsafe extern "C" fn();
pub type ExecFn = unsafe extern "C" fn() -> c_int;
pub type CleanupFn = unsafe extern "C" fn();
pub type PluginListFn = unsafe extern "C" fn() -> *mut *mut c_char;
pub type LoadPluginFn = unsafe extern "C" fn(plugin_name: *const c_char) -> c_int;
pub type ProcessPluginFn = unsafe extern "C" fn(plugin_path: *const c_char) -> *mut c_char;
pub type CallPluginMethodAsyncFn = unsafe extern "C" fn(
    plugin_name: *const c_char,
    method_name: *const c_char,
    params_json: *const c_char,
    callback: Option<AsyncCallbackFn>,
    user_data: *mut c_void,
);

pub const SYM_INIT: &str = "logos_core_init";
pub const SYM_SET_PLUGINS_DIR: &str = "logos_core_set_plugins_dir";
pub const SYM_START: &str = "logos_core_start";
pub const SYM_EXEC: &str = "logos_core_exec";
pub const SYM_CLEANUP: &str = "logos_core_cleanup";
pub const SYM_GET_LOADED_PLUGINS: &str = "logos_core_get_loaded_plugins";
pub const SYM_GET_KNOWN_PLUGINS: &str = "logos_core_get_known_plugins";
pub const SYM_LOAD_PLUGIN: &str = "logos_core_load_plugin";
pub const SYM_PROCESS_PLUGIN: &str = "logos_core_process_plugin";
pub const SYM_CALL_PLUGIN_METHOD_ASYNC: &str = "logos_core_call_plugin_method_async";

/// Convert a Rust string into a C string, rejecting interior NUL bytes.
pub fn to_c_string(value: &str) -> Result<CString> {
    Ok(CString::new(value)?)
}

/// Copy a NUL-terminated C string. A null pointer yields `None`.
///
/// # Safety
///
/// `ptr` must be null or point to a valid NUL-terminated string.
pub unsafe fn read_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

/// Copy a NULL-terminated array of C strings. A null array is empty.
///
/// The array stays owned by the core.
///
/// # Safety
///
/// `list` must be null or point to a NULL-terminated array of valid
/// NUL-terminated strings.
pub unsafe fn read_string_array(list: *const *const c_char) -> Vec<String> {
    let mut result = Vec::new();
    if list.is_null() {
        return result;
    }

    let mut index = 0;
    loop {
        let entry = *list.add(index);
        if entry.is_null() {
            break;
        }
        result.push(CStr::from_ptr(entry).to_string_lossy().into_owned());
        index += 1;
    }
    result
}

/// Box a callback so it can travel through the core as `user_data`.
pub fn callback_into_user_data(callback: MethodCallback) -> *mut c_void {
    Box::into_raw(Box::new(callback)) as *mut c_void
}

/// `extern "C"` entry point the core invokes when an async call completes.
///
/// Takes back ownership of the boxed [`MethodCallback`] and runs it once.
/// Panics are contained so they never unwind into the core.
///
/// # Safety
///
/// `user_data` must come from [`callback_into_user_data`] and the core must
/// invoke this at most once per call.
pub unsafe extern "C" fn method_callback_trampoline(
    result: c_int,
    message: *const c_char,
    user_data: *mut c_void,
) {
    if user_data.is_null() {
        return;
    }
    let callback = Box::from_raw(user_data as *mut MethodCallback);
    let message = read_c_string(message).unwrap_or_default();

    let outcome = catch_unwind(AssertUnwindSafe(move || callback(result != 0, message)));
    if outcome.is_err() {
        tracing::error!("Method callback panicked; result discarded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;
    use std::sync::mpsc;

    #[test]
    fn test_read_string_array() {
        let names = [
            CString::new("package_manager").unwrap(),
            CString::new("capability_module").unwrap(),
        ];
        let raw: Vec<*const c_char> = names
            .iter()
            .map(|s| s.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();

        let list = unsafe { read_string_array(raw.as_ptr()) };
        assert_eq!(list, vec!["package_manager", "capability_module"]);
    }

    #[test]
    fn test_read_null_array_is_empty() {
        let list = unsafe { read_string_array(ptr::null()) };
        assert!(list.is_empty());
    }

    #[test]
    fn test_read_c_string_lossy() {
        let bytes = b"caf\xff\0";
        let value = unsafe { read_c_string(bytes.as_ptr() as *const c_char) };
        assert_eq!(value, Some("caf\u{fffd}".to_string()));
        assert_eq!(unsafe { read_c_string(ptr::null()) }, None);
    }

    #[test]
    fn test_to_c_string_rejects_nul() {
        assert!(to_c_string("waku_module").is_ok());
        assert!(to_c_string("waku\0module").is_err());
    }

    #[test]
    fn test_trampoline_runs_callback_once() {
        let (tx, rx) = mpsc::channel();
        let user_data = callback_into_user_data(Box::new(move |ok, msg| {
            tx.send((ok, msg)).unwrap();
        }));
        let message = CString::new("{\"peers\":3}").unwrap();

        unsafe { method_callback_trampoline(1, message.as_ptr(), user_data) };

        assert_eq!(rx.recv().unwrap(), (true, "{\"peers\":3}".to_string()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_trampoline_null_message_and_failure() {
        let (tx, rx) = mpsc::channel();
        let user_data = callback_into_user_data(Box::new(move |ok, msg| {
            tx.send((ok, msg)).unwrap();
        }));

        unsafe { method_callback_trampoline(0, ptr::null(), user_data) };

        assert_eq!(rx.recv().unwrap(), (false, String::new()));
    }

    #[test]
    fn test_trampoline_contains_panics() {
        let user_data = callback_into_user_data(Box::new(|_, _| panic!("boom")));
        unsafe { method_callback_trampoline(1, ptr::null(), user_data) };
    }
}
