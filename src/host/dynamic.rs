//! Hosting core backed by the `liblogos_core` shared library.
//!
//! The library is opened with `libloading` and every entry point is resolved
//! up front, so a library from an incompatible build fails at open time
//! rather than halfway through a run.

use crate::core::{Error, Result};
use crate::host::ffi::{self, *};
use crate::host::LogosCore;
use libloading::Library;
use std::ffi::{c_char, c_int, CString};
use std::path::{Path, PathBuf};
use std::ptr;
use tracing::{debug, info};

/// Resolved entry points. Only valid while the owning [`Library`] is alive.
struct CoreApi {
    init: InitFn,
    set_plugins_dir: SetPluginsDirFn,
    start: StartFn,
    exec: ExecFn,
    cleanup: CleanupFn,
    get_loaded_plugins: PluginListFn,
    get_known_plugins: PluginListFn,
    load_plugin: LoadPluginFn,
    process_plugin: ProcessPluginFn,
    call_plugin_method_async: CallPluginMethodAsyncFn,
}

/// [`LogosCore`] implementation over a dynamically loaded `liblogos_core`.
pub struct DynamicCore {
    path: PathBuf,
    api: CoreApi,
    // Must outlive every pointer in `api`.
    _library: Library,
}

unsafe fn resolve<T: Copy>(library: &Library, name: &str) -> Result<T> {
    library
        .get::<T>(name.as_bytes())
        .map(|symbol| *symbol)
        .map_err(|_| Error::SymbolMissing(name.to_string()))
}

impl DynamicCore {
    /// Open the core library at `path` and resolve its C API.
    pub fn open(path: &Path) -> Result<Self> {
        info!("Loading core library: {}", path.display());

        let library = unsafe { Library::new(path) }.map_err(|e| Error::LibraryLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let api = unsafe {
            CoreApi {
                init: resolve(&library, SYM_INIT)?,
                set_plugins_dir: resolve(&library, SYM_SET_PLUGINS_DIR)?,
                start: resolve(&library, SYM_START)?,
                exec: resolve(&library, SYM_EXEC)?,
                cleanup: resolve(&library, SYM_CLEANUP)?,
                get_loaded_plugins: resolve(&library, SYM_GET_LOADED_PLUGINS)?,
                get_known_plugins: resolve(&library, SYM_GET_KNOWN_PLUGINS)?,
                load_plugin: resolve(&library, SYM_LOAD_PLUGIN)?,
                process_plugin: resolve(&library, SYM_PROCESS_PLUGIN)?,
                call_plugin_method_async: resolve(&library, SYM_CALL_PLUGIN_METHOD_ASYNC)?,
            }
        };

        debug!("Resolved core API from {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            api,
            _library: library,
        })
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogosCore for DynamicCore {
    fn init(&self, args: &[String]) -> Result<()> {
        if args.is_empty() {
            unsafe { (self.api.init)(0, ptr::null_mut()) };
            return Ok(());
        }

        // The core may hold on to argv for the lifetime of the process.
        let mut argv = args
            .iter()
            .map(|arg| ffi::to_c_string(arg).map(CString::into_raw))
            .collect::<Result<Vec<*mut c_char>>>()?;
        argv.push(ptr::null_mut());
        let argc = args.len() as c_int;
        let argv = Box::leak(argv.into_boxed_slice());

        unsafe { (self.api.init)(argc, argv.as_mut_ptr()) };
        Ok(())
    }

    fn set_plugins_dir(&self, dir: &Path) -> Result<()> {
        let dir = ffi::to_c_string(&dir.to_string_lossy())?;
        unsafe { (self.api.set_plugins_dir)(dir.as_ptr()) };
        Ok(())
    }

    fn start(&self) {
        unsafe { (self.api.start)() }
    }

    fn exec(&self) -> i32 {
        unsafe { (self.api.exec)() }
    }

    fn cleanup(&self) {
        unsafe { (self.api.cleanup)() }
    }

    fn loaded_plugins(&self) -> Vec<String> {
        unsafe { ffi::read_string_array((self.api.get_loaded_plugins)() as *const *const c_char) }
    }

    fn known_plugins(&self) -> Vec<String> {
        unsafe { ffi::read_string_array((self.api.get_known_plugins)() as *const *const c_char) }
    }

    fn load_plugin(&self, name: &str) -> Result<bool> {
        let name = ffi::to_c_string(name)?;
        Ok(unsafe { (self.api.load_plugin)(name.as_ptr()) } != 0)
    }

    fn process_plugin(&self, path: &Path) -> Result<Option<String>> {
        let path = ffi::to_c_string(&path.to_string_lossy())?;
        Ok(unsafe { ffi::read_c_string((self.api.process_plugin)(path.as_ptr())) })
    }

    fn call_plugin_method_async(
        &self,
        plugin: &str,
        method: &str,
        json_args: &str,
        callback: MethodCallback,
    ) -> Result<()> {
        let plugin = ffi::to_c_string(plugin)?;
        let method = ffi::to_c_string(method)?;
        let json_args = ffi::to_c_string(json_args)?;

        let user_data = ffi::callback_into_user_data(callback);
        unsafe {
            (self.api.call_plugin_method_async)(
                plugin.as_ptr(),
                method.as_ptr(),
                json_args.as_ptr(),
                Some(method_callback_trampoline),
                user_data,
            )
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_library() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(crate::paths::core_library_file_name());

        match DynamicCore::open(&path) {
            Err(Error::LibraryLoad { path: p, .. }) => assert!(p.contains("logos_core")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opening a missing library must fail"),
        }
    }

    #[test]
    fn test_open_non_library_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(crate::paths::core_library_file_name());
        std::fs::write(&path, b"not a shared object").unwrap();

        assert!(matches!(
            DynamicCore::open(&path),
            Err(Error::LibraryLoad { .. })
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_open_library_without_core_symbols() {
        match DynamicCore::open(Path::new("libc.so.6")) {
            Err(Error::SymbolMissing(symbol)) => assert_eq!(symbol, SYM_INIT),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("libc does not export the core API"),
        }
    }
}
