//! Path construction for the core library and plugin modules.
//!
//! Installed layout:
//!
//! ```text
//! <prefix>/bin/logos-test
//! <prefix>/lib/liblogos_core.{so,dylib}
//! <prefix>/modules/<name>_plugin.{so,dylib,dll}
//! ```

use std::path::{Component, Path, PathBuf};

/// File extension of native plugin libraries on this platform.
#[cfg(target_os = "macos")]
pub const PLUGIN_EXTENSION: &str = "dylib";

#[cfg(target_os = "windows")]
pub const PLUGIN_EXTENSION: &str = "dll";

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub const PLUGIN_EXTENSION: &str = "so";

/// Suffix appended to a plugin name to form its library file stem.
pub const PLUGIN_FILE_SUFFIX: &str = "_plugin";

/// Environment variable overriding the core library location.
pub const CORE_LIBRARY_ENV: &str = "LOGOS_CORE_LIB";

/// File name of the hosting core shared library on this platform.
pub fn core_library_file_name() -> &'static str {
    if cfg!(target_os = "macos") {
        "liblogos_core.dylib"
    } else if cfg!(target_os = "windows") {
        "logos_core.dll"
    } else {
        "liblogos_core.so"
    }
}

/// Lexically normalize a path.
///
/// Drops `.` components, folds `..` into the preceding normal component and
/// discards `..` directly above the root. Leading `..` on relative paths is
/// kept. The filesystem is never consulted.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}

fn sibling_of_exe_dir(exe_path: &Path, relative: &str) -> PathBuf {
    let exe_dir = exe_path.parent().unwrap_or_else(|| Path::new("."));
    clean_path(&exe_dir.join(relative))
}

/// Default plugins directory: `<exe dir>/../modules`.
pub fn default_plugins_dir(exe_path: &Path) -> PathBuf {
    sibling_of_exe_dir(exe_path, "../modules")
}

/// Default core library: `<exe dir>/../lib/<core library file>`.
pub fn default_core_library(exe_path: &Path) -> PathBuf {
    sibling_of_exe_dir(exe_path, "../lib").join(core_library_file_name())
}

/// Path of the library implementing plugin `name` inside `dir`.
pub fn plugin_library_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}{PLUGIN_FILE_SUFFIX}.{PLUGIN_EXTENSION}"))
}

/// Recover the plugin name from a plugin library path, if it follows the
/// `<name>_plugin.<ext>` convention.
pub fn plugin_name_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let name = stem.strip_suffix(PLUGIN_FILE_SUFFIX)?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
