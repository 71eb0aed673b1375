//! Library search directories and path arithmetic.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Find a library by file name in an ordered list of directories.
///
/// Dangling symlinks count as present: the copy step resolves them and reports
/// a proper error instead of the library silently going missing.
///
/// Returns `None` if the library is not found in any search path.
#[must_use = "found library path should be used"]
pub fn find_library(search_dirs: &[PathBuf], lib_name: &str) -> Option<PathBuf> {
    search_dirs
        .iter()
        .map(|dir| dir.join(lib_name))
        .find(|p| p.is_file() || p.is_symlink())
}

/// Directories listed in a search-path environment variable, in order.
///
/// Empty entries are skipped rather than treated as the current directory.
pub fn dirs_from_env(var: &str) -> Vec<PathBuf> {
    env::var_os(var)
        .map(|value| {
            env::split_paths(&value)
                .filter(|p| !p.as_os_str().is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Standard library directories of a Linux host.
pub fn linux_system_lib_dirs() -> Vec<PathBuf> {
    let multiarch = format!("{}-linux-gnu", env::consts::ARCH);
    vec![
        PathBuf::from("/lib").join(&multiarch),
        PathBuf::from("/usr/lib").join(&multiarch),
        PathBuf::from("/usr/lib64"),
        PathBuf::from("/lib64"),
        PathBuf::from("/usr/lib"),
        PathBuf::from("/lib"),
        PathBuf::from("/usr/local/lib"),
    ]
}

/// System DLL directory of a Windows host, when `SystemRoot` is set.
pub fn windows_system_dirs() -> Vec<PathBuf> {
    env::var_os("SystemRoot")
        .map(|root| vec![PathBuf::from(root).join("System32")])
        .unwrap_or_default()
}

/// Path of `to` relative to the directory `from`, both absolute.
///
/// `relative_path("/out/app/bin", "/out/app/lib")` is `../lib`; identical
/// directories give an empty path.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..from.len() {
        relative.push("..");
    }
    for component in &to[common..] {
        relative.push(component.as_os_str());
    }
    relative
}
