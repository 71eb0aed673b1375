//! Where things go inside a bundle.

use std::path::{Path, PathBuf};

use crate::platform::TargetPlatform;

/// Absolute paths of one bundle, computed once and then only read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLayout {
    pub root: PathBuf,
    pub executable: PathBuf,
    pub executable_dir: PathBuf,
    pub library_dir: PathBuf,
    pub resources_dir: PathBuf,
}

impl BundleLayout {
    /// Layout for `app_name` under `output_root`.
    ///
    /// Linux:
    /// ```text
    /// <out>/<app>/bin/<app>
    /// <out>/<app>/lib/
    /// <out>/<app>/share/<identifier>/
    /// ```
    /// Windows keeps DLLs beside the executable, since PE binaries carry no
    /// search path of their own:
    /// ```text
    /// <out>/<app>/<app>.exe
    /// <out>/<app>/Resources/
    /// ```
    pub fn new(
        target: TargetPlatform,
        output_root: &Path,
        app_name: &str,
        identifier: &str,
    ) -> Self {
        let root = output_root.join(app_name);
        match target {
            TargetPlatform::Linux => {
                let executable_dir = root.join("bin");
                Self {
                    executable: executable_dir.join(app_name),
                    executable_dir,
                    library_dir: root.join("lib"),
                    resources_dir: root.join("share").join(identifier),
                    root,
                }
            }
            TargetPlatform::Windows => Self {
                executable: root.join(format!("{app_name}.exe")),
                executable_dir: root.clone(),
                library_dir: root.clone(),
                resources_dir: root.join("Resources"),
                root,
            },
        }
    }

    /// Path an additional executable of the product takes in the bundle.
    pub fn helper_executable(&self, target: TargetPlatform, name: &str) -> PathBuf {
        match target {
            TargetPlatform::Windows if !name.to_ascii_lowercase().ends_with(".exe") => {
                self.executable_dir.join(format!("{name}.exe"))
            }
            _ => self.executable_dir.join(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linux_layout() {
        let layout = BundleLayout::new(
            TargetPlatform::Linux,
            Path::new("/out"),
            "Hello",
            "com.example.hello",
        );
        assert_eq!(layout.root, PathBuf::from("/out/Hello"));
        assert_eq!(layout.executable, PathBuf::from("/out/Hello/bin/Hello"));
        assert_eq!(layout.library_dir, PathBuf::from("/out/Hello/lib"));
        assert_eq!(
            layout.resources_dir,
            PathBuf::from("/out/Hello/share/com.example.hello")
        );
    }

    #[test]
    fn test_windows_layout_keeps_dlls_beside_exe() {
        let layout = BundleLayout::new(
            TargetPlatform::Windows,
            Path::new("/out"),
            "Hello",
            "com.example.hello",
        );
        assert_eq!(layout.executable, PathBuf::from("/out/Hello/Hello.exe"));
        assert_eq!(layout.library_dir, layout.executable_dir);
        assert_eq!(
            layout.helper_executable(TargetPlatform::Windows, "helper"),
            PathBuf::from("/out/Hello/helper.exe")
        );
    }
}
