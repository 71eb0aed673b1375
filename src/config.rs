//! `bundle.toml` loading.
//!
//! ```toml
//! app_name = "Hello"
//! identifier = "com.example.hello"
//! products_dir = "target/release"
//! output_dir = "dist"
//! platform = "linux"          # optional, defaults to the host
//! executables = ["hello"]     # optional, first one is the main executable
//! resources = ["assets"]
//!
//! [libraries]
//! allow = ["libssl.so.3"]
//! replace_default_allow_list = false
//! search_paths = ["/opt/vendor/lib"]
//!
//! [tools]
//! patchelf = "/usr/local/bin/patchelf"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{BundleError, BundleResult};
use crate::platform::{TargetPlatform, ToolPaths};

/// Bundling settings for one application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleConfig {
    pub app_name: String,
    pub identifier: String,
    pub products_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub platform: Option<TargetPlatform>,
    #[serde(default)]
    pub executables: Vec<String>,
    #[serde(default)]
    pub resources: Vec<PathBuf>,
    #[serde(default)]
    pub libraries: LibraryConfig,
    #[serde(default)]
    pub tools: ToolPaths,
}

/// Which host libraries may travel with the bundle, and where to find them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LibraryConfig {
    pub allow: Vec<String>,
    pub replace_default_allow_list: bool,
    pub search_paths: Vec<PathBuf>,
}

impl BundleConfig {
    /// Read and validate a config file. Relative paths in it are taken
    /// relative to the file's directory.
    pub fn load(path: &Path) -> BundleResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| BundleError::Config {
            file: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, path, base)
    }

    /// Parse config text; `file` is only used in error messages.
    pub fn parse(content: &str, file: &Path, base: &Path) -> BundleResult<Self> {
        let invalid = |message: String| BundleError::Config {
            file: file.to_path_buf(),
            message,
        };

        let mut config: BundleConfig = toml::from_str(content).map_err(|e| invalid(e.to_string()))?;

        if config.app_name.trim().is_empty() {
            return Err(invalid("app_name must not be empty".to_string()));
        }
        if config.app_name.contains(['/', '\\']) {
            return Err(invalid(format!(
                "app_name '{}' must not contain path separators",
                config.app_name
            )));
        }
        if config.identifier.trim().is_empty() {
            return Err(invalid("identifier must not be empty".to_string()));
        }
        if config.executables.is_empty() {
            config.executables.push(config.app_name.clone());
        }

        config.products_dir = base.join(&config.products_dir);
        config.output_dir = base.join(&config.output_dir);
        for dir in config
            .resources
            .iter_mut()
            .chain(config.libraries.search_paths.iter_mut())
        {
            *dir = base.join(&*dir);
        }
        Ok(config)
    }

    pub fn target(&self) -> TargetPlatform {
        self.platform.unwrap_or_else(TargetPlatform::host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
app_name = "Hello"
identifier = "com.example.hello"
products_dir = "target/release"
output_dir = "dist"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config =
            BundleConfig::parse(MINIMAL, Path::new("bundle.toml"), Path::new("/proj")).unwrap();
        assert_eq!(config.executables, vec!["Hello"]);
        assert_eq!(config.products_dir, PathBuf::from("/proj/target/release"));
        assert_eq!(config.output_dir, PathBuf::from("/proj/dist"));
        assert_eq!(config.tools, ToolPaths::default());
        assert!(!config.libraries.replace_default_allow_list);
    }

    #[test]
    fn test_full_config() {
        let content = r#"
app_name = "Hello"
identifier = "com.example.hello"
products_dir = "/abs/products"
output_dir = "dist"
platform = "windows"
executables = ["hello", "hello-helper"]
resources = ["assets"]

[libraries]
allow = ["libssl-3-x64.dll"]
replace_default_allow_list = true
search_paths = ["vendor"]

[tools]
dumpbin = "C:/VS/dumpbin.exe"
"#;
        let config =
            BundleConfig::parse(content, Path::new("bundle.toml"), Path::new("/proj")).unwrap();
        assert_eq!(config.target(), TargetPlatform::Windows);
        assert_eq!(config.products_dir, PathBuf::from("/abs/products"));
        assert_eq!(config.resources, vec![PathBuf::from("/proj/assets")]);
        assert_eq!(config.libraries.search_paths, vec![PathBuf::from("/proj/vendor")]);
        assert_eq!(config.tools.dumpbin, PathBuf::from("C:/VS/dumpbin.exe"));
        assert_eq!(config.tools.ldd, PathBuf::from("ldd"));
        assert_eq!(config.executables, vec!["hello", "hello-helper"]);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let content = format!("{MINIMAL}\nsign = true\n");
        let err =
            BundleConfig::parse(&content, Path::new("bundle.toml"), Path::new("/")).unwrap_err();
        assert!(matches!(err, BundleError::Config { .. }));
    }

    #[test]
    fn test_app_name_with_separator_rejected() {
        let content = MINIMAL.replace("\"Hello\"", "\"../Hello\"");
        let err =
            BundleConfig::parse(&content, Path::new("bundle.toml"), Path::new("/")).unwrap_err();
        assert!(err.to_string().contains("path separators"));
    }
}
