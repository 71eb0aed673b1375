//! Per-binary-format capabilities behind one trait.
//!
//! The relocation engine only talks to [`Platform`]; ELF and PE differ in the
//! tool that lists dependencies, in how names compare, and in whether a search
//! path can be written into the binary at all.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use crate::analyze::{
    list_elf_dependencies, list_pe_dependencies, run_tool, LibraryReference, SearchContext,
};
use crate::error::{BundleError, BundleResult, ToolError};
use crate::paths::{dirs_from_env, linux_system_lib_dirs, windows_system_dirs};

/// Runtime libraries that are safe to ship inside an ELF bundle.
const LINUX_ALLOW_LIST: &[&str] = &[
    "libstdc++.so.6",
    "libgcc_s.so.1",
    "libgomp.so.1",
    "libatomic.so.1",
    "libgfortran.so.5",
    "libquadmath.so.0",
];

/// Runtime DLLs that are safe to ship inside a PE bundle (lowercase).
const WINDOWS_ALLOW_LIST: &[&str] = &[
    "vcruntime140.dll",
    "vcruntime140_1.dll",
    "msvcp140.dll",
    "msvcp140_1.dll",
    "msvcp140_2.dll",
    "concrt140.dll",
    "vcomp140.dll",
    "libgcc_s_seh-1.dll",
    "libstdc++-6.dll",
    "libwinpthread-1.dll",
];

/// Search path to write into a binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPath<'a> {
    /// Only the directory the binary itself lives in.
    OwnDirectory,
    /// A directory relative to the binary's own directory.
    Relative(&'a Path),
}

/// What the relocation engine needs from a binary format.
pub trait Platform: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    /// List the libraries `binary` links against, in tool order.
    fn enumerate(
        &self,
        binary: &Path,
        context: &SearchContext,
    ) -> BundleResult<Vec<LibraryReference>>;

    /// Replace the library search path embedded in `binary`.
    fn set_search_path(&self, binary: &Path, search_path: SearchPath<'_>) -> BundleResult<()>;

    /// Whether the loader matches library names case-insensitively.
    fn names_ignore_case(&self) -> bool {
        false
    }

    /// Libraries bundled even though they come from the host.
    fn default_allow_list(&self) -> &'static [&'static str] {
        &[]
    }

    /// Host directories searched for allow-listed libraries, in order.
    fn host_search_dirs(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Debug-info file that travels with `library`, if the format has one.
    fn debug_companion(&self, _library: &Path) -> Option<PathBuf> {
        None
    }
}

/// Target binary format, as named in configuration and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TargetPlatform {
    Linux,
    Windows,
}

impl TargetPlatform {
    /// The format native to the machine running the bundler.
    pub fn host() -> Self {
        if cfg!(windows) {
            TargetPlatform::Windows
        } else {
            TargetPlatform::Linux
        }
    }

    pub fn build(self, tools: &ToolPaths) -> Box<dyn Platform> {
        match self {
            TargetPlatform::Linux => Box::new(Linux {
                ldd: tools.ldd.clone(),
                patchelf: tools.patchelf.clone(),
            }),
            TargetPlatform::Windows => Box::new(Windows {
                dumpbin: tools.dumpbin.clone(),
            }),
        }
    }
}

/// Programs used for enumeration and patching.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolPaths {
    pub ldd: PathBuf,
    pub patchelf: PathBuf,
    pub dumpbin: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ldd: PathBuf::from("ldd"),
            patchelf: PathBuf::from("patchelf"),
            dumpbin: PathBuf::from("dumpbin"),
        }
    }
}

/// ELF binaries: `ldd` to enumerate, `patchelf` to rewrite `RUNPATH`.
#[derive(Debug, Clone)]
pub struct Linux {
    pub ldd: PathBuf,
    pub patchelf: PathBuf,
}

impl Default for Linux {
    fn default() -> Self {
        let tools = ToolPaths::default();
        Self {
            ldd: tools.ldd,
            patchelf: tools.patchelf,
        }
    }
}

/// `$ORIGIN`-based rpath value for a search path.
pub fn origin_rpath(search_path: SearchPath<'_>) -> String {
    match search_path {
        SearchPath::Relative(rel) if !rel.as_os_str().is_empty() => {
            let rel: Vec<_> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            format!("$ORIGIN/{}", rel.join("/"))
        }
        _ => "$ORIGIN".to_string(),
    }
}

impl Platform for Linux {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn enumerate(
        &self,
        binary: &Path,
        context: &SearchContext,
    ) -> BundleResult<Vec<LibraryReference>> {
        list_elf_dependencies(&self.ldd, binary, context)
    }

    fn set_search_path(&self, binary: &Path, search_path: SearchPath<'_>) -> BundleResult<()> {
        let rpath = origin_rpath(search_path);
        let tool = self.patchelf.display().to_string();
        debug!("setting rpath of {} to {}", binary.display(), rpath);

        let fail = |source| BundleError::MetadataRewriteFailed {
            binary: binary.to_path_buf(),
            source,
        };
        let output = run_tool(
            Command::new(&self.patchelf)
                .arg("--set-rpath")
                .arg(&rpath)
                .arg(binary),
            &tool,
        )
        .map_err(fail)?;

        if !output.status.success() {
            return Err(fail(ToolError::Exit {
                tool,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }));
        }
        Ok(())
    }

    fn default_allow_list(&self) -> &'static [&'static str] {
        LINUX_ALLOW_LIST
    }

    fn host_search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = dirs_from_env("LD_LIBRARY_PATH");
        dirs.extend(linux_system_lib_dirs());
        dirs
    }

    /// `libfoo.so.1` -> `libfoo.so.1.debug`, next to the library.
    fn debug_companion(&self, library: &Path) -> Option<PathBuf> {
        let mut name = library.file_name()?.to_os_string();
        name.push(".debug");
        Some(library.with_file_name(name))
    }
}

/// PE binaries: `dumpbin` to enumerate; DLLs sit beside the executable.
#[derive(Debug, Clone)]
pub struct Windows {
    pub dumpbin: PathBuf,
}

impl Default for Windows {
    fn default() -> Self {
        Self {
            dumpbin: ToolPaths::default().dumpbin,
        }
    }
}

impl Platform for Windows {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn enumerate(
        &self,
        binary: &Path,
        _context: &SearchContext,
    ) -> BundleResult<Vec<LibraryReference>> {
        list_pe_dependencies(&self.dumpbin, binary)
    }

    /// The loader always searches the application directory first and PE has
    /// no embedded search path, so only "own directory" can be honoured.
    fn set_search_path(&self, binary: &Path, search_path: SearchPath<'_>) -> BundleResult<()> {
        match search_path {
            SearchPath::Relative(rel) if !rel.as_os_str().is_empty() => {
                Err(BundleError::MetadataRewriteFailed {
                    binary: binary.to_path_buf(),
                    source: ToolError::Unsupported(format!(
                        "PE binaries cannot search {}; DLLs must be placed beside the executable",
                        rel.display()
                    )),
                })
            }
            _ => Ok(()),
        }
    }

    fn names_ignore_case(&self) -> bool {
        true
    }

    fn default_allow_list(&self) -> &'static [&'static str] {
        WINDOWS_ALLOW_LIST
    }

    fn host_search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = dirs_from_env("PATH");
        dirs.extend(windows_system_dirs());
        dirs
    }

    /// `foo.dll` -> `foo.pdb`.
    fn debug_companion(&self, library: &Path) -> Option<PathBuf> {
        Some(library.with_extension("pdb"))
    }
}
