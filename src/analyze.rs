//! Dependency enumeration using `ldd` (ELF) and `dumpbin` (PE).
//!
//! Both tools are run as child processes and their stdout is parsed into
//! [`LibraryReference`] values. The parsers are plain functions over text so
//! they can be tested without the tools installed.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::debug;

use crate::error::{BundleError, BundleResult, ToolError};

const DUMPBIN_HEADER: &str = "Image has the following dependencies:";
const DUMPBIN_DELAY_HEADER: &str = "Image has the following delay load dependencies:";

/// A dependency as reported by the enumerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryReference {
    /// Name or path exactly as the tool printed it.
    pub name: String,
    /// Where the tool says the loader would find it, if it said anything.
    pub resolved: Option<PathBuf>,
}

impl LibraryReference {
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resolved: None,
        }
    }

    pub fn resolved(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            resolved: Some(path.into()),
        }
    }

    /// Last path component of the reference, which is what the loader matches on.
    pub fn base_name(&self) -> &str {
        self.name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.name.as_str())
    }
}

/// Extra environment handed to the dependency tool.
#[derive(Debug, Clone)]
pub struct SearchContext {
    products_dir: PathBuf,
}

impl SearchContext {
    pub fn new(products_dir: impl Into<PathBuf>) -> Self {
        Self {
            products_dir: products_dir.into(),
        }
    }

    pub fn products_dir(&self) -> &Path {
        &self.products_dir
    }

    /// `LD_LIBRARY_PATH` with the products directory in front of whatever the
    /// host already has, so freshly built libraries shadow installed ones.
    fn library_path(&self) -> OsString {
        let mut dirs = vec![self.products_dir.clone()];
        if let Some(existing) = env::var_os("LD_LIBRARY_PATH") {
            dirs.extend(env::split_paths(&existing));
        }
        env::join_paths(dirs).unwrap_or_else(|_| self.products_dir.clone().into_os_string())
    }
}

/// Run a tool to completion, capturing its output.
pub(crate) fn run_tool(command: &mut Command, tool: &str) -> Result<Output, ToolError> {
    debug!(?command, "running {}", tool);
    command.output().map_err(|source| ToolError::Spawn {
        tool: tool.to_string(),
        source,
    })
}

fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

/// List the shared libraries an ELF binary needs, via `ldd`.
///
/// The products directory is put on `LD_LIBRARY_PATH` so that libraries built
/// alongside the binary resolve even before they are relocated.
///
/// # Errors
///
/// Returns [`BundleError::EnumerationFailed`] if the binary does not exist,
/// `ldd` cannot be started, or it exits with an error other than
/// "not a dynamic executable". Static binaries and scripts yield an empty list.
pub fn list_elf_dependencies(
    ldd: &Path,
    binary: &Path,
    context: &SearchContext,
) -> BundleResult<Vec<LibraryReference>> {
    let tool = tool_name(ldd);
    let fail = |source| BundleError::EnumerationFailed {
        tool: tool.clone(),
        binary: binary.to_path_buf(),
        source,
    };

    if !binary.exists() {
        return Err(fail(ToolError::MissingInput(binary.to_path_buf())));
    }

    let output = run_tool(
        Command::new(ldd)
            .arg(binary)
            .env("LD_LIBRARY_PATH", context.library_path()),
        &tool,
    )
    .map_err(fail)?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not a dynamic executable")
            || stdout.contains("not a dynamic executable")
        {
            return Ok(Vec::new());
        }
        return Err(fail(ToolError::Exit {
            tool: tool.clone(),
            status: output.status,
            stderr: stderr.trim().to_string(),
        }));
    }

    Ok(parse_ldd_output(&stdout))
}

/// Parse `ldd` output into library references.
///
/// Example ldd output:
/// ```text
///     linux-vdso.so.1 (0x00007ffd4e1f2000)
///     libfoo.so.1 => /opt/build/libfoo.so.1 (0x00007f0c1a400000)
///     libbar.so => not found
///     libc.so.6 => /lib/x86_64-linux-gnu/libc.so.6 (0x00007f0c1a000000)
///     /lib64/ld-linux-x86-64.so.2 (0x00007f0c1a6a1000)
/// ```
///
/// The vdso has no file behind it and is dropped, as is any line that does not
/// look like a dependency.
pub fn parse_ldd_output(output: &str) -> Vec<LibraryReference> {
    output.lines().filter_map(parse_ldd_line).collect()
}

fn parse_ldd_line(line: &str) -> Option<LibraryReference> {
    let line = line.trim();
    if let Some((name, rest)) = line.split_once("=>") {
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return None;
        }
        let target = strip_load_address(rest);
        if target == "not found" {
            return Some(LibraryReference::unresolved(name));
        }
        if !target.starts_with('/') {
            return None;
        }
        return Some(LibraryReference::resolved(name, target));
    }

    // Only the program interpreter is listed by absolute path without "=>".
    let path = strip_load_address(line);
    if path.starts_with('/') && !path.ends_with(':') {
        return Some(LibraryReference::resolved(path, path));
    }
    None
}

/// Drop a trailing ` (0x...)` load address; paths may contain spaces.
fn strip_load_address(text: &str) -> &str {
    let text = text.trim();
    match text.rsplit_once(" (") {
        Some((path, address)) if address.ends_with(')') => path.trim_end(),
        _ => text,
    }
}

/// List the DLLs a PE binary imports, via `dumpbin /DEPENDENTS`.
///
/// # Errors
///
/// [`BundleError::EnumerationFailed`] when dumpbin is missing or fails, and
/// [`BundleError::MalformedToolOutput`] when its report has no dependency block.
pub fn list_pe_dependencies(dumpbin: &Path, binary: &Path) -> BundleResult<Vec<LibraryReference>> {
    let tool = tool_name(dumpbin);
    let fail = |source| BundleError::EnumerationFailed {
        tool: tool.clone(),
        binary: binary.to_path_buf(),
        source,
    };

    if !binary.exists() {
        return Err(fail(ToolError::MissingInput(binary.to_path_buf())));
    }

    let output = run_tool(Command::new(dumpbin).arg("/DEPENDENTS").arg(binary), &tool)
        .map_err(fail)?;
    if !output.status.success() {
        return Err(fail(ToolError::Exit {
            tool: tool.clone(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_dumpbin_output(&stdout)
        .map_err(|reason| BundleError::malformed(&tool, binary.to_path_buf(), reason, &stdout))
}

/// Parse `dumpbin /DEPENDENTS` output.
///
/// Example dumpbin output:
/// ```text
/// Dump of file app.exe
///
/// File Type: EXECUTABLE IMAGE
///
///   Image has the following dependencies:
///
///     KERNEL32.dll
///     VCRUNTIME140.dll
///
///   Summary
/// ```
///
/// Returns the reason as `Err` if the header or the blank line closing the
/// block is missing; a half-read block is never returned.
pub fn parse_dumpbin_output(output: &str) -> Result<Vec<LibraryReference>, &'static str> {
    let mut lines = output.lines();
    if !lines.any(|line| line.trim() == DUMPBIN_HEADER) {
        return Err("dependency header not found");
    }
    let mut libs = read_dumpbin_block(&mut lines)?;

    // Delay-loaded imports follow in their own block when present.
    if lines.any(|line| line.trim() == DUMPBIN_DELAY_HEADER) {
        libs.extend(read_dumpbin_block(&mut lines)?);
    }
    Ok(libs)
}

fn read_dumpbin_block<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
) -> Result<Vec<LibraryReference>, &'static str> {
    let mut libs = Vec::new();
    let mut started = false;

    for line in lines {
        let entry = line.trim();
        if entry.is_empty() {
            if started {
                return Ok(libs);
            }
            continue;
        }
        started = true;
        if !entry.contains(char::is_whitespace) && entry.contains('.') {
            libs.push(LibraryReference::unresolved(entry));
        }
    }

    Err("dependency list is not terminated by a blank line")
}
