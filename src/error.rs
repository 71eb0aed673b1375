//! Error types for dependency resolution and relocation.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Result alias used throughout the relocation engine.
pub type BundleResult<T> = Result<T, BundleError>;

/// Why an external tool (`ldd`, `patchelf`, `dumpbin`) did not do its job.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The input binary is not there, so the tool was never started.
    #[error("file does not exist: {}", .0.display())]
    MissingInput(PathBuf),

    /// The tool could not be spawned (usually: not installed).
    #[error("could not start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// The tool ran and reported failure.
    #[error("{tool} exited with {status}: {stderr}")]
    Exit {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },

    /// The binary format has no way to express the requested search path.
    #[error("{0}")]
    Unsupported(String),
}

/// Terminal failure of a bundling run.
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("failed to list dependencies of {} with {tool}: {source}", binary.display())]
    EnumerationFailed {
        tool: String,
        binary: PathBuf,
        #[source]
        source: ToolError,
    },

    #[error("unexpected {tool} output for {}: {reason}", binary.display())]
    MalformedToolOutput {
        tool: String,
        binary: PathBuf,
        reason: String,
        output: String,
    },

    #[error(
        "library '{name}' (needed by {}) is allowed for bundling \
         but was not found in {} search directories",
        needed_by.display(),
        searched.len()
    )]
    UnresolvableLibrary {
        name: String,
        needed_by: PathBuf,
        searched: Vec<PathBuf>,
    },

    #[error("failed to copy {} to {}: {source}", from.display(), to.display())]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to rewrite search path of {}: {source}", binary.display())]
    MetadataRewriteFailed {
        binary: PathBuf,
        #[source]
        source: ToolError,
    },

    #[error("products directory {} is not usable: {source}", path.display())]
    InvalidProductsDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration in {}: {message}", file.display())]
    Config { file: PathBuf, message: String },
}

impl BundleError {
    /// Attach the offending binary to a parser failure.
    pub(crate) fn malformed(tool: &str, binary: PathBuf, reason: &str, output: &str) -> Self {
        BundleError::MalformedToolOutput {
            tool: tool.to_string(),
            binary,
            reason: reason.to_string(),
            output: output.to_string(),
        }
    }
}
