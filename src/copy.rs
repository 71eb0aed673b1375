//! File and library copying utilities.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{BundleError, BundleResult};

/// A library copied into the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRecord {
    /// Real file the bytes came from, symlinks resolved.
    pub source: PathBuf,
    /// Where it now lives inside the bundle.
    pub destination: PathBuf,
}

/// Copy the file behind `source` (following every symlink) to `destination`.
///
/// The destination is a regular file named after `source` itself, not after
/// the symlink target, so `libfoo.so.1 -> libfoo.so.1.2.3` lands as
/// `libfoo.so.1`, which is the name the loader asks for. The copy is left
/// owner-writable so its search path can be rewritten afterwards.
pub fn copy_library(source: &Path, destination: &Path) -> BundleResult<CopyRecord> {
    let fail = |source_err| BundleError::CopyFailed {
        from: source.to_path_buf(),
        to: destination.to_path_buf(),
        source: source_err,
    };

    let real = fs::canonicalize(source).map_err(fail)?;
    let record = CopyRecord {
        source: real.clone(),
        destination: destination.to_path_buf(),
    };

    // Source already is the bundled file: nothing to copy.
    if is_same_file(&real, destination) {
        debug!("{} is already in place", destination.display());
        return Ok(record);
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(fail)?;
    }
    // A previous run may have left a read-only copy behind.
    if destination.is_symlink() || destination.exists() {
        fs::remove_file(destination).map_err(fail)?;
    }
    fs::copy(&real, destination).map_err(fail)?;
    make_owner_writable(destination).map_err(fail)?;

    Ok(record)
}

/// Copy a debug-info companion into `destination_dir` if it exists.
///
/// Returns where it was copied to. Failures are logged and otherwise ignored.
pub fn copy_debug_companion(companion: &Path, destination_dir: &Path) -> Option<PathBuf> {
    if !companion.is_file() {
        return None;
    }
    let destination = destination_dir.join(companion.file_name()?);
    if is_same_file(companion, &destination) {
        return Some(destination);
    }
    match fs::copy(companion, &destination) {
        Ok(_) => {
            debug!("copied debug info {}", companion.display());
            Some(destination)
        }
        Err(e) => {
            warn!("could not copy debug info {}: {}", companion.display(), e);
            None
        }
    }
}

/// Whether both paths exist and resolve to the same file.
fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(unix)]
fn make_owner_writable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o200);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
#[allow(clippy::permissions_set_readonly_false)]
fn make_owner_writable(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}

/// Make a file executable (chmod 755).
#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)
        .with_context(|| format!("Failed to read metadata: {}", path.display()))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
        .with_context(|| format!("Failed to set permissions: {}", path.display()))?;
    Ok(())
}

/// Executability is decided by extension on this host; nothing to do.
#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Copy a directory recursively, preserving symlinks on unix.
///
/// Returns the total size in bytes of all files copied.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<u64> {
    let mut total_size: u64 = 0;

    if !src.is_dir() {
        return Ok(0);
    }

    fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create directory: {}", dst.display()))?;

    for entry in
        fs::read_dir(src).with_context(|| format!("Failed to read directory: {}", src.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let dest_path = dst.join(entry.file_name());

        if path.is_symlink() {
            copy_symlink(&path, &dest_path)?;
        } else if path.is_dir() {
            total_size += copy_dir_recursive(&path, &dest_path)?;
        } else {
            total_size += fs::copy(&path, &dest_path).with_context(|| {
                format!("Failed to copy {} to {}", path.display(), dest_path.display())
            })?;
        }
    }

    Ok(total_size)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, dest: &Path) -> Result<()> {
    let target = fs::read_link(link)?;
    if !dest.exists() && !dest.is_symlink() {
        std::os::unix::fs::symlink(&target, dest).with_context(|| {
            format!("Failed to create symlink {} -> {}", dest.display(), target.display())
        })?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, dest: &Path) -> Result<()> {
    if link.is_dir() {
        copy_dir_recursive(link, dest)?;
    } else {
        fs::copy(link, dest)
            .with_context(|| format!("Failed to copy {} to {}", link.display(), dest.display()))?;
    }
    Ok(())
}
