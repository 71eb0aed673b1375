//! Integration tests for dylib-bundler using real system binaries.

use dylib_bundler::{list_elf_dependencies, BundleError, SearchContext, ToolError};
use std::path::Path;

fn context() -> SearchContext {
    SearchContext::new(std::env::temp_dir())
}

#[cfg(target_os = "linux")]
#[test]
fn test_get_deps_of_real_binary() {
    // /bin/sh exists on all Linux systems and is dynamically linked
    let deps = list_elf_dependencies(Path::new("ldd"), Path::new("/bin/sh"), &context()).unwrap();
    // Should have at least libc dependency
    assert!(
        deps.iter().any(|d| d.name.contains("libc")),
        "Expected libc dependency in /bin/sh, got: {:?}",
        deps
    );
}

#[test]
fn test_nonexistent_binary() {
    let result = list_elf_dependencies(
        Path::new("ldd"),
        Path::new("/nonexistent/path/to/binary"),
        &context(),
    );
    let err = result.expect_err("Expected error for nonexistent file");
    assert!(
        matches!(
            err,
            BundleError::EnumerationFailed {
                source: ToolError::MissingInput(_),
                ..
            }
        ),
        "Expected missing-input enumeration failure, got: {}",
        err
    );
    assert!(err.to_string().contains("/nonexistent/path/to/binary"));
}

#[cfg(unix)]
#[test]
fn test_missing_tool_is_enumeration_failure() {
    let result = list_elf_dependencies(
        Path::new("/nonexistent/ldd"),
        Path::new("/etc/passwd"),
        &context(),
    );
    assert!(matches!(
        result,
        Err(BundleError::EnumerationFailed {
            source: ToolError::Spawn { .. },
            ..
        })
    ));
}

#[cfg(target_os = "linux")]
#[test]
fn test_non_elf_file() {
    // /etc/passwd is a text file, not an ELF binary
    let deps =
        list_elf_dependencies(Path::new("ldd"), Path::new("/etc/passwd"), &context()).unwrap();
    assert!(
        deps.is_empty(),
        "Expected empty deps for non-ELF file, got: {:?}",
        deps
    );
}
