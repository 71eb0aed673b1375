//! Bundle an executable with the shared libraries it needs.
//!
//! Dependencies are listed with `ldd` (ELF) or `dumpbin` (PE), filtered against
//! the products directory and an allow-list, copied next to each other, and
//! their search paths rewritten (`patchelf --set-rpath '$ORIGIN'`) so the bundle
//! runs without the build environment.

mod analyze;
mod bundle;
mod config;
mod copy;
mod error;
mod layout;
mod paths;
mod platform;
mod policy;
mod relocate;

pub use analyze::{
    list_elf_dependencies, list_pe_dependencies, parse_dumpbin_output, parse_ldd_output,
    LibraryReference, SearchContext,
};
pub use bundle::{bundle, bundle_with, BundleReport};
pub use config::{BundleConfig, LibraryConfig};
pub use copy::{copy_debug_companion, copy_dir_recursive, copy_library, make_executable, CopyRecord};
pub use error::{BundleError, BundleResult, ToolError};
pub use layout::BundleLayout;
pub use paths::{dirs_from_env, find_library, relative_path};
pub use platform::{origin_rpath, Linux, Platform, SearchPath, TargetPlatform, ToolPaths, Windows};
pub use policy::{BundlingPolicy, ResolutionOutcome};
pub use relocate::{Relocator, VisitedSet};
