//! Decide which dependencies get bundled.
//!
//! Order of precedence: the products directory, then the allow-list, then the
//! search directories. Anything not built here and not on the allow-list is
//! left for the target system to provide.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::analyze::LibraryReference;
use crate::error::{BundleError, BundleResult};
use crate::paths::find_library;
use crate::platform::Platform;

/// Result of running one reference through the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// Bundle the file at this path.
    Found(PathBuf),
    /// Leave it to the host system.
    Skipped,
    /// Allow-listed, yet nowhere to be found.
    Unresolvable(String),
}

fn normalize(name: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        name.to_ascii_lowercase()
    } else {
        name.to_string()
    }
}

/// Allow-list plus the directories libraries are looked up in.
#[derive(Debug, Clone)]
pub struct BundlingPolicy {
    products_dir: PathBuf,
    allow_list: HashSet<String>,
    search_dirs: Vec<PathBuf>,
    case_insensitive: bool,
}

impl BundlingPolicy {
    /// Build a policy for `products_dir`, which is canonicalized here.
    ///
    /// On platforms whose loader ignores case, `allow_list` entries and
    /// reference names are both lowercased before comparison.
    pub fn new<I, S>(
        platform: &dyn Platform,
        products_dir: &Path,
        allow_list: I,
        search_dirs: Vec<PathBuf>,
    ) -> BundleResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let products_dir =
            fs::canonicalize(products_dir).map_err(|source| BundleError::InvalidProductsDir {
                path: products_dir.to_path_buf(),
                source,
            })?;
        let case_insensitive = platform.names_ignore_case();
        let allow_list = allow_list
            .into_iter()
            .map(|name| normalize(name.as_ref(), case_insensitive))
            .collect();
        Ok(Self {
            products_dir,
            allow_list,
            search_dirs,
            case_insensitive,
        })
    }

    /// Policy using the platform's default allow-list and host search directories,
    /// with `extra_dirs` searched first.
    pub fn for_platform(
        platform: &dyn Platform,
        products_dir: &Path,
        extra_allowed: &[String],
        extra_dirs: &[PathBuf],
    ) -> BundleResult<Self> {
        let mut search_dirs = extra_dirs.to_vec();
        search_dirs.extend(platform.host_search_dirs());
        let allowed = platform
            .default_allow_list()
            .iter()
            .copied()
            .chain(extra_allowed.iter().map(String::as_str));
        Self::new(platform, products_dir, allowed, search_dirs)
    }

    pub fn products_dir(&self) -> &Path {
        &self.products_dir
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    pub fn is_allowed(&self, base_name: &str) -> bool {
        self.allow_list
            .contains(&normalize(base_name, self.case_insensitive))
    }

    /// Decide what to do with one reference.
    pub fn resolve(&self, reference: &LibraryReference) -> ResolutionOutcome {
        let base = reference.base_name();

        let built = self.products_dir.join(base);
        if built.is_file() {
            debug!("{} is a build product: {}", base, built.display());
            return ResolutionOutcome::Found(built);
        }

        if !self.is_allowed(base) {
            debug!("{} is left to the host system", base);
            return ResolutionOutcome::Skipped;
        }

        if let Some(found) = find_library(&self.search_dirs, base) {
            debug!("{} found in search path: {}", base, found.display());
            return ResolutionOutcome::Found(found);
        }

        // Fall back to where the loader itself found it.
        match &reference.resolved {
            Some(path) if path.is_file() => ResolutionOutcome::Found(path.clone()),
            _ => ResolutionOutcome::Unresolvable(reference.name.clone()),
        }
    }
}
