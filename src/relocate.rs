//! Copy a binary's dependency closure next to it and rewrite search paths.
//!
//! The traversal is an explicit FIFO worklist rather than recursion, so deep
//! dependency chains cannot exhaust the stack. Termination on cycles and
//! diamonds comes from the visited set, keyed by destination path: a library
//! is marked visited as soon as it is copied, before its own dependencies are
//! looked at.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use tracing::{debug, info, trace};

use crate::analyze::SearchContext;
use crate::copy::{copy_debug_companion, copy_library, CopyRecord};
use crate::error::{BundleError, BundleResult};
use crate::paths::relative_path;
use crate::platform::{Platform, SearchPath};
use crate::policy::{BundlingPolicy, ResolutionOutcome};

/// Destinations already copied and relocated during one run.
///
/// On platforms whose loader ignores case the file name part is lowercased.
pub type VisitedSet = HashSet<PathBuf>;

/// Everything one relocation run needs, passed explicitly.
///
/// Holds no mutable state, so one `Relocator` can serve several runs on
/// different threads as long as each has its own [`VisitedSet`].
pub struct Relocator<'a> {
    platform: &'a dyn Platform,
    policy: &'a BundlingPolicy,
}

impl<'a> Relocator<'a> {
    pub fn new(platform: &'a dyn Platform, policy: &'a BundlingPolicy) -> Self {
        Self { platform, policy }
    }

    /// Relocate `binary` into `destination_dir` with a fresh visited set.
    pub fn relocate(&self, binary: &Path, destination_dir: &Path) -> BundleResult<Vec<CopyRecord>> {
        let mut visited = VisitedSet::new();
        self.resolve_and_copy(binary, destination_dir, &mut visited)
    }

    /// Copy every bundle-worthy library `binary` needs, directly or
    /// transitively, into `destination_dir`.
    ///
    /// Each copied library gets a search path of its own directory; `binary`
    /// gets a search path pointing at `destination_dir`. Libraries whose
    /// destination is already in `visited` are neither copied nor looked into
    /// again, which makes a second call with the same set a no-op.
    ///
    /// # Errors
    ///
    /// The first enumeration, resolution, copy or rewrite failure aborts the
    /// run. Files written before the failure stay on disk.
    pub fn resolve_and_copy(
        &self,
        binary: &Path,
        destination_dir: &Path,
        visited: &mut VisitedSet,
    ) -> BundleResult<Vec<CopyRecord>> {
        let context = SearchContext::new(self.policy.products_dir());
        let mut copied = Vec::new();
        let mut pending = VecDeque::from([binary.to_path_buf()]);

        while let Some(current) = pending.pop_front() {
            for source in self.bundled_dependencies(&current, &context)? {
                let Some(file_name) = source.file_name() else {
                    continue;
                };
                let destination = destination_dir.join(file_name);
                let key = self.visit_key(&destination);
                if visited.contains(&key) {
                    trace!("{} already handled", destination.display());
                    continue;
                }

                let record = copy_library(&source, &destination)?;
                info!("bundled {} (needed by {})", record.source.display(), current.display());
                if let Some(companion) = self.platform.debug_companion(&record.source) {
                    copy_debug_companion(&companion, destination_dir);
                }

                visited.insert(key);
                self.platform
                    .set_search_path(&destination, SearchPath::OwnDirectory)?;

                pending.push_back(destination);
                copied.push(record);
            }
        }

        let binary_dir = binary.parent().unwrap_or_else(|| Path::new(""));
        let relative = relative_path(binary_dir, destination_dir);
        self.platform
            .set_search_path(binary, SearchPath::Relative(&relative))?;

        Ok(copied)
    }

    /// File name of `path` as the loader compares it; the directory part is
    /// left alone.
    fn visit_key(&self, path: &Path) -> PathBuf {
        match path.file_name() {
            Some(name) if self.platform.names_ignore_case() => {
                path.with_file_name(name.to_string_lossy().to_ascii_lowercase())
            }
            _ => path.to_path_buf(),
        }
    }

    /// Resolve the dependencies of one binary to source paths to copy.
    ///
    /// Skipped references are dropped; duplicates (two references landing on
    /// the same file name, under the platform's case rule) are collapsed,
    /// keeping enumerator order.
    fn bundled_dependencies(
        &self,
        binary: &Path,
        context: &SearchContext,
    ) -> BundleResult<Vec<PathBuf>> {
        let references = self.platform.enumerate(binary, context)?;
        debug!(
            "{} lists {} dependencies on {}",
            binary.display(),
            references.len(),
            self.platform.name()
        );

        let mut seen = HashSet::new();
        let mut sources = Vec::new();
        for reference in &references {
            match self.policy.resolve(reference) {
                ResolutionOutcome::Found(path) => {
                    if let Some(name) = path.file_name() {
                        if seen.insert(self.visit_key(Path::new(name))) {
                            sources.push(path);
                        }
                    }
                }
                ResolutionOutcome::Skipped => {}
                ResolutionOutcome::Unresolvable(name) => {
                    return Err(BundleError::UnresolvableLibrary {
                        name,
                        needed_by: binary.to_path_buf(),
                        searched: self.policy.search_dirs().to_vec(),
                    });
                }
            }
        }
        Ok(sources)
    }
}
