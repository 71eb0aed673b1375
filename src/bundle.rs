//! Build a complete bundle from a [`BundleConfig`].

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::BundleConfig;
use crate::copy::{copy_dir_recursive, make_executable, CopyRecord};
use crate::layout::BundleLayout;
use crate::platform::{Platform, TargetPlatform};
use crate::policy::BundlingPolicy;
use crate::relocate::Relocator;

/// What a finished bundling run produced.
#[derive(Debug, Clone)]
pub struct BundleReport {
    pub layout: BundleLayout,
    pub executables: Vec<PathBuf>,
    pub libraries: Vec<CopyRecord>,
    pub resource_bytes: u64,
}

/// Lay out the bundle, copy executables and resources, then bundle and
/// relocate every executable's libraries.
///
/// Executables share one library directory, so they are relocated one after
/// another, each with a fresh visited set.
pub fn bundle(config: &BundleConfig) -> Result<BundleReport> {
    let target = config.target();
    let platform = target.build(&config.tools);
    bundle_with(config, target, platform.as_ref())
}

/// Same as [`bundle`], with the platform supplied by the caller.
pub fn bundle_with(
    config: &BundleConfig,
    target: TargetPlatform,
    platform: &dyn Platform,
) -> Result<BundleReport> {
    let layout = BundleLayout::new(
        target,
        &config.output_dir,
        &config.app_name,
        &config.identifier,
    );
    info!("bundling {} into {}", config.app_name, layout.root.display());

    for dir in [&layout.executable_dir, &layout.library_dir, &layout.resources_dir] {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    // The first executable listed is the main one.
    let mut executables = Vec::new();
    for (index, name) in config.executables.iter().enumerate() {
        let source = find_product(&config.products_dir, name, target)?;
        let dest = if index == 0 {
            layout.executable.clone()
        } else {
            layout.helper_executable(target, name)
        };
        fs::copy(&source, &dest).with_context(|| {
            format!("Failed to copy {} to {}", source.display(), dest.display())
        })?;
        make_executable(&dest)?;
        executables.push(dest);
    }

    let mut resource_bytes = 0;
    for resource in &config.resources {
        let name = resource
            .file_name()
            .with_context(|| format!("Resource path has no name: {}", resource.display()))?;
        if !resource.is_dir() {
            bail!("Resource directory does not exist: {}", resource.display());
        }
        resource_bytes += copy_dir_recursive(resource, &layout.resources_dir.join(name))?;
    }

    let allowed: &[&str] = if config.libraries.replace_default_allow_list {
        &[]
    } else {
        platform.default_allow_list()
    };
    let mut search_dirs = config.libraries.search_paths.clone();
    search_dirs.extend(platform.host_search_dirs());
    let policy = BundlingPolicy::new(
        platform,
        &config.products_dir,
        allowed
            .iter()
            .copied()
            .chain(config.libraries.allow.iter().map(String::as_str)),
        search_dirs,
    )?;

    let relocator = Relocator::new(platform, &policy);
    let mut libraries = Vec::new();
    for executable in &executables {
        let copied = relocator
            .relocate(executable, &layout.library_dir)
            .with_context(|| format!("Failed to bundle libraries of {}", executable.display()))?;
        info!("{}: {} libraries bundled", executable.display(), copied.len());
        libraries.extend(copied);
    }

    Ok(BundleReport {
        layout,
        executables,
        libraries,
        resource_bytes,
    })
}

/// Locate a built executable, allowing the `.exe` suffix to be left off on Windows.
fn find_product(products_dir: &Path, name: &str, target: TargetPlatform) -> Result<PathBuf> {
    let plain = products_dir.join(name);
    if plain.is_file() {
        return Ok(plain);
    }
    if target == TargetPlatform::Windows {
        let exe = products_dir.join(format!("{name}.exe"));
        if exe.is_file() {
            return Ok(exe);
        }
    }
    bail!(
        "Executable '{}' not found in products directory {}",
        name,
        products_dir.display()
    )
}
