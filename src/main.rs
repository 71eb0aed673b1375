//! dylib-bundler CLI
//!
//! Usage: dylib-bundler <COMMAND>
//!
//! Commands:
//!   bundle  Build a self-contained bundle from bundle.toml
//!   deps    Show how each dependency of a binary would be handled

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use dylib_bundler::{
    BundleConfig, BundlingPolicy, ResolutionOutcome, SearchContext, TargetPlatform, ToolPaths,
};

/// Bundle an executable with its shared libraries
#[derive(Parser, Debug)]
#[command(name = "dylib-bundler")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a self-contained bundle
    Bundle {
        /// Path to the bundle configuration
        #[arg(short, long, default_value = "bundle.toml")]
        config: PathBuf,
    },

    /// List a binary's dependencies and what bundling would do with each
    Deps {
        /// Binary to inspect
        binary: PathBuf,

        /// Directory holding the build's products
        #[arg(long, default_value = ".")]
        products_dir: PathBuf,

        /// Binary format (defaults to the host's)
        #[arg(long, value_enum)]
        platform: Option<TargetPlatform>,

        /// Additional library names allowed into the bundle
        #[arg(long)]
        allow: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Bundle { config } => cmd_bundle(&config),
        Commands::Deps {
            binary,
            products_dir,
            platform,
            allow,
        } => cmd_deps(&binary, &products_dir, platform, &allow),
    }
}

fn cmd_bundle(config_path: &Path) -> Result<()> {
    let config = BundleConfig::load(config_path)?;
    let report = dylib_bundler::bundle(&config)
        .with_context(|| format!("Bundling {} failed", config.app_name))?;

    println!("Bundle: {}", report.layout.root.display());
    for executable in &report.executables {
        println!("  exe  {}", executable.display());
    }
    for library in &report.libraries {
        println!(
            "  lib  {} <- {}",
            library.destination.display(),
            library.source.display()
        );
    }
    if report.resource_bytes > 0 {
        println!("  {} bytes of resources", report.resource_bytes);
    }
    Ok(())
}

fn cmd_deps(
    binary: &Path,
    products_dir: &Path,
    target: Option<TargetPlatform>,
    allow: &[String],
) -> Result<()> {
    let platform = target
        .unwrap_or_else(TargetPlatform::host)
        .build(&ToolPaths::default());
    let policy = BundlingPolicy::for_platform(platform.as_ref(), products_dir, allow, &[])?;
    let context = SearchContext::new(policy.products_dir());

    for reference in platform.enumerate(binary, &context)? {
        let outcome = match policy.resolve(&reference) {
            ResolutionOutcome::Found(path) => format!("bundle {}", path.display()),
            ResolutionOutcome::Skipped => "system".to_string(),
            ResolutionOutcome::Unresolvable(_) => "MISSING".to_string(),
        };
        println!("{:<40} {}", reference.name, outcome);
    }
    Ok(())
}
