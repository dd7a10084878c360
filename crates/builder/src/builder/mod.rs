//! Build system for static SPIRV-Cross slices.
//!
//! Structure:
//! - `recipe` - What to build (source, tag, CMake arguments, naming)
//! - `platform` - Platform/architecture matrix
//! - `vendor` - Source fetching
//! - `compile` - CMake configure/build/install per target
//! - `merge` - Static archive merging
//! - `descriptor` - pkg-config file generation
//! - `manifest` - Package manifest entries and checksums
//! - `pipeline` - Sequencing of the above per target

pub mod compile;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod manifest;
pub mod merge;
pub mod pipeline;
pub mod platform;
pub mod process;
pub mod recipe;
pub mod util;
pub mod vendor;

#[cfg(test)]
mod testutil;

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use config::BuildConfig;
use manifest::Checksum;
use pipeline::{FailurePolicy, Pipeline};
use platform::{Arch, Platform, Target};
use process::CancelToken;
use recipe::Recipe;
use std::path::PathBuf;

/// Build commands for the CLI.
#[derive(Subcommand)]
pub enum BuildCommands {
    /// Build everything (fetch + every target + manifest entry)
    All,
    /// Fetch the recipe's source at its version tag
    Fetch,
    /// Build, merge and describe every selected target
    Build,
    /// Insert or refresh the package manifest entry
    Manifest {
        /// Compute the checksum from this archive instead of linking the published checksum file
        #[arg(long, conflicts_with = "sha256")]
        checksum_file: Option<PathBuf>,
        /// Use this SHA-256 digest as the checksum
        #[arg(long)]
        sha256: Option<String>,
    },
    /// Write `<name>.checksum.txt` (SHA-256) next to an archive
    Checksum {
        /// Archive to hash
        file: PathBuf,
    },
    /// Show source cache and artifact status
    Status,
    /// Remove build output (and optionally cached sources)
    Clean {
        /// Recipe name (omit for all)
        name: Option<String>,
        /// Also remove cached sources
        #[arg(long)]
        sources: bool,
    },
}

/// Options shared by every command.
#[derive(Args, Debug)]
pub struct BuildOptions {
    /// Recipe to build
    #[arg(long, global = true, default_value = "libspirv-cross")]
    pub recipe: String,

    /// Platforms to build (comma separated; default: all)
    #[arg(long, global = true, value_enum, value_delimiter = ',')]
    pub platforms: Vec<Platform>,

    /// Architectures to build (comma separated; default: all)
    #[arg(long, global = true, value_enum, value_delimiter = ',')]
    pub archs: Vec<Arch>,

    /// Release version substituted into download URLs
    #[arg(long, global = true)]
    pub release_version: Option<String>,

    /// Configuration file
    #[arg(long, global = true, default_value = config::CONFIG_FILE)]
    pub config: PathBuf,

    /// Keep building remaining targets after one fails (still exits non-zero)
    #[arg(long, global = true)]
    pub keep_going: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Everything a command needs, resolved from options and configuration.
pub struct Context {
    pub recipe: &'static Recipe,
    pub config: BuildConfig,
    pub targets: Vec<Target>,
    pub release: String,
    pub policy: FailurePolicy,
    pub cancel: CancelToken,
}

impl BuildOptions {
    pub fn resolve(&self, cancel: CancelToken) -> Result<Context> {
        let recipe = recipe::require(&self.recipe)?;
        let config = BuildConfig::load_from(&self.config)?;
        let targets = platform::enumerate(&self.platforms, &self.archs)?;
        let release = self
            .release_version
            .clone()
            .unwrap_or_else(|| recipe.package.default_release.to_string());
        let policy = if self.keep_going {
            FailurePolicy::Continue
        } else {
            FailurePolicy::Abort
        };

        Ok(Context {
            recipe,
            config,
            targets,
            release,
            policy,
            cancel,
        })
    }
}

impl Context {
    fn pipeline(&self) -> Pipeline<'_> {
        Pipeline::new(self.recipe, &self.config, self.cancel.clone()).with_policy(self.policy)
    }
}

/// Dispatch a command.
pub fn run(command: BuildCommands, ctx: &Context) -> Result<()> {
    match command {
        BuildCommands::All => build_all(ctx),
        BuildCommands::Fetch => vendor::fetch(ctx.recipe, &ctx.config, &ctx.cancel),
        BuildCommands::Build => build_targets(ctx),
        BuildCommands::Manifest {
            checksum_file,
            sha256,
        } => {
            let checksum = match (checksum_file, sha256) {
                (Some(file), _) => Some(Checksum::Sha256(manifest::sha256_file(&file)?)),
                (None, Some(digest)) => {
                    let Some(checksum) = Checksum::sha256(&digest) else {
                        bail!("--sha256 must be 64 lowercase hex characters, got {digest:?}");
                    };
                    Some(checksum)
                }
                (None, None) => None,
            };
            ctx.pipeline().emit_manifest(&ctx.release, checksum)?;
            Ok(())
        }
        BuildCommands::Checksum { file } => {
            let (path, digest) = manifest::write_checksum_file(&file)?;
            println!("{digest}  {}", file.display());
            println!("  Wrote: {}", path.display());
            Ok(())
        }
        BuildCommands::Status => vendor::status(ctx.recipe, &ctx.config, &ctx.targets),
        BuildCommands::Clean { name, sources } => {
            vendor::clean(name.as_deref(), &ctx.config, sources)
        }
    }
}

/// Build every selected target.
pub fn build_targets(ctx: &Context) -> Result<()> {
    let report = ctx.pipeline().run(&ctx.targets)?;
    println!(
        "\n=== Built {} target(s) for {} {} ===",
        report.targets.len(),
        ctx.recipe.name,
        ctx.recipe.version
    );
    Ok(())
}

/// Build everything: fetch sources, build every target, update the manifest.
pub fn build_all(ctx: &Context) -> Result<()> {
    println!("=== Building {} {} ===\n", ctx.recipe.name, ctx.recipe.version);

    pipeline::ensure_manifest(&ctx.config)?;
    vendor::fetch(ctx.recipe, &ctx.config, &ctx.cancel)?;
    build_targets(ctx)?;
    ctx.pipeline().emit_manifest(&ctx.release, None)?;

    println!("\n=== Build complete ===");
    Ok(())
}
