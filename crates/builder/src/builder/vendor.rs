//! Vendor source management (fetch, cache, clean).

#![allow(clippy::cast_precision_loss)] // File sizes don't need u64 precision for display

use crate::builder::config::BuildConfig;
use crate::builder::error::BuildError;
use crate::builder::pipeline::BuildReport;
use crate::builder::platform::Target;
use crate::builder::process::{self, CancelToken};
use crate::builder::recipe::{self, Recipe};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;
use walkdir::WalkDir;

/// Get the path to a recipe's source, failing if not cached.
pub fn require(recipe: &Recipe, config: &BuildConfig) -> Result<PathBuf, BuildError> {
    let path = config.source_dir(recipe);
    if !path.join("CMakeLists.txt").exists() {
        return Err(BuildError::SourceMissing {
            name: recipe.name.to_string(),
            path,
        });
    }
    Ok(path)
}

/// Clone a recipe's source at its version tag. A cached checkout is reused.
pub fn fetch(recipe: &Recipe, config: &BuildConfig, cancel: &CancelToken) -> Result<()> {
    let dest = config.source_dir(recipe);

    if dest.exists() {
        println!("{} already cached at {}", recipe.name, dest.display());
        return Ok(());
    }

    std::fs::create_dir_all(&config.vendor_dir)
        .map_err(|e| BuildError::fs(&config.vendor_dir, e))?;

    println!(
        "Fetching {} from {} @ {}...",
        recipe.name, recipe.url, recipe.version
    );

    let mut cmd = Command::new(&config.tools.git);
    cmd.args(["clone", "--depth", "1", "--branch", recipe.version, recipe.url])
        .arg(&dest);
    process::run(&mut cmd, cancel)
        .with_context(|| format!("git clone failed for {}", recipe.name))?;

    let size = dir_size(&dest);
    info!(recipe = recipe.name, bytes = size, "source cached");
    println!(
        "  Cached: {} ({:.1} MB)",
        dest.display(),
        size as f64 / 1_000_000.0
    );

    Ok(())
}

/// Show source cache and per-target artifact status.
pub fn status(recipe: &Recipe, config: &BuildConfig, targets: &[Target]) -> Result<()> {
    println!("Cache Status:\n");

    let src = config.source_dir(recipe);
    if src.exists() {
        println!(
            "  {:16} [cached] {:.1} MB",
            recipe.name,
            dir_size(&src) as f64 / 1_000_000.0
        );
    } else {
        println!("  {:16} [missing] {} @ {}", recipe.name, recipe.url, recipe.version);
    }

    println!("\nArtifacts:\n");
    let mut built = 0;
    for &target in targets {
        let merged = config
            .thin_dir(recipe, target)
            .join("lib")
            .join(recipe.merged_file_name());
        match std::fs::metadata(&merged) {
            Ok(meta) if meta.len() > 0 => {
                built += 1;
                println!(
                    "  {:20} [built]   {:.1} MB",
                    target.to_string(),
                    meta.len() as f64 / 1_000_000.0
                );
            }
            _ => println!("  {:20} [missing] {}", target.to_string(), merged.display()),
        }
    }

    println!();
    println!("  Total: {}/{} targets built", built, targets.len());

    let report_path = config.report_path(recipe);
    if report_path.exists() {
        let report = BuildReport::load(&report_path)?;
        println!(
            "  Last run: {} ({} target(s), {} failed)",
            report.finished_at,
            report.targets.len(),
            report.failed().count()
        );
        for failed in report.failed() {
            let reason = failed.error.as_deref().unwrap_or_default();
            println!("    {}: {}", failed.target, reason.lines().next().unwrap_or_default());
        }
    }

    Ok(())
}

/// Remove cached sources and/or build trees.
///
/// With a recipe name only that recipe's checkout and build tree go;
/// without one the whole vendor and work directories are removed.
pub fn clean(name: Option<&str>, config: &BuildConfig, sources: bool) -> Result<()> {
    if let Some(name) = name {
        let recipe = recipe::require(name)?;
        let mut dirs = vec![config.work_dir.join(recipe.name)];
        if sources {
            dirs.push(config.source_dir(recipe));
        }
        for dir in dirs {
            remove_if_present(&dir)?;
        }
    } else {
        remove_if_present(&config.work_dir)?;
        if sources {
            remove_if_present(&config.vendor_dir)?;
        }
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(|e| BuildError::fs(path, e))?;
        println!("Cleaned: {}", path.display());
    } else {
        println!("{} not present", path.display());
    }
    Ok(())
}

/// Get directory size in bytes.
fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter_map(|entry| entry.metadata().ok())
        .filter(std::fs::Metadata::is_file)
        .map(|meta| meta.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::platform::{Arch, Platform};
    use crate::builder::recipe::LIBFOO;
    use tempfile::TempDir;

    fn config_in(root: &Path) -> BuildConfig {
        BuildConfig {
            work_dir: root.join("build"),
            vendor_dir: root.join("vendor"),
            ..BuildConfig::default()
        }
    }

    #[test]
    fn test_require_missing_source() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(tmp.path());
        let err = require(&LIBFOO, &config).unwrap_err();
        assert!(matches!(err, BuildError::SourceMissing { .. }));
    }

    #[test]
    fn test_require_cached_source() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(tmp.path());
        let src = config.source_dir(&LIBFOO);
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("CMakeLists.txt"), "project(foo)\n").unwrap();
        assert_eq!(require(&LIBFOO, &config).unwrap(), src);
    }

    #[test]
    fn test_fetch_reuses_cached_checkout() {
        let tmp = TempDir::new().unwrap();
        let mut config = config_in(tmp.path());
        // A git that always fails proves the cache short-circuits.
        config.tools.git = "false".to_string();
        std::fs::create_dir_all(config.source_dir(&LIBFOO)).unwrap();
        fetch(&LIBFOO, &config, &CancelToken::new()).unwrap();
    }

    #[test]
    fn test_fetch_failure_reports_recipe() {
        let tmp = TempDir::new().unwrap();
        let mut config = config_in(tmp.path());
        config.tools.git = "false".to_string();
        let err = fetch(&LIBFOO, &config, &CancelToken::new()).unwrap_err();
        assert!(err.to_string().contains("git clone failed for libfoo"));
    }

    #[test]
    fn test_dir_size_counts_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("a/b")).unwrap();
        std::fs::write(tmp.path().join("a/one"), [0u8; 10]).unwrap();
        std::fs::write(tmp.path().join("a/b/two"), [0u8; 5]).unwrap();
        assert_eq!(dir_size(tmp.path()), 15);
    }

    #[test]
    fn test_clean_recipe_keeps_sources_unless_asked() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(tmp.path());
        let recipe = recipe::get("libspirv-cross").unwrap();
        let thin = config.thin_dir(recipe, Target::new(Platform::Ios, Arch::Arm64));
        std::fs::create_dir_all(&thin).unwrap();
        std::fs::create_dir_all(config.source_dir(recipe)).unwrap();

        clean(Some(recipe.name), &config, false).unwrap();
        assert!(!config.work_dir.join(recipe.name).exists());
        assert!(config.source_dir(recipe).exists());

        clean(None, &config, true).unwrap();
        assert!(!config.vendor_dir.exists());
    }
}
