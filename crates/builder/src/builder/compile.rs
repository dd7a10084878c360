//! CMake driver: configure, build and install one target.

use crate::builder::config::BuildConfig;
use crate::builder::error::BuildError;
use crate::builder::platform::Target;
use crate::builder::process::{self, CancelToken};
use crate::builder::recipe::Recipe;
use crate::builder::vendor;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

/// Installed tree of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub target: Target,
    /// Install prefix; libraries land in `<prefix>/lib`.
    pub prefix: PathBuf,
}

impl BuildOutput {
    pub fn lib_dir(&self) -> PathBuf {
        self.prefix.join("lib")
    }
}

/// Build `recipe` for `target` and install it into the target's thin dir.
pub fn build(
    recipe: &Recipe,
    target: Target,
    config: &BuildConfig,
    cancel: &CancelToken,
) -> Result<BuildOutput, BuildError> {
    let src = absolute(&vendor::require(recipe, config)?)?;
    let scratch = ensure_dir(&config.scratch_dir(recipe, target))?;
    let prefix = ensure_dir(&config.thin_dir(recipe, target))?;

    info!(recipe = recipe.name, %target, prefix = %prefix.display(), "configuring");

    let mut configure = Command::new(&config.tools.cmake);
    configure
        .arg("-S")
        .arg(&src)
        .arg("-B")
        .arg(&scratch)
        .args(["-G", config.tools.generator.as_str()])
        .arg(format!("-DCMAKE_INSTALL_PREFIX={}", prefix.display()))
        .args(recipe.arguments(target, config));
    process::run(&mut configure, cancel)?;

    let mut compile = Command::new(&config.tools.cmake);
    compile
        .arg("--build")
        .arg(&scratch)
        .args(["--config", config.build_type.as_str()])
        .args(["--parallel", &config.jobs().to_string()]);
    process::run(&mut compile, cancel)?;

    let mut install = Command::new(&config.tools.cmake);
    install
        .arg("--install")
        .arg(&scratch)
        .args(["--config", config.build_type.as_str()]);
    process::run(&mut install, cancel)?;

    println!("  Built: {target} -> {}", prefix.display());
    Ok(BuildOutput { target, prefix })
}

fn ensure_dir(path: &Path) -> Result<PathBuf, BuildError> {
    std::fs::create_dir_all(path).map_err(|e| BuildError::fs(path, e))?;
    absolute(path)
}

// CMake resolves a relative install prefix against the build dir, not the cwd.
fn absolute(path: &Path) -> Result<PathBuf, BuildError> {
    std::fs::canonicalize(path).map_err(|e| BuildError::fs(path, e))
}
