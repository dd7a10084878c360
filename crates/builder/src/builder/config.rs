//! Build configuration.
//!
//! Reads `build.toml` from the working directory when present. Every key is
//! optional; a missing file means all defaults. CLI flags are applied on
//! top by the caller.

use crate::builder::platform::{DeploymentTargets, Target};
use crate::builder::process::CommandTemplate;
use crate::builder::recipe::Recipe;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "build.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Root for per-recipe build trees.
    pub work_dir: PathBuf,
    /// Where sources are cloned.
    pub vendor_dir: PathBuf,
    /// Package manifest carrying the generated entries.
    pub manifest: PathBuf,
    /// `CMAKE_BUILD_TYPE`.
    pub build_type: String,
    /// Parallel compile jobs (defaults to the CPU count).
    pub jobs: Option<usize>,
    pub tools: ToolConfig,
    pub deployment: DeploymentTargets,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub git: String,
    pub cmake: String,
    pub generator: String,
    /// Static archive merge command. Placeholders: `{output}`, `{inputs}`.
    pub archive: CommandTemplate,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("build"),
            vendor_dir: PathBuf::from("vendor"),
            manifest: PathBuf::from("Package.swift"),
            build_type: "Release".to_string(),
            jobs: None,
            tools: ToolConfig::default(),
            deployment: DeploymentTargets::default(),
        }
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
            cmake: "cmake".to_string(),
            generator: "Ninja".to_string(),
            archive: CommandTemplate::new(["libtool", "-static", "-o", "{output}", "{inputs}"]),
        }
    }
}

impl BuildConfig {
    /// Load from `path`, or defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: BuildConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if config.tools.archive.program().is_none() {
            bail!("{}: tools.archive must name a program", path.display());
        }
        Ok(config)
    }

    /// Parallelism passed to `cmake --build`.
    pub fn jobs(&self) -> usize {
        self.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(1)
        })
    }

    /// Cloned source tree for a recipe.
    pub fn source_dir(&self, recipe: &Recipe) -> PathBuf {
        self.vendor_dir.join(recipe.name)
    }

    /// Install prefix of one target: `<work>/<recipe>/<platform>/thin/<arch>`.
    pub fn thin_dir(&self, recipe: &Recipe, target: Target) -> PathBuf {
        self.work_dir
            .join(recipe.name)
            .join(target.platform.id())
            .join("thin")
            .join(target.arch.id())
    }

    /// CMake binary directory of one target.
    pub fn scratch_dir(&self, recipe: &Recipe, target: Target) -> PathBuf {
        self.work_dir
            .join(recipe.name)
            .join(target.platform.id())
            .join("scratch")
            .join(target.arch.id())
    }

    /// JSON summary written after a run.
    pub fn report_path(&self, recipe: &Recipe) -> PathBuf {
        self.work_dir.join(recipe.name).join("build-report.json")
    }
}
