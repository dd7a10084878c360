//! Per-target pipeline: build, merge, describe.
//!
//! Targets run strictly one after another. A failing target stops the run
//! unless [`FailurePolicy::Continue`] is selected; an interrupt always
//! stops it. Partial output of a failed target is left on disk.

use crate::builder::compile;
use crate::builder::config::BuildConfig;
use crate::builder::descriptor::Descriptor;
use crate::builder::error::BuildError;
use crate::builder::manifest::{self, Checksum, PackageManifestEntry, Update};
use crate::builder::merge::{self, MergedArtifact};
use crate::builder::platform::Target;
use crate::builder::process::CancelToken;
use crate::builder::recipe::Recipe;
use crate::builder::util;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info};

/// What to do with the remaining targets after one fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    #[default]
    Abort,
    Continue,
}

/// Outcome of one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: Target,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a pipeline run, saved as JSON under the recipe's work dir.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub recipe: String,
    pub version: String,
    pub started_at: String,
    pub finished_at: String,
    pub targets: Vec<TargetReport>,
}

impl BuildReport {
    pub fn failed(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets.iter().filter(|t| t.error.is_some())
    }

    /// Load a previously saved report.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("No build report at {}", path.display()))?;
        serde_json::from_str(&contents).context("Failed to parse build report")
    }
}

pub struct Pipeline<'a> {
    recipe: &'a Recipe,
    config: &'a BuildConfig,
    cancel: CancelToken,
    policy: FailurePolicy,
}

impl<'a> Pipeline<'a> {
    pub fn new(recipe: &'a Recipe, config: &'a BuildConfig, cancel: CancelToken) -> Self {
        Self {
            recipe,
            config,
            cancel,
            policy: FailurePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build, merge and describe one target.
    pub fn run_target(&self, target: Target) -> Result<(MergedArtifact, PathBuf), BuildError> {
        let output = compile::build(self.recipe, target, self.config, &self.cancel)?;
        let artifact = merge::merge_output(self.recipe, &output, self.config, &self.cancel)?;
        let descriptor = Descriptor::for_artifact(self.recipe, &artifact).write()?;
        Ok((artifact, descriptor))
    }

    /// Run every target in order and save the report.
    ///
    /// Fails if any target failed, after the report is written.
    pub fn run(&self, targets: &[Target]) -> Result<BuildReport> {
        let mut report = BuildReport {
            recipe: self.recipe.name.to_string(),
            version: self.recipe.version.to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: String::new(),
            targets: Vec::with_capacity(targets.len()),
        };
        let mut first_error = None;

        for (i, &target) in targets.iter().enumerate() {
            println!(
                "=== [{}/{}] {} {} ===",
                i + 1,
                targets.len(),
                self.recipe.name,
                target
            );

            match self.run_target(target) {
                Ok((artifact, descriptor)) => {
                    let bytes = std::fs::metadata(&artifact.path).map(|m| m.len()).ok();
                    info!(slice = %artifact.target, artifact = %artifact.path.display(), "target complete");
                    report.targets.push(TargetReport {
                        target,
                        artifact: Some(artifact.path),
                        bytes,
                        descriptor: Some(descriptor),
                        error: None,
                    });
                }
                Err(err) => {
                    error!(%target, "{err}");
                    report.targets.push(TargetReport {
                        target,
                        artifact: None,
                        bytes: None,
                        descriptor: None,
                        error: Some(err.to_string()),
                    });
                    let stop = self.policy == FailurePolicy::Abort
                        || matches!(err, BuildError::Cancelled { .. });
                    first_error.get_or_insert(err);
                    if stop {
                        break;
                    }
                }
            }
        }

        report.finished_at = chrono::Utc::now().to_rfc3339();
        self.save_report(&report)?;

        if let Some(err) = first_error {
            let failed = report.failed().count();
            return Err(anyhow::Error::new(err).context(format!(
                "{failed} of {} target(s) failed for {}",
                targets.len(),
                self.recipe.name
            )));
        }
        Ok(report)
    }

    /// Insert or refresh the recipe's manifest entry for `release`.
    pub fn emit_manifest(&self, release: &str, checksum: Option<Checksum>) -> Result<Update> {
        let entry = PackageManifestEntry::for_recipe(self.recipe, release, checksum);
        let outcome = manifest::update(&self.config.manifest, &entry)?;
        match outcome {
            Update::Unchanged => println!("  Manifest already up to date: {}", entry.name),
            Update::Inserted | Update::Replaced => println!(
                "  Manifest {}: {} -> {}",
                if outcome == Update::Inserted { "added" } else { "updated" },
                entry.name,
                entry.url
            ),
        }
        Ok(outcome)
    }

    fn save_report(&self, report: &BuildReport) -> Result<()> {
        let path = self.config.report_path(self.recipe);
        let contents = serde_json::to_string_pretty(report)?;
        util::write_atomic(&path, contents.as_bytes())?;
        Ok(())
    }
}

/// Error out early when a run would write nowhere useful.
pub fn ensure_manifest(config: &BuildConfig) -> Result<()> {
    if !config.manifest.exists() {
        bail!(
            "manifest {} not found (set `manifest` in build.toml)",
            config.manifest.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::platform::{self, Arch, Platform};
    use crate::builder::recipe::LIBFOO;
    use crate::builder::testutil;
    use tempfile::TempDir;

    #[test]
    fn test_libfoo_ios_arm64_end_to_end() {
        let tmp = TempDir::new().unwrap();
        let config = testutil::config_in(tmp.path(), &LIBFOO);
        testutil::seed_source(&config, &LIBFOO);
        let pipeline = Pipeline::new(&LIBFOO, &config, CancelToken::new());

        let (artifact, descriptor) = pipeline
            .run_target(Target::new(Platform::Ios, Arch::Arm64))
            .unwrap();

        assert!(artifact.path.ends_with("ios/thin/arm64/lib/Libfoo.a"));
        assert_eq!(
            std::fs::read_to_string(&artifact.path).unwrap(),
            "core-objectsext-objects"
        );
        let pc = std::fs::read_to_string(descriptor).unwrap();
        assert!(pc.contains("Libs: -L${libdir} -lLibfoo\n"));
        assert!(pc.contains("Version: 1.0\n"));
    }

    #[test]
    fn test_every_target_gets_one_nonempty_artifact() {
        let tmp = TempDir::new().unwrap();
        let config = testutil::config_in(tmp.path(), &LIBFOO);
        testutil::seed_source(&config, &LIBFOO);
        let targets =
            platform::enumerate(&[Platform::Ios, Platform::IosSimulator], &[]).unwrap();

        let report = Pipeline::new(&LIBFOO, &config, CancelToken::new())
            .run(&targets)
            .unwrap();

        assert_eq!(report.targets.len(), 3);
        for target in &targets {
            let lib = config.thin_dir(&LIBFOO, *target).join("lib");
            let merged: Vec<_> = std::fs::read_dir(&lib)
                .unwrap()
                .filter_map(Result::ok)
                .filter(|e| e.file_name() == "Libfoo.a")
                .collect();
            assert_eq!(merged.len(), 1);
            assert!(merged[0].metadata().unwrap().len() > 0);
        }

        let saved = BuildReport::load(&config.report_path(&LIBFOO)).unwrap();
        assert_eq!(saved.targets.len(), 3);
        assert_eq!(saved.failed().count(), 0);
    }

    #[test]
    fn test_abort_policy_stops_at_first_failure() {
        let tmp = TempDir::new().unwrap();
        let mut config = testutil::config_in(tmp.path(), &LIBFOO);
        testutil::use_failing_cmake(&mut config);
        testutil::seed_source(&config, &LIBFOO);
        let targets = platform::enumerate(&[Platform::Macos], &[]).unwrap();

        let err = Pipeline::new(&LIBFOO, &config, CancelToken::new())
            .run(&targets)
            .unwrap_err();

        assert!(err.to_string().contains("1 of 2 target(s) failed"));
        let report = BuildReport::load(&config.report_path(&LIBFOO)).unwrap();
        assert_eq!(report.targets.len(), 1);
        assert!(report.targets[0].error.as_deref().unwrap().contains("exit code 1"));
    }

    #[test]
    fn test_continue_policy_attempts_every_target() {
        let tmp = TempDir::new().unwrap();
        let mut config = testutil::config_in(tmp.path(), &LIBFOO);
        testutil::use_failing_cmake(&mut config);
        testutil::seed_source(&config, &LIBFOO);
        let targets = platform::enumerate(&[Platform::Macos], &[]).unwrap();

        let err = Pipeline::new(&LIBFOO, &config, CancelToken::new())
            .with_policy(FailurePolicy::Continue)
            .run(&targets)
            .unwrap_err();

        assert!(err.to_string().contains("2 of 2 target(s) failed"));
        let report = BuildReport::load(&config.report_path(&LIBFOO)).unwrap();
        assert_eq!(report.failed().count(), 2);
    }

    #[test]
    fn test_cancelled_run_stops_even_when_continuing() {
        let tmp = TempDir::new().unwrap();
        let config = testutil::config_in(tmp.path(), &LIBFOO);
        testutil::seed_source(&config, &LIBFOO);
        let cancel = CancelToken::new();
        cancel.cancel();
        let targets = platform::enumerate(&[Platform::Macos], &[]).unwrap();

        let err = Pipeline::new(&LIBFOO, &config, cancel)
            .with_policy(FailurePolicy::Continue)
            .run(&targets)
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::Cancelled { .. })
        ));
        let report = BuildReport::load(&config.report_path(&LIBFOO)).unwrap();
        assert_eq!(report.targets.len(), 1);
    }

    #[test]
    fn test_naming_mismatch_fails_the_target() {
        let tmp = TempDir::new().unwrap();
        // The fake cmake installs libspirv-cross-*.a, which libfoo's
        // convention does not match.
        let config = testutil::config_in(tmp.path(), &crate::builder::recipe::SPIRV_CROSS);
        testutil::seed_source(&config, &LIBFOO);
        let pipeline = Pipeline::new(&LIBFOO, &config, CancelToken::new());

        let err = pipeline
            .run_target(Target::new(Platform::Ios, Arch::Arm64))
            .unwrap_err();

        assert!(matches!(err, BuildError::EmptyMergeSet { .. }));
        let lib = config
            .thin_dir(&LIBFOO, Target::new(Platform::Ios, Arch::Arm64))
            .join("lib");
        assert!(!lib.join("Libfoo.a").exists());
    }

    #[test]
    fn test_emit_manifest() {
        let tmp = TempDir::new().unwrap();
        let config = testutil::config_in(tmp.path(), &LIBFOO);
        std::fs::write(
            &config.manifest,
            "targets: [\n//AUTO_GENERATE_TARGETS_BEGIN//\n//AUTO_GENERATE_TARGETS_END//\n]\n",
        )
        .unwrap();
        let pipeline = Pipeline::new(&LIBFOO, &config, CancelToken::new());

        assert_eq!(pipeline.emit_manifest("2.0.0", None).unwrap(), Update::Inserted);
        assert_eq!(pipeline.emit_manifest("2.0.0", None).unwrap(), Update::Unchanged);
        assert_eq!(pipeline.emit_manifest("2.0.1", None).unwrap(), Update::Replaced);

        let manifest = std::fs::read_to_string(&config.manifest).unwrap();
        assert!(manifest.contains("url: \"https://example.invalid/2.0.1/Libfoo.xcframework.zip\""));
        assert!(!manifest.contains("2.0.0"));
    }

    #[test]
    fn test_ensure_manifest() {
        let tmp = TempDir::new().unwrap();
        let config = testutil::config_in(tmp.path(), &LIBFOO);
        assert!(ensure_manifest(&config).is_err());
        std::fs::write(&config.manifest, "").unwrap();
        assert!(ensure_manifest(&config).is_ok());
    }
}
