//! Static archive merging.
//!
//! The build must install its libraries as `<prefix>*<suffix>` in the
//! target's `lib` dir. Anything else is a naming mismatch and fails the
//! target rather than producing an empty or missing archive.

use crate::builder::compile::BuildOutput;
use crate::builder::config::BuildConfig;
use crate::builder::error::BuildError;
use crate::builder::platform::Target;
use crate::builder::process::{self, CancelToken, CommandTemplate};
use crate::builder::recipe::{MergeSpec, Recipe};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The single archive produced for a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedArtifact {
    pub target: Target,
    pub path: PathBuf,
}

/// Merge the recipe's libraries from a build output into one archive.
pub fn merge_output(
    recipe: &Recipe,
    output: &BuildOutput,
    config: &BuildConfig,
    cancel: &CancelToken,
) -> Result<MergedArtifact, BuildError> {
    let lib_dir = output.lib_dir();
    let path = lib_dir.join(recipe.merged_file_name());
    merge(&lib_dir, &recipe.merge, &path, &config.tools.archive, cancel)?;
    println!("  Merged: {}", path.display());
    Ok(MergedArtifact {
        target: output.target,
        path,
    })
}

/// Library files in `dir` that follow the naming convention, sorted.
///
/// `exclude` (the merge output) never counts as an input. A missing `dir`
/// has no inputs.
pub fn matching_inputs(
    dir: &Path,
    spec: &MergeSpec,
    exclude: &Path,
) -> Result<Vec<PathBuf>, BuildError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(BuildError::fs(dir, e)),
    };

    let mut inputs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| BuildError::fs(dir, e))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(spec.prefix) || !name.ends_with(spec.suffix) {
            continue;
        }
        if path.file_name() == exclude.file_name() || !path.is_file() {
            continue;
        }
        inputs.push(path);
    }
    inputs.sort();
    Ok(inputs)
}

/// Merge every matching library in `dir` into `output` with `tool`.
///
/// A stale `output` is removed first, even when the merge then fails.
/// Fails with [`BuildError::EmptyMergeSet`] when nothing matches.
pub fn merge(
    dir: &Path,
    spec: &MergeSpec,
    output: &Path,
    tool: &CommandTemplate,
    cancel: &CancelToken,
) -> Result<(), BuildError> {
    match std::fs::remove_file(output) {
        Ok(()) => debug!(output = %output.display(), "removed stale archive"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(BuildError::fs(output, e)),
    }

    let inputs = matching_inputs(dir, spec, output)?;
    if inputs.is_empty() {
        return Err(BuildError::EmptyMergeSet {
            dir: dir.to_path_buf(),
            prefix: spec.prefix.to_string(),
            suffix: spec.suffix.to_string(),
        });
    }
    debug!(count = inputs.len(), dir = %dir.display(), "merge inputs");

    let mut values = BTreeMap::new();
    values.insert("output", vec![output.display().to_string()]);
    values.insert(
        "inputs",
        inputs.iter().map(|p| p.display().to_string()).collect(),
    );
    process::run(&mut tool.command(&values), cancel)?;

    match std::fs::metadata(output) {
        Ok(meta) if meta.len() > 0 => {
            info!(output = %output.display(), bytes = meta.len(), "merged");
            Ok(())
        }
        _ => Err(BuildError::MissingArtifact {
            path: output.to_path_buf(),
        }),
    }
}
