//! Error taxonomy for the build pipeline.
//!
//! Every variant is fatal. Nothing here is retried: a failure means the
//! toolchain, the recipe table, or the manifest needs a human to look at it.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the pipeline stages.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{program} exited with {}{}", exit_label(.code), stderr_tail(.stderr))]
    ExternalProcess {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("interrupted while running {program}")]
    Cancelled { program: String },

    #[error("no files matching {prefix}*{suffix} in {}", .dir.display())]
    EmptyMergeSet {
        dir: PathBuf,
        prefix: String,
        suffix: String,
    },

    #[error("expected artifact missing or empty: {}", .path.display())]
    MissingArtifact { path: PathBuf },

    #[error("marker {marker} not found in {}", .path.display())]
    MarkerNotFound { path: PathBuf, marker: String },

    #[error("{}: {source}", .path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown recipe: {0}")]
    UnknownRecipe(String),

    #[error("no buildable targets in the selected platform/architecture matrix")]
    EmptyMatrix,

    #[error("{name} source not found at {}. Run: spirv-cross-build fetch", .path.display())]
    SourceMissing { name: String, path: PathBuf },
}

impl BuildError {
    /// Wrap an I/O error with the path it happened on.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (killed by signal)".to_string(),
    }
}

fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{trimmed}")
    }
}
