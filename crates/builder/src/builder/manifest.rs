//! Package manifest maintenance.
//!
//! Generated `.binaryTarget` entries live between two marker lines in the
//! package manifest. Updating an entry rewrites only that entry; every
//! other byte of the file, including hand-written or foreign entries inside
//! the marker region, is kept as is.

use crate::builder::error::BuildError;
use crate::builder::recipe::Recipe;
use crate::builder::util;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::info;

pub const BEGIN_MARKER: &str = "//AUTO_GENERATE_TARGETS_BEGIN//";
pub const END_MARKER: &str = "//AUTO_GENERATE_TARGETS_END//";

const ENTRY_INDENT: &str = "        ";

/// Checksum field of a manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checksum {
    /// SHA-256 of the published archive, lowercase hex.
    Sha256(String),
    /// Location of a published checksum file.
    Url(String),
}

impl Checksum {
    /// A literal SHA-256 digest, if `digest` is 64 lowercase hex characters.
    pub fn sha256(digest: &str) -> Option<Self> {
        let valid = digest.len() == 64
            && digest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        valid.then(|| Self::Sha256(digest.to_string()))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256(value) | Self::Url(value) => f.write_str(value),
        }
    }
}

/// One generated manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManifestEntry {
    pub name: String,
    pub url: String,
    pub checksum: Checksum,
}

/// What [`update`] did to the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    Inserted,
    Replaced,
    Unchanged,
}

impl PackageManifestEntry {
    /// Entry for a recipe's published binary at `release`.
    ///
    /// Without an explicit checksum the entry points at the checksum file
    /// published next to the archive.
    pub fn for_recipe(recipe: &Recipe, release: &str, checksum: Option<Checksum>) -> Self {
        let package = &recipe.package;
        Self {
            name: package.artifact.to_string(),
            url: package.url_template.replace("{version}", release),
            checksum: checksum.unwrap_or_else(|| {
                Checksum::Url(package.checksum_template.replace("{version}", release))
            }),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{ENTRY_INDENT}.binaryTarget(\n\
             {ENTRY_INDENT}    name: \"{}\",\n\
             {ENTRY_INDENT}    url: \"{}\",\n\
             {ENTRY_INDENT}    checksum: \"{}\"\n\
             {ENTRY_INDENT}),\n",
            self.name, self.url, self.checksum
        )
    }
}

/// Insert or replace `entry` in the manifest at `path`.
///
/// The file is only rewritten when its content changes, and never when a
/// marker is missing.
pub fn update(path: &Path, entry: &PackageManifestEntry) -> Result<Update, BuildError> {
    let content = std::fs::read_to_string(path).map_err(|e| BuildError::fs(path, e))?;
    let (updated, outcome) = apply(&content, entry).map_err(|marker| BuildError::MarkerNotFound {
        path: path.to_path_buf(),
        marker: marker.to_string(),
    })?;

    if outcome != Update::Unchanged {
        util::write_atomic(path, updated.as_bytes())?;
    }
    info!(manifest = %path.display(), entry = %entry.name, ?outcome, "manifest updated");
    Ok(outcome)
}

/// Pure form of [`update`]. On a missing marker, returns that marker.
pub fn apply(
    content: &str,
    entry: &PackageManifestEntry,
) -> Result<(String, Update), &'static str> {
    let region = marker_region(content)?;
    let rendered = entry.render();
    let body = &content[region.clone()];

    let (start, end, outcome) = match find_entry(body, &entry.name) {
        Some(block) if body[block.clone()] == rendered => {
            return Ok((content.to_string(), Update::Unchanged));
        }
        Some(block) => (region.start + block.start, region.start + block.end, Update::Replaced),
        None => (region.end, region.end, Update::Inserted),
    };

    let mut updated = String::with_capacity(content.len() + rendered.len() + 1);
    updated.push_str(&content[..start]);
    if outcome == Update::Inserted && needs_separator(body) {
        updated.push('\n');
    }
    updated.push_str(&rendered);
    updated.push_str(&content[end..]);
    Ok((updated, outcome))
}

/// Byte range between the end of the begin-marker line and the start of
/// the end-marker line.
fn marker_region(content: &str) -> Result<Range<usize>, &'static str> {
    let mut offset = 0;
    let mut begin = None;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim();
        match begin {
            None if trimmed == BEGIN_MARKER => begin = Some(offset + line.len()),
            Some(start) if trimmed == END_MARKER => return Ok(start..offset),
            _ => {}
        }
        offset += line.len();
    }
    Err(if begin.is_none() { BEGIN_MARKER } else { END_MARKER })
}

/// Range (within `body`) of the `.binaryTarget` block named `name`.
fn find_entry(body: &str, name: &str) -> Option<Range<usize>> {
    let name_field = format!("name: \"{name}\"");
    let mut offset = 0;
    let mut block: Option<(usize, bool)> = None;

    for line in body.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.starts_with(".binaryTarget(") {
            block = Some((offset, false));
        }
        if let Some((start, matched)) = block.as_mut() {
            *matched |= trimmed.contains(&name_field);
            if trimmed == ")," || trimmed == ")" {
                if *matched {
                    return Some(*start..offset + line.len());
                }
                block = None;
            }
        }
        offset += line.len();
    }
    None
}

// Keep a blank line between the previous entry and an appended one.
fn needs_separator(body: &str) -> bool {
    !body.is_empty() && body != "\n" && !body.ends_with("\n\n")
}

/// SHA-256 of a file, lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String, BuildError> {
    let mut file = std::fs::File::open(path).map_err(|e| BuildError::fs(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| BuildError::fs(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Write `<stem>.checksum.txt` next to `path` (`X.xcframework.zip` gives
/// `X.xcframework.checksum.txt`). Returns the checksum file and digest.
pub fn write_checksum_file(path: &Path) -> Result<(PathBuf, String), BuildError> {
    let digest = sha256_file(path)?;
    let checksum_path = path.with_extension("checksum.txt");
    util::write_atomic(&checksum_path, digest.as_bytes())?;
    Ok((checksum_path, digest))
}
