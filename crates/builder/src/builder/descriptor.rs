//! pkg-config descriptor generation.
//!
//! Downstream builds (Meson in particular) locate the library through the
//! `.pc` file written here. Output depends only on the inputs.

use crate::builder::error::BuildError;
use crate::builder::merge::MergedArtifact;
use crate::builder::recipe::Recipe;
use crate::builder::util;
use std::path::{Path, PathBuf};

/// Everything that goes into one `.pc` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Install prefix (parent of `lib/`).
    pub prefix: PathBuf,
    pub name: String,
    pub description: String,
    pub version: String,
    pub include_subdir: String,
    /// Link flags after `-L${libdir}`.
    pub libs: String,
}

impl Descriptor {
    /// Descriptor for a merged artifact living in `<prefix>/lib`.
    pub fn for_artifact(recipe: &Recipe, artifact: &MergedArtifact) -> Self {
        let lib_dir = artifact.path.parent().unwrap_or_else(|| Path::new(""));
        Self::new(recipe, lib_dir)
    }

    /// Descriptor for a recipe whose libraries are in `lib_dir`.
    pub fn new(recipe: &Recipe, lib_dir: &Path) -> Self {
        let prefix = lib_dir.parent().unwrap_or(lib_dir).to_path_buf();
        Self {
            prefix,
            name: recipe.descriptor.name.to_string(),
            description: recipe.descriptor.description.to_string(),
            version: recipe.version.to_string(),
            include_subdir: recipe.descriptor.include_subdir.to_string(),
            libs: recipe.link_flags(),
        }
    }

    /// Where the file goes: `<prefix>/lib/pkgconfig/<name>.pc`.
    pub fn path(&self) -> PathBuf {
        self.prefix
            .join("lib")
            .join("pkgconfig")
            .join(format!("{}.pc", self.name))
    }

    pub fn render(&self) -> String {
        format!(
            "prefix={prefix}\n\
             exec_prefix=${{prefix}}\n\
             libdir=${{prefix}}/lib\n\
             includedir=${{prefix}}/include/{include}\n\
             \n\
             Name: {name}\n\
             Description: {description}\n\
             Version: {version}\n\
             Libs: -L${{libdir}} {libs}\n\
             Cflags: -I${{includedir}}\n",
            prefix = self.prefix.display(),
            include = self.include_subdir,
            name = self.name,
            description = self.description,
            version = self.version,
            libs = self.libs,
        )
    }

    /// Render and write atomically. Returns the written path.
    pub fn write(&self) -> Result<PathBuf, BuildError> {
        let path = self.path();
        util::write_atomic(&path, self.render().as_bytes())?;
        println!("  Generated: {}", path.display());
        Ok(path)
    }
}
