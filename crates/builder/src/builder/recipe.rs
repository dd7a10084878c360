//! Recipe table - single source of truth for the libraries this tool builds.
//!
//! A recipe is plain data. Per-target build arguments come from
//! [`Recipe::arguments`], a pure function of the recipe, the target and the
//! configuration.

use crate::builder::config::BuildConfig;
use crate::builder::error::BuildError;
use crate::builder::platform::Target;

/// One external library build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub name: &'static str,
    /// Git tag checked out for the build.
    pub version: &'static str,
    pub url: &'static str,
    /// Extra CMake arguments applied to every target.
    pub build_args: &'static [&'static str],
    pub merge: MergeSpec,
    pub descriptor: DescriptorSpec,
    pub package: PackageSpec,
}

/// Naming convention for the static libraries the build installs, and the
/// name of the archive they are merged into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSpec {
    pub prefix: &'static str,
    pub suffix: &'static str,
    /// Merged archive stem; the file is `<output>.a` in the same `lib` dir.
    pub output: &'static str,
}

/// pkg-config descriptor advertised to downstream builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSpec {
    /// File stem under `lib/pkgconfig/`.
    pub name: &'static str,
    pub description: &'static str,
    /// Header directory below `include/`.
    pub include_subdir: &'static str,
    pub libs: LinkLibs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkLibs {
    /// Link the merged archive only.
    // Only the test recipe links its merged archive today.
    #[cfg_attr(not(test), allow(dead_code))]
    Merged,
    /// Link these libraries (without the `-l`).
    Explicit(&'static [&'static str]),
}

/// Package manifest entry for the published binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub artifact: &'static str,
    /// Download URL; `{version}` is the release version.
    pub url_template: &'static str,
    /// URL of the published checksum file; `{version}` is the release version.
    pub checksum_template: &'static str,
    /// Release version used when none is given on the command line.
    pub default_release: &'static str,
}

macro_rules! release_asset {
    ($file:literal) => {
        concat!(
            "https://github.com/endpne/libspirv-cross-build/releases/download/{version}/",
            $file
        )
    };
}

pub static SPIRV_CROSS: Recipe = Recipe {
    name: "libspirv-cross",
    version: "vulkan-sdk-1.4.309.0",
    url: "https://github.com/KhronosGroup/SPIRV-Cross",
    build_args: &[
        "-DSPIRV_CROSS_CLI=OFF",
        "-DSPIRV_CROSS_ENABLE_TESTS=OFF",
        "-DSPIRV_CROSS_ENABLE_C_API=ON",
        "-DSPIRV_CROSS_SHARED=OFF",
        "-DSPIRV_CROSS_STATIC=ON",
    ],
    merge: MergeSpec {
        prefix: "libspirv-cross-",
        suffix: ".a",
        output: "Libspirv_cross",
    },
    // Meson looks for the shared C API; point it at the static libraries.
    descriptor: DescriptorSpec {
        name: "spirv-cross-c-shared",
        description: "SPIR-V Cross (Static Build with Shared Shim)",
        include_subdir: "spirv_cross",
        libs: LinkLibs::Explicit(&[
            "spirv-cross-c",
            "spirv-cross-core",
            "spirv-cross-glsl",
            "spirv-cross-cpp",
            "spirv-cross-reflect",
            "spirv-cross-msl",
            "spirv-cross-hlsl",
        ]),
    },
    package: PackageSpec {
        artifact: "Libspirv_cross",
        url_template: release_asset!("Libspirv_cross.xcframework.zip"),
        checksum_template: release_asset!("Libspirv_cross.xcframework.checksum.txt"),
        default_release: "1.4.309",
    },
};

/// All registered recipes.
pub static RECIPES: &[&Recipe] = &[&SPIRV_CROSS];

/// Get recipe by name.
#[must_use]
pub fn get(name: &str) -> Option<&'static Recipe> {
    RECIPES.iter().find(|r| r.name == name).copied()
}

/// Get recipe by name, failing on unknown names.
pub fn require(name: &str) -> Result<&'static Recipe, BuildError> {
    get(name).ok_or_else(|| {
        BuildError::UnknownRecipe(format!(
            "{name} (available: {})",
            names().collect::<Vec<_>>().join(", ")
        ))
    })
}

/// List all recipe names.
pub fn names() -> impl Iterator<Item = &'static str> {
    RECIPES.iter().map(|r| r.name)
}

impl Recipe {
    /// CMake cache arguments for one target: cross-compilation settings
    /// followed by the recipe's own arguments.
    pub fn arguments(&self, target: Target, config: &BuildConfig) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(system) = target.platform.cmake_system_name() {
            args.push(format!("-DCMAKE_SYSTEM_NAME={system}"));
        }
        args.push(format!("-DCMAKE_OSX_SYSROOT={}", target.platform.sdk()));
        args.push(format!("-DCMAKE_OSX_ARCHITECTURES={}", target.arch));

        match target.extra_cflags(&config.deployment) {
            Some(flags) => {
                args.push(format!("-DCMAKE_C_FLAGS={flags}"));
                args.push(format!("-DCMAKE_CXX_FLAGS={flags}"));
            }
            None => args.push(format!(
                "-DCMAKE_OSX_DEPLOYMENT_TARGET={}",
                target.platform.deployment_target(&config.deployment)
            )),
        }

        args.push(format!("-DCMAKE_BUILD_TYPE={}", config.build_type));
        args.push("-DBUILD_SHARED_LIBS=OFF".to_string());
        args.extend(self.build_args.iter().map(ToString::to_string));
        args
    }

    /// File name of the merged archive.
    pub fn merged_file_name(&self) -> String {
        format!("{}.a", self.merge.output)
    }

    /// `Libs:` value of the descriptor, after `-L${libdir}`.
    pub fn link_flags(&self) -> String {
        match self.descriptor.libs {
            LinkLibs::Merged => format!("-l{}", self.merge.output),
            LinkLibs::Explicit(libs) => libs
                .iter()
                .map(|lib| format!("-l{lib}"))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Small recipe used by the pipeline tests.
#[cfg(test)]
pub(crate) static LIBFOO: Recipe = Recipe {
    name: "libfoo",
    version: "1.0",
    url: "https://example.invalid/libfoo.git",
    build_args: &["-DFOO_STATIC=ON"],
    merge: MergeSpec {
        prefix: "libfoo-",
        suffix: ".a",
        output: "Libfoo",
    },
    descriptor: DescriptorSpec {
        name: "libfoo",
        description: "Foo",
        include_subdir: "foo",
        libs: LinkLibs::Merged,
    },
    package: PackageSpec {
        artifact: "Libfoo",
        url_template: "https://example.invalid/{version}/Libfoo.xcframework.zip",
        checksum_template: "https://example.invalid/{version}/Libfoo.xcframework.checksum.txt",
        default_release: "1.0.0",
    },
};
