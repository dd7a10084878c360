//! Platform/architecture matrix.
//!
//! A [`Target`] is one (platform, architecture) slice. The matrix is
//! enumerated once from the CLI selection and never changes afterwards.

use crate::builder::error::BuildError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Apple platform slices SPIRV-Cross is built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[value(name = "macos")]
    Macos,
    #[value(name = "ios")]
    Ios,
    #[value(name = "isimulator")]
    #[serde(rename = "isimulator")]
    IosSimulator,
    #[value(name = "tvos")]
    Tvos,
    #[value(name = "tvsimulator")]
    #[serde(rename = "tvsimulator")]
    TvosSimulator,
    #[value(name = "xros")]
    Xros,
    #[value(name = "xrsimulator")]
    #[serde(rename = "xrsimulator")]
    XrosSimulator,
    #[value(name = "maccatalyst")]
    MacCatalyst,
}

/// CPU architectures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum Arch {
    #[value(name = "arm64")]
    #[serde(rename = "arm64")]
    Arm64,
    #[value(name = "x86_64")]
    #[serde(rename = "x86_64")]
    X86_64,
}

/// Minimum OS versions passed to the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeploymentTargets {
    pub macos: String,
    pub ios: String,
    pub tvos: String,
    pub xros: String,
}

impl Default for DeploymentTargets {
    fn default() -> Self {
        Self {
            macos: "10.15".to_string(),
            ios: "13.0".to_string(),
            tvos: "13.0".to_string(),
            xros: "1.0".to_string(),
        }
    }
}

impl Platform {
    pub const ALL: [Platform; 8] = [
        Platform::Macos,
        Platform::Ios,
        Platform::IosSimulator,
        Platform::Tvos,
        Platform::TvosSimulator,
        Platform::Xros,
        Platform::XrosSimulator,
        Platform::MacCatalyst,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::Macos => "macos",
            Self::Ios => "ios",
            Self::IosSimulator => "isimulator",
            Self::Tvos => "tvos",
            Self::TvosSimulator => "tvsimulator",
            Self::Xros => "xros",
            Self::XrosSimulator => "xrsimulator",
            Self::MacCatalyst => "maccatalyst",
        }
    }

    /// Architectures this platform ships slices for.
    pub fn architectures(self) -> &'static [Arch] {
        match self {
            Self::Ios | Self::Tvos | Self::Xros | Self::XrosSimulator => &[Arch::Arm64],
            Self::Macos | Self::IosSimulator | Self::TvosSimulator | Self::MacCatalyst => {
                &[Arch::Arm64, Arch::X86_64]
            }
        }
    }

    /// Value for `CMAKE_SYSTEM_NAME`, or `None` when building for the host OS.
    pub fn cmake_system_name(self) -> Option<&'static str> {
        match self {
            Self::Macos | Self::MacCatalyst => None,
            Self::Ios | Self::IosSimulator => Some("iOS"),
            Self::Tvos | Self::TvosSimulator => Some("tvOS"),
            Self::Xros | Self::XrosSimulator => Some("visionOS"),
        }
    }

    /// SDK name understood by `xcrun --sdk` and `CMAKE_OSX_SYSROOT`.
    pub fn sdk(self) -> &'static str {
        match self {
            Self::Macos | Self::MacCatalyst => "macosx",
            Self::Ios => "iphoneos",
            Self::IosSimulator => "iphonesimulator",
            Self::Tvos => "appletvos",
            Self::TvosSimulator => "appletvsimulator",
            Self::Xros => "xros",
            Self::XrosSimulator => "xrsimulator",
        }
    }

    /// Minimum OS version for this platform.
    ///
    /// Mac Catalyst is an iOS runtime, so it takes the iOS version.
    pub fn deployment_target(self, targets: &DeploymentTargets) -> &str {
        match self {
            Self::Macos => &targets.macos,
            Self::Ios | Self::IosSimulator | Self::MacCatalyst => &targets.ios,
            Self::Tvos | Self::TvosSimulator => &targets.tvos,
            Self::Xros | Self::XrosSimulator => &targets.xros,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl Arch {
    pub const ALL: [Arch; 2] = [Arch::Arm64, Arch::X86_64];

    pub fn id(self) -> &'static str {
        match self {
            Self::Arm64 => "arm64",
            Self::X86_64 => "x86_64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// One (platform, architecture) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub platform: Platform,
    pub arch: Arch,
}

impl Target {
    pub fn new(platform: Platform, arch: Arch) -> Self {
        Self { platform, arch }
    }

    /// Compiler flags needed on top of the sysroot/arch settings.
    pub fn extra_cflags(self, targets: &DeploymentTargets) -> Option<String> {
        match self.platform {
            Platform::MacCatalyst => Some(format!(
                "-target {}-apple-ios{}-macabi",
                self.arch,
                self.platform.deployment_target(targets)
            )),
            _ => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.platform, self.arch)
    }
}

/// Expand a platform/architecture selection into the build matrix.
///
/// Empty selections mean "all". Order follows the selection; pairs the
/// platform does not support are dropped, as are duplicates.
pub fn enumerate(platforms: &[Platform], archs: &[Arch]) -> Result<Vec<Target>, BuildError> {
    let platforms = if platforms.is_empty() {
        &Platform::ALL[..]
    } else {
        platforms
    };
    let archs = if archs.is_empty() { &Arch::ALL[..] } else { archs };

    let mut targets = Vec::new();
    for &platform in platforms {
        for &arch in archs {
            let target = Target::new(platform, arch);
            if platform.architectures().contains(&arch) && !targets.contains(&target) {
                targets.push(target);
            }
        }
    }

    if targets.is_empty() {
        return Err(BuildError::EmptyMatrix);
    }
    Ok(targets)
}
