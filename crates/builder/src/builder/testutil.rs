//! Test fixtures standing in for CMake and libtool.
//!
//! The fake tools are `/bin/sh` scripts so tests run on any Unix host
//! without an Apple toolchain.

use crate::builder::config::BuildConfig;
use crate::builder::process::CommandTemplate;
use crate::builder::recipe::Recipe;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Fake `cmake`: records every invocation in `<build>/invocations`,
/// remembers the install prefix at configure time, and on `--install`
/// drops `lib<name>-core.a` and `lib<name>-ext.a` into `<prefix>/lib`.
const FAKE_CMAKE: &str = r#"#!/bin/sh
case "$1" in
  -S)
    build="$4"
    mkdir -p "$build"
    echo "configure $*" >> "$build/invocations"
    for arg in "$@"; do
      case "$arg" in
        -DCMAKE_INSTALL_PREFIX=*) echo "${arg#-DCMAKE_INSTALL_PREFIX=}" > "$build/prefix" ;;
      esac
    done
    ;;
  --build)
    echo "build $*" >> "$2/invocations"
    ;;
  --install)
    echo "install $*" >> "$2/invocations"
    prefix=$(cat "$2/prefix")
    mkdir -p "$prefix/lib"
    printf 'core-objects' > "$prefix/lib/${FAKE_LIB}-core.a"
    printf 'ext-objects' > "$prefix/lib/${FAKE_LIB}-ext.a"
    ;;
esac
"#;

/// Fake `cmake` that fails configure with a CMake-style error.
const FAILING_CMAKE: &str = r#"#!/bin/sh
echo "CMake Error: Could not find toolchain for $*" >&2
exit 1
"#;

/// Merge command that concatenates inputs, standing in for `libtool -static`.
pub fn concat_archive() -> CommandTemplate {
    CommandTemplate::new([
        "sh",
        "-c",
        r#"out="$1"; shift; cat "$@" > "$out""#,
        "sh",
        "{output}",
        "{inputs}",
    ])
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Directory holding the fake tools, written once per test process.
///
/// Writing an executable while another test thread forks can make the
/// later exec fail with ETXTBSY, so the scripts are never rewritten.
fn tools_dir() -> &'static Path {
    static TOOLS: OnceLock<PathBuf> = OnceLock::new();
    TOOLS.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!(
            "spirv-cross-build-tools-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        for lib in ["libfoo", "libspirv-cross"] {
            write_script(
                &dir,
                &format!("cmake-{lib}"),
                &FAKE_CMAKE.replace("${FAKE_LIB}", lib),
            );
        }
        write_script(&dir, "cmake-broken", FAILING_CMAKE);
        dir
    })
}

/// Configuration rooted in `root`, wired to the fake toolchain.
///
/// The fake cmake names its libraries after `recipe.merge.prefix`, so the
/// installed files match the recipe's naming convention.
pub fn config_in(root: &Path, recipe: &Recipe) -> BuildConfig {
    let lib = recipe.merge.prefix.trim_end_matches('-');
    let mut config = BuildConfig {
        work_dir: root.join("build"),
        vendor_dir: root.join("vendor"),
        manifest: root.join("Package.swift"),
        jobs: Some(2),
        ..BuildConfig::default()
    };
    config.tools.cmake = tools_dir().join(format!("cmake-{lib}")).display().to_string();
    config.tools.archive = concat_archive();
    config
}

/// Swap in a cmake that always fails.
pub fn use_failing_cmake(config: &mut BuildConfig) {
    config.tools.cmake = tools_dir().join("cmake-broken").display().to_string();
}

/// Pretend the recipe's sources were fetched.
pub fn seed_source(config: &BuildConfig, recipe: &Recipe) -> PathBuf {
    let src = config.source_dir(recipe);
    std::fs::create_dir_all(&src).unwrap();
    std::fs::write(src.join("CMakeLists.txt"), "project(fake)\n").unwrap();
    src
}
