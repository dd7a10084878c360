//! # SPIRV-Cross static builder
//!
//! Build SPIRV-Cross as one static archive per Apple platform slice.
//!
//! ## Usage
//!
//! ```bash
//! spirv-cross-build all                       # Fetch + build every target + manifest entry
//! spirv-cross-build fetch                     # Clone the source at the recipe tag
//! spirv-cross-build build --platforms ios     # Build selected targets only
//! spirv-cross-build manifest --release-version 1.4.309
//! spirv-cross-build checksum Libspirv_cross.xcframework.zip
//! spirv-cross-build status                    # Show cache and artifact status
//! ```
//!
//! ## Per target
//!
//! - CMake configure/build/install into `build/<recipe>/<platform>/thin/<arch>`
//! - `lib<name>-*.a` merged into `lib/Libspirv_cross.a`
//! - `lib/pkgconfig/spirv-cross-c-shared.pc` written for Meson

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod builder;

#[derive(Parser)]
#[command(name = "spirv-cross-build", about = "Static SPIRV-Cross builder")]
struct Cli {
    #[command(flatten)]
    opts: builder::BuildOptions,

    #[command(subcommand)]
    command: builder::BuildCommands,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.opts.verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cancel = builder::process::CancelToken::new();
    cancel.install_ctrlc_handler()?;

    let ctx = cli.opts.resolve(cancel)?;
    builder::run(cli.command, &ctx)
}
