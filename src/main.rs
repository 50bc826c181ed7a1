//! Entry point for the stublink trampoline generator.
//!
//! This file handles high-level application flow:
//! 1. Parse command-line arguments using `clap` and set up logging.
//! 2. Load the stub manifest into classes and an object layout.
//! 3. Link every class against the selected calling convention, collecting the code.
//! 4. Print each trampoline and optionally write them to an object file.
//!
//! Error handling is done via `anyhow`.

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use stublink::config::Config;
use stublink::install::CollectingInstaller;
use stublink::library::NativeLibraries;
use stublink::linker::Linker;
use stublink::manifest::Manifest;
use stublink::utils::to_hex;
use stublink::writer;

fn main() -> Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let (layout, classes) = Manifest::load(&config.manifest)?.into_parts()?;

    let (os, arch) = (config.target_os(), config.target_arch());
    let linker = Linker::with_platform(
        os,
        arch,
        NativeLibraries::global(),
        Box::new(layout),
        CollectingInstaller::new(),
    )
    .with_context(|| format!("cannot generate trampolines for {} on {}", arch, os))?;

    let mut failed = 0;
    for class in &classes {
        if let Err(e) = linker.link_class(class) {
            tracing::error!("{}", e);
            failed += 1;
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} classes failed to link", failed, classes.len());
    }

    let trampolines = linker.installer().take();
    for (name, code) in &trampolines {
        println!("{}: {}", name, to_hex(code));
    }

    if let Some(output) = &config.output {
        writer::write_object(output, linker.profile(), &trampolines)?;
        println!("Wrote {} trampolines to {}", trampolines.len(), output.display());
    }
    Ok(())
}
