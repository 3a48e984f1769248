use shadejar_api::AssemblyConfig;
use shadejar_core::Assembler;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Overrides {
    pub config: PathBuf,
    pub output: Option<PathBuf>,
    pub entry_point: Option<String>,
    pub workers: Option<usize>,
}

pub fn load_config(overrides: Overrides) -> Result<AssemblyConfig, Box<dyn std::error::Error>> {
    let mut config = AssemblyConfig::from_json_file(&overrides.config)?;
    // Command-line paths are relative to the working directory, not the config file.
    if let Some(output) = overrides.output {
        config.output = output;
    }
    if let Some(entry_point) = overrides.entry_point {
        config.entry_point = entry_point;
    }
    if overrides.workers.is_some() {
        config.workers = overrides.workers;
    }
    Ok(config)
}

pub fn run(overrides: Overrides) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(overrides)?;

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupted, cancelling assembly");
        handler_token.cancel();
    })?;

    let assembler = Assembler::new(config)?.with_cancellation(token);
    let report = assembler.run()?;

    info!(
        "Scanned {} archives ({} entries, {} bytes) in {:?}",
        report.scan.archives, report.scan.entries, report.scan.bytes, report.scan.duration
    );
    if let Some(relocation) = &report.relocation {
        info!(
            "Relocated {} units, rewrote {} references",
            relocation.units_relocated, relocation.references_rewritten
        );
    }
    println!(
        "{} ({} entries, {} duplicates, {} services merged) in {:.2?}",
        report.output.display(),
        report.entries_written(),
        report.resolve.duplicates,
        report.resolve.services_merged,
        report.elapsed
    );
    Ok(())
}
