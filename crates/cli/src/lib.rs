mod assemble;
mod inspect;

use clap::{Parser, Subcommand};
use shadejar_api::{AssemblyError, ErrorKind};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "shadejar",
    version,
    about = "Assemble dependency archives into one self-contained executable archive",
    long_about = "Shadejar merges the host application archive and its resolved dependency \
                  archives into a single runnable archive. Conflicting entries are settled by \
                  merge policies, service registrations are merged, signatures are dropped and \
                  dependency namespaces can be relocated to avoid version clashes."
)]
pub struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Assemble an output archive from a JSON configuration
    #[command(
        long_about = "Reads the assembly configuration (inputs in rank order, merge policies, \
                            relocation rules, manifest settings) and writes the output archive. \
                            The output file is replaced atomically; on failure it is left untouched."
    )]
    Assemble {
        /// Path to the assembly configuration
        #[arg(short, long, value_name = "CONFIG")]
        config: PathBuf,
        /// Override the output archive path
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Override the entry point (fully qualified class name)
        #[arg(long, value_name = "FQN")]
        entry_point: Option<String>,
        /// Number of archives scanned in parallel
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
    },
    /// List the entries of an archive with their classification
    Inspect {
        /// Path to the archive
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,
    },
}

/// Process exit status for a failed assembly.
pub fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::NotFound => 2,
        ErrorKind::CorruptArchive => 3,
        ErrorKind::AmbiguousPolicy => 4,
        ErrorKind::InconsistentRelocation => 5,
        ErrorKind::WriteError => 6,
        ErrorKind::InvalidConfig => 7,
        ErrorKind::Cancelled => 130,
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let component = match &cli.command {
        Commands::Assemble { .. } => "assemble",
        Commands::Inspect { .. } => "inspect",
    };
    let _guard = shadejar_core::logging::init_logging(component, cli.verbose);

    let result = match cli.command {
        Commands::Assemble {
            config,
            output,
            entry_point,
            workers,
        } => assemble::run(assemble::Overrides {
            config,
            output,
            entry_point,
            workers,
        }),
        Commands::Inspect { archive } => inspect::run(&archive),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            let code = e
                .downcast_ref::<AssemblyError>()
                .map_or(1, |e| exit_code(e.kind()));
            ExitCode::from(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assemble_with_overrides() {
        let cli = Cli::try_parse_from([
            "shadejar",
            "-v",
            "assemble",
            "--config",
            "shade.json",
            "--output",
            "out.jar",
            "--entry-point",
            "app.Main",
            "--workers",
            "4",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Assemble {
                config,
                output,
                entry_point,
                workers,
            } => {
                assert_eq!(config, PathBuf::from("shade.json"));
                assert_eq!(output, Some(PathBuf::from("out.jar")));
                assert_eq!(entry_point.as_deref(), Some("app.Main"));
                assert_eq!(workers, Some(4));
            }
            Commands::Inspect { .. } => panic!("expected assemble"),
        }
    }

    #[test]
    fn test_assemble_requires_config() {
        assert!(Cli::try_parse_from(["shadejar", "assemble"]).is_err());
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let kinds = [
            ErrorKind::NotFound,
            ErrorKind::CorruptArchive,
            ErrorKind::AmbiguousPolicy,
            ErrorKind::InconsistentRelocation,
            ErrorKind::WriteError,
            ErrorKind::InvalidConfig,
            ErrorKind::Cancelled,
            ErrorKind::Internal,
        ];
        let mut codes: Vec<u8> = kinds.iter().map(|k| exit_code(*k)).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
        assert_eq!(exit_code(ErrorKind::Cancelled), 130);
    }
}
