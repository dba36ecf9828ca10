//! RPKI relying party CLI
//!
//! Validates the global RPKI from a set of TALs and writes Validated
//! ROA Payloads in the enabled output formats. Exit code 0 means valid
//! output was written; any fatal error exits non-zero.

use clap::Parser;
use rpki_rp::config::{Config, OutputFormats};
use rpki_rp::runner;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "rpki-rp")]
#[command(about = "RPKI relying party: validate the global RPKI and emit VRPs", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Path to a TOML configuration file
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// TAL files to load (may be given multiple times)
    #[arg(short, long = "tal")]
    tals: Vec<PathBuf>,

    /// Cache directory for downloaded objects
    #[arg(short = 'd', long)]
    cache_dir: Option<PathBuf>,

    /// Directory the output files are written into
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Write OpenBGPD roa-set output
    #[arg(short = 'B', long)]
    openbgpd: bool,

    /// Write BIRD roa table output
    #[arg(short = 'b', long)]
    bird: bool,

    /// Write CSV output
    #[arg(short = 'c', long)]
    csv: bool,

    /// Write JSON output
    #[arg(short = 'j', long)]
    json: bool,

    /// Disable RRDP and fetch everything over rsync
    #[arg(long)]
    no_rrdp: bool,

    /// Per-repository fetch timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl Cli {
    fn into_config(self) -> Result<Config, rpki_rp::RpkiError> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if !self.tals.is_empty() {
            config.tals = self.tals;
        }
        if let Some(dir) = self.cache_dir {
            config.cache_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if self.openbgpd || self.bird || self.csv || self.json {
            config.formats = OutputFormats {
                openbgpd: self.openbgpd,
                bird: self.bird,
                csv: self.csv,
                json: self.json,
            };
        }
        if self.no_rrdp {
            config.fetch.rrdp = false;
        }
        if let Some(secs) = self.timeout {
            config.fetch.timeout_secs = secs;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("rpki-rp: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runner::run(config).await {
        Ok(stats) if stats.uniqs > 0 => ExitCode::SUCCESS,
        Ok(_) => {
            eprintln!("rpki-rp: no VRPs validated");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("rpki-rp: {e}");
            ExitCode::FAILURE
        }
    }
}
