//! Atomstore CLI - Inspect and copy stored hypergraphs

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use atomstore_storage::Result;

#[derive(Parser)]
#[command(name = "atomstore")]
#[command(about = "Hypergraph storage endpoints and proxies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count the atoms in a snapshot file, by type
    Stats {
        /// Snapshot file
        file: PathBuf,
        /// Print the counts as JSON
        #[arg(short, long)]
        json: bool,
    },
    /// Copy a snapshot through a write buffer
    Copy {
        /// Source snapshot
        src: PathBuf,
        /// Destination snapshot (created if missing)
        dst: PathBuf,
        /// Write-buffer decay time in seconds
        #[arg(short, long, default_value_t = 1.0)]
        decay: f64,
    },
    /// Open the endpoint described by a JSON record and report on it
    Check {
        /// Endpoint record
        config: PathBuf,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Stats { file, json } => cmd_stats(&file, json),
        Commands::Copy { src, dst, decay } => cmd_copy(&src, &dst, decay),
        Commands::Check { config } => cmd_check(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cmd_stats(file: &Path, json: bool) -> Result<()> {
    let stats = atomstore_cli::stats(file)?;

    if json {
        let report = serde_json::json!({
            "file": file.display().to_string(),
            "atoms": stats.atoms,
            "types": stats.types,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}: {} atoms", file.display(), stats.atoms);
        for (atom_type, count) in &stats.types {
            println!("  {:<24} {}", atom_type, count);
        }
    }
    Ok(())
}

fn cmd_copy(src: &Path, dst: &Path, decay: f64) -> Result<()> {
    let report = atomstore_cli::copy(src, dst, decay)?;
    println!(
        "Copied {} atoms from {} to {} in {:.2?} ({} producer stalls)",
        report.buffer.atoms_written,
        src.display(),
        dst.display(),
        report.elapsed,
        report.buffer.stalls
    );
    Ok(())
}

fn cmd_check(config: &Path) -> Result<()> {
    let report = atomstore_cli::check(config)?;
    println!("✓ {} opened", report.endpoint);
    println!("  connected:    {}", report.connected);
    println!("  capabilities: {}", report.capabilities);
    for line in report.monitor.lines() {
        println!("  {}", line);
    }
    Ok(())
}
