//! Codebook — headless edit recorder.
//!
//! Replays editor notification scripts through `codebook-capture` and
//! inspects the resulting store. Logging goes through `env_logger`; set
//! `RUST_LOG=debug` to see every flush and probe fallback.

mod inspect;
mod script;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codebook_capture::{FileStore, Recorder, RecorderConfig};
use codebook_core::{identity_of, Granularity};
use log::info;

#[derive(Parser)]
#[command(name = "codebook")]
#[command(about = "Record and inspect per-document edit histories", long_about = None)]
struct Cli {
    /// Storage directory [default: ~/codebook]
    #[arg(long, global = true, env = "CODEBOOK_ROOT")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON Lines notification script ("-" reads stdin)
    Replay {
        script: String,

        /// Events between flushes; 0 flushes on close only
        #[arg(long)]
        flush_threshold: Option<usize>,

        /// Diff granularity: char or line
        #[arg(long)]
        granularity: Option<Granularity>,
    },
    /// Print the document identity for a path
    Id { path: String },
    /// Print the stored header and events for a path
    Show { path: String },
    /// List every stored document
    List,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = RecorderConfig::default();
    if let Some(root) = cli.root {
        config.root = root;
    }

    match cli.command {
        Commands::Replay {
            script,
            flush_threshold,
            granularity,
        } => {
            if let Some(n) = flush_threshold {
                config.flush_threshold = n;
            }
            if let Some(g) = granularity {
                config.granularity = g;
            }
            let recorder = Recorder::open(config).context("Failed to open recorder")?;

            let summary = if script == "-" {
                script::replay(&recorder, io::stdin().lock())?
            } else {
                let file = File::open(&script)
                    .with_context(|| format!("Failed to open script {script}"))?;
                script::replay(&recorder, BufReader::new(file))?
            };
            info!("Replay of {script} finished");
            println!("{summary}");
        }
        Commands::Id { path } => println!("{}", identity_of(&path)),
        Commands::Show { path } => {
            let store = FileStore::open(&config.root)?;
            inspect::show(&store, &path, &mut io::stdout().lock())?;
        }
        Commands::List => {
            let store = FileStore::open(&config.root)?;
            inspect::list(&store, &mut io::stdout().lock())?;
        }
    }

    Ok(())
}
