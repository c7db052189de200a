//! Command-line interface definition.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// SCPI command prober for Rigol MSO5000 oscilloscopes
#[derive(Debug, Parser)]
#[command(name = "doom", version)]
#[command(about = "💀 DOOM SCPI Toolkit - probe, fuzz and learn Rigol SCPI commands", long_about = None)]
pub struct Cli {
    /// Print what would be sent without querying the instrument
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Also write run logs as CSV
    #[arg(long, global = true)]
    pub csv: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Instrument selection shared by every instrument subcommand
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// Instrument IP address or host name
    #[arg(long, value_name = "ADDR")]
    pub ip: Option<String>,

    /// Use the first USB instrument found
    #[arg(long, conflicts_with = "ip")]
    pub usb: bool,
}

/// Modes
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List all VISA resources
    List,
    /// Query every known command
    Test {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Query the known commands below one namespace (e.g. MATH1)
    Group {
        /// Namespace prefix
        group: String,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Query installed license keys over HTTP
    Licenses {
        /// Instrument IP address
        ip: String,
    },
    /// Retrieve one block of waveform data
    Waveform {
        /// Source channel
        #[arg(default_value = "CHAN1")]
        channel: String,
        /// Export scaled samples to this CSV file
        #[arg(long, value_name = "CSV")]
        output: Option<PathBuf>,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Send random SCPI queries
    Fuzz {
        /// Number of candidates to draw
        #[arg(long)]
        attempts: Option<usize>,
        /// Probe below this namespace instead of the root pool
        #[arg(long)]
        prefix: Option<String>,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Discover new SCPI commands via random probing
    Learn {
        /// Number of candidates to draw
        #[arg(long)]
        attempts: Option<usize>,
        /// Probe below this namespace instead of the root pool
        #[arg(long)]
        prefix: Option<String>,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Discover commands by branching from known command prefixes
    SmartLearn {
        /// Number of candidates to draw
        #[arg(long)]
        attempts: Option<usize>,
        /// Deepest known prefix to branch from
        #[arg(long)]
        depth: Option<usize>,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Probe every word of a wordlist, in order
    Focus {
        /// One subcommand name per line
        #[arg(long, value_name = "FILE")]
        wordlist: PathBuf,
        /// Namespace the words are appended to
        #[arg(long)]
        prefix: Option<String>,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Send one SCPI command, or open an interactive console
    Send {
        /// Command words, joined with spaces
        #[arg(allow_negative_numbers = true)]
        scpi: Vec<String>,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Activate Gehirnwäsche mode
    Pinky {
        /// Stop after this many quotes
        #[arg(long)]
        count: Option<usize>,
    },
}
