//! Multiwall CLI — inspect wall layout and run scripted walls.
//!
//! Usage:
//!   multiwall partition --total N --sections S   Show grid sections
//!   multiwall classify <CODE>                    Classify a capture failure code
//!   multiwall simulate [OPTIONS] [STEPS]...      Drive a simulated wall
//!   multiwall config                             Print the effective configuration

use clap::{Parser, Subcommand};
use multiwall_common::action::ResetMode;

mod commands;

#[derive(Parser)]
#[command(
    name = "multiwall",
    about = "Multi-instance capture wall orchestrator",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split instances into grid sections
    Partition {
        /// Number of instances
        #[arg(long)]
        total: usize,

        /// Number of sections
        #[arg(long, default_value = "1")]
        sections: usize,
    },

    /// Classify a capture failure code
    Classify {
        /// Raw failure code reported by the capture capability
        #[arg(allow_negative_numbers = true)]
        code: i64,
    },

    /// Run key actions against a simulated wall and print the result
    Simulate {
        /// Number of simulated instances
        #[arg(short, long, default_value = "4")]
        instances: usize,

        /// Reset mode: wall|lock|multi (defaults to the configured mode)
        #[arg(short, long)]
        mode: Option<ResetMode>,

        /// Grid sections (defaults to the configured value)
        #[arg(long)]
        sections: Option<usize>,

        /// Print every wall event as a JSON line
        #[arg(long)]
        events: bool,

        /// Steps such as `lock@2`, `run@0`, `reset-one`, `close@1`
        steps: Vec<String>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    multiwall_common::logging::init_logging(&multiwall_common::config::LoggingConfig {
        level: log_level.to_string(),
        json: false,
        file: None,
    })?;

    match cli.command {
        Commands::Partition { total, sections } => commands::partition::run(total, sections),
        Commands::Classify { code } => commands::classify::run(code),
        Commands::Simulate {
            instances,
            mode,
            sections,
            events,
            steps,
        } => commands::simulate::run(instances, mode, sections, events, steps).await,
        Commands::Config => commands::config::run(),
    }
}
