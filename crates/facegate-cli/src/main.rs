use anyhow::Result;
use clap::{Parser, Subcommand};
use facegate_core::Registration;

mod commands;
mod config;
mod session;

use commands::Context;
use config::Config;

#[derive(Parser)]
#[command(name = "facegate", about = "Face descriptor login and enrollment")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match a captured face against enrolled identities
    Scan {
        /// Capture report JSON file, or `-` for stdin
        #[arg(short, long)]
        capture: String,
    },
    /// Register the pending face under a new identity
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
    },
    /// Discard the pending face without registering it
    Cancel,
    /// List enrolled identities
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the identity signed in for this session
    Whoami,
    /// End the current session
    Logout,
    /// Show configuration and store status
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    tracing::debug!(db = %config.db_path.display(), session = %config.session_dir.display(), "config loaded");

    let ctx = Context::open(config)?;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Scan { capture } => {
            let capture = commands::read_capture(&capture)?;
            commands::scan(&ctx, capture, &mut out)
        }
        Commands::Register { username, email } => {
            commands::register(&ctx, &Registration::new(username, email), &mut out)
        }
        Commands::Cancel => commands::cancel(&ctx, &mut out),
        Commands::List { json } => commands::list(&ctx, json, &mut out),
        Commands::Whoami => commands::whoami(&ctx, &mut out),
        Commands::Logout => commands::logout(&ctx, &mut out),
        Commands::Status => commands::status(&ctx, &mut out),
    }
}
