mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{notify::NotifySubcommand, project::ProjectSubcommand, user::UserSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sitedesk",
    about = "Construction back office: projects, tenders, progress tracking and notifications",
    version,
    propagate_version = true
)]
struct Cli {
    /// Data root holding sitedesk.yaml and the database (default: auto-detect)
    #[arg(long, global = true, env = "SITEDESK_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Port to listen on (default: server.port from sitedesk.yaml)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Create or upgrade the database schema
    Migrate,

    /// Manage user accounts
    User {
        #[command(subcommand)]
        subcommand: UserSubcommand,
    },

    /// Send notifications
    Notify {
        #[command(subcommand)]
        subcommand: NotifySubcommand,
    },

    /// Inspect projects
    Project {
        #[command(subcommand)]
        subcommand: ProjectSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Serve { port } => cmd::serve::run(&root, port),
        Commands::Migrate => cmd::migrate::run(&root, cli.json),
        Commands::User { subcommand } => cmd::user::run(&root, subcommand, cli.json),
        Commands::Notify { subcommand } => cmd::notify::run(&root, subcommand, cli.json),
        Commands::Project { subcommand } => cmd::project::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
