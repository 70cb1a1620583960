//! # Estate Harness CLI (`estate`)
//!
//! ## Usage
//!
//! ```bash
//! estate --config ./config/estate.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `estate init` | Create the SQLite database and run schema migrations |
//! | `estate user add` | Create a master or client account |
//! | `estate import file <path>` | Import a feed file from disk |
//! | `estate import url <url> --portal <p>` | Fetch and import a remote feed |
//! | `estate import sweep` | Import every active configured feed once |
//! | `estate get <portal> <code>` | Show a stored listing |
//! | `estate serve` | Start the HTTP API (and the scheduler when enabled) |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use estate_harness::{config, get, import, logging, migrate, schedule, server, users};
use estate_harness_core::{Portal, Role};

/// Estate Harness CLI: real-estate portal feed importer.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/estate.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "estate",
    about = "Estate Harness: import real-estate portal XML feeds into SQLite",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/estate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Manage accounts.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Import listings from a feed.
    Import {
        #[command(subcommand)]
        action: ImportAction,
    },

    /// Show a stored listing by portal and source code.
    Get {
        /// `chavesnamao` / `portalA` or `canalpro` / `portalB`.
        portal: Portal,
        /// The listing's source code in that portal's feed.
        code: String,
    },

    /// Start the HTTP API server.
    ///
    /// Also starts the scheduled feed sweep when `import.scheduler_enabled`
    /// is set.
    Serve,
}

#[derive(Subcommand)]
enum UserAction {
    /// Create an account.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// `master` or `client`.
        #[arg(long, default_value = "client")]
        role: Role,
        /// Client reference matched against listing source codes.
        #[arg(long)]
        reference: Option<String>,
    },
}

#[derive(Subcommand)]
enum ImportAction {
    /// Import a feed file. The portal is detected unless given.
    File {
        path: PathBuf,
        #[arg(long)]
        portal: Option<Portal>,
    },
    /// Fetch a feed over HTTP and import it with the given portal's mapper.
    Url {
        url: String,
        #[arg(long)]
        portal: Portal,
    },
    /// Import every active `[[feeds]]` entry once.
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::User { action } => match action {
            UserAction::Add {
                name,
                email,
                password,
                role,
                reference,
            } => {
                let new = users::NewUser {
                    name,
                    email,
                    password,
                    role,
                    client_reference: reference,
                };
                users::run_user_add(&cfg, &new).await?;
            }
        },
        Commands::Import { action } => match action {
            ImportAction::File { path, portal } => {
                import::run_import_file(&cfg, &path, portal).await?;
            }
            ImportAction::Url { url, portal } => {
                import::run_import_url(&cfg, &url, portal).await?;
            }
            ImportAction::Sweep => {
                schedule::run_sweep(&cfg).await?;
            }
        },
        Commands::Get { portal, code } => {
            get::run_get(&cfg, portal, &code).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
