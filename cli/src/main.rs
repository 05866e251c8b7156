//! Command-line client for the notebook publication and sharing service.
//!
//! Commands:
//! - login: Exchange a username for a bearer token
//! - library: Browse, publish, and copy notebooks in the public library
//! - share: Invite collaborators, answer invites, pull shared notebooks
//! - tags: Inspect and govern tags (changes are admin-only)
//! - watch: Poll presence for a shared notebook
//!
//! Configuration via environment:
//! - NBREPO_URL: Base URL of the server (default: http://localhost:3000)
//! - NBREPO_TOKEN: Bearer token from `nbrepo login`

mod commands;

use clap::{Parser, Subcommand};

use commands::{
    library::LibraryArgs, login::LoginArgs, share::ShareArgs, tags::TagsArgs, watch::WatchArgs,
};

/// Notebook publication and sharing CLI
///
/// Prints JSON by default so scripts can consume it; pass --human for
/// formatted output.
#[derive(Parser)]
#[command(name = "nbrepo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output human-readable formatted text instead of JSON
    #[arg(long, global = true)]
    human: bool,

    /// Server URL
    #[arg(
        long,
        env = "NBREPO_URL",
        default_value = "http://localhost:3000",
        global = true
    )]
    url: String,

    /// Bearer token for authentication
    #[arg(long, env = "NBREPO_TOKEN", global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Obtain a token for a username
    Login(LoginArgs),

    /// Work with the public library
    Library(LibraryArgs),

    /// Share notebooks with collaborators
    Share(ShareArgs),

    /// List or change tags
    Tags(TagsArgs),

    /// Heartbeat a shared notebook and show who else is editing
    Watch(WatchArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let client = match commands::build_client(cli.token.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let base_url = cli.url.trim_end_matches('/');

    let result = match cli.command {
        Commands::Login(args) => commands::login::execute(&client, base_url, cli.human, args).await,
        Commands::Library(args) => {
            commands::library::execute(&client, base_url, cli.human, args).await
        }
        Commands::Share(args) => commands::share::execute(&client, base_url, cli.human, args).await,
        Commands::Tags(args) => commands::tags::execute(&client, base_url, cli.human, args).await,
        Commands::Watch(args) => commands::watch::execute(&client, base_url, cli.human, args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
