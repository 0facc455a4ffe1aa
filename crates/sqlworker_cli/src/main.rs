//! SQLWorker CLI
//!
//! Command-line front end over the SQLWorker client.
//!
//! # Commands
//!
//! - `exec` - Run SQL and print the last result
//! - `batch` - Run several statements atomically
//! - `export` - Write the database image to a file
//! - `import` - Replace the database with an image file
//! - `delete` - Remove the database file
//! - `info` - Show size and storage facts

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use sqlworker_client::{Client, ClientConfig, Method};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// SQLWorker command-line database tools.
#[derive(Parser)]
#[command(name = "sqlworker")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the database files
    #[arg(global = true, short, long, default_value = ".")]
    root: PathBuf,

    /// Database path inside the root, or `:memory:`
    #[arg(global = true, short, long, default_value = ":memory:")]
    database: String,

    /// Open the database read-only
    #[arg(global = true, long)]
    read_only: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Print results as JSON
    #[arg(global = true, long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Run,
    All,
    Values,
    Get,
}

impl From<MethodArg> for Method {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Run => Method::Run,
            MethodArg::All => Method::All,
            MethodArg::Values => Method::Values,
            MethodArg::Get => Method::Get,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run SQL and print the last result
    Exec {
        /// SQL text; may hold several statements
        sql: String,

        /// Positional parameter (`null`, integer, real, `x'..'` blob, or text)
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// How rows are returned
        #[arg(short, long, value_enum, default_value = "all")]
        method: MethodArg,
    },

    /// Run several statements in one transaction
    Batch {
        /// Statements, one per argument
        #[arg(required = true)]
        statements: Vec<String>,
    },

    /// Write the database image to a file
    Export {
        /// Output file
        output: PathBuf,
    },

    /// Replace the database with an image file
    Import {
        /// SQLite database file to load
        input: PathBuf,
    },

    /// Remove the database file and start empty
    Delete {
        /// Skip the confirmation check
        #[arg(short, long)]
        force: bool,
    },

    /// Show size and storage facts
    Info,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("SQLWorker CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = ClientConfig::new(cli.database.as_str())
        .with_storage_root(&cli.root)
        .with_read_only(cli.read_only)
        .with_verbose(cli.verbose);
    let client = Client::connect(config);

    let outcome = match cli.command {
        Commands::Exec {
            sql,
            params,
            method,
        } => commands::exec::run(&client, &sql, &params, method.into(), cli.json).await,
        Commands::Batch { statements } => {
            commands::batch::run(&client, &statements, cli.json).await
        }
        Commands::Export { output } => commands::export::run(&client, &output).await,
        Commands::Import { input } => commands::import::run(&client, &input).await,
        Commands::Delete { force } => commands::delete::run(&client, force).await,
        Commands::Info => commands::info::run(&client, cli.json).await,
        Commands::Version => Ok(()),
    };

    client.destroy();
    outcome
}
