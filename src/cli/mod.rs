pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "storefront")]
#[command(about = "Storefront CLI - tokens and health checks for the Storefront API")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Mint a signed bearer token using the local JWT settings")]
    Token(commands::token::TokenArgs),

    #[command(about = "Check a running server's /health endpoint")]
    Health(commands::server::ServerArgs),

    #[command(about = "Show the public feature flag map of a running server")]
    Flags(commands::server::ServerArgs),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Token(args) => commands::token::handle(args, output_format),
        Commands::Health(args) => commands::server::health(args, output_format).await,
        Commands::Flags(args) => commands::server::flags(args, output_format).await,
    }
}
