// SPDX-License-Identifier: MIT

//! `meshctl` (§7.3): a thin admin CLI over the PMD control protocol —
//! `status`, `list`, `resolve`, `kill`. Out of the runtime's core scope
//! (§1), but real enough to exercise the PMD from outside a node process.

mod commands;
mod output;


use clap::{Parser, Subcommand};
use meshnode_pmd::env;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "meshctl", about = "Admin CLI for the mesh port mapper daemon")]
struct Cli {
    /// PMD host to connect to.
    #[arg(long, default_value = "127.0.0.1", global = true)]
    host: String,

    /// PMD control port.
    #[arg(long, default_value_t = env::DEFAULT_PORT, global = true)]
    port: u16,

    /// Output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report whether the PMD is reachable and how many nodes it knows about.
    Status,
    /// List every node currently registered with the PMD.
    List,
    /// Resolve an alias or NodeID to its host/port.
    Resolve {
        /// Alias or NodeID to resolve.
        target: String,
    },
    /// Force-unregister a node from the PMD.
    Kill {
        /// Alias or NodeID to evict.
        target: String,
    },
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Status => commands::status::handle(&cli.host, cli.port, cli.output).await,
        Command::List => commands::list::handle(&cli.host, cli.port, cli.output).await,
        Command::Resolve { target } => commands::resolve::handle(&cli.host, cli.port, target, cli.output).await,
        Command::Kill { target } => commands::kill::handle(&cli.host, cli.port, target, cli.output).await,
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::ExitCode::FAILURE
        }
    }
}
