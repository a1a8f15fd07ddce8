//! Floe CLI: Attach the lake and stream records into it.

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use floe::{
    CliArgs, Command, Config, init_tracing, run_attach, run_query, run_snapshots,
    spawn_shutdown_handler,
};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();
    let path = args.config_path();

    info!("Loading config from {}", path.display());

    let config = match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    spawn_shutdown_handler(shutdown.clone());

    let result = match &args.command {
        Command::Attach { .. } => run_attach(&config, shutdown).await.map(|stats| {
            info!(
                "Ingested {} row(s) in {} insert(s)",
                stats.rows_inserted, stats.inserts
            );
        }),
        Command::Query { sql, .. } => run_query(&config, sql, shutdown)
            .await
            .map(|result| println!("{result}")),
        Command::Snapshots { table, change, .. } => {
            run_snapshots(&config, table.as_deref(), *change, shutdown)
                .await
                .map(|inspection| match inspection {
                    Some(found) => {
                        println!("Snapshot {} recorded {}", found.snapshot, found.change);
                        match (found.previous, found.before) {
                            (Some(previous), Some(before)) => {
                                println!("Table at snapshot {previous}:\n{before}")
                            }
                            _ => println!("No earlier snapshot in the searched window"),
                        }
                    }
                    None => println!("No recent snapshot recorded {change}"),
                })
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("floe failed: {e}");
            ExitCode::FAILURE
        }
    }
}
