mod config;
mod shell;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{GameSession, HttpTransport, SessionError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::shell::Command;

/// Text desk for the portfolio-management sim.
#[derive(Parser, Debug)]
struct Args {
    /// Simulation server, e.g. http://127.0.0.1:5000
    #[arg(long)]
    server_url: Option<String>,
    /// Settings file; defaults to ./desk.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = config::load_settings(args.config.as_deref())?;
    if let Some(url) = args.server_url.as_deref() {
        settings.server_url = config::normalize_server_url(url)?;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let transport = HttpTransport::new(&settings.server_url, settings.request_timeout())
        .with_context(|| format!("cannot reach '{}'", settings.server_url))?;
    let session = GameSession::new(Arc::new(transport));
    info!(server_url = %settings.server_url, "desk: session ready");

    let mut stream = BroadcastStream::new(session.subscribe_events());
    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            match event {
                Ok(event) => {
                    if let Some(line) = shell::describe_event(&event) {
                        println!("{line}");
                    }
                }
                Err(err) => warn!(error = %err, "desk: event printer fell behind"),
            }
        }
    });

    match session.load_state().await {
        Ok(snapshot) => println!("{}", shell::render_desk(&snapshot)),
        Err(err) => warn!(error = %err, "desk: initial state load failed"),
    }
    println!("type `help` for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match shell::parse_command(&line) {
            Ok(command) => command,
            Err(err) => {
                println!("{err:#}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if let Err(err) = shell::execute(&session, command).await {
            let noticed = err
                .downcast_ref::<SessionError>()
                .is_some_and(shell::already_noticed);
            if !noticed {
                println!("{err:#}");
            }
        }
    }

    info!("desk: bye");
    Ok(())
}
