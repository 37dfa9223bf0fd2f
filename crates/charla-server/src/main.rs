mod game;
mod handler;
mod invites;
mod presence;
mod router;
mod session;

use anyhow::{Context, Result};
use charla_store::ChatStore;
use clap::Parser;
use session::{ServerState, serve_connection};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(author, version, about = "charla chat server")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Path to the SQLite database.
    #[arg(long, default_value = "chat.db")]
    db: PathBuf,

    /// Free messages granted to unauthenticated sessions.
    #[arg(long, default_value_t = 3)]
    free_messages: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "charla_server=info,charla_store=info".into()),
        )
        .init();

    let args = Args::parse();

    let store = ChatStore::open(Some(&args.db))
        .with_context(|| format!("failed to open database {}", args.db.display()))?;
    let state = ServerState::new(store, args.free_messages);

    let listener = TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    tracing::info!(addr = %args.listen, "listening");

    tokio::select! {
        result = accept_loop(listener, state) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
    }
    Ok(())
}

async fn accept_loop(listener: TcpListener, state: Arc<ServerState>) -> Result<()> {
    loop {
        let (socket, peer) = listener.accept().await.context("accept failed")?;
        tracing::debug!(peer = %peer, "incoming connection");
        tokio::spawn(serve_connection(state.clone(), socket));
    }
}
