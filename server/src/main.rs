use clap::Parser;
use log::info;
use server::network::{Server, ServerConfig};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "4444")]
    port: u16,

    /// Directory receiving one sub-directory per session
    #[arg(short, long, default_value = "Monitorization")]
    root: PathBuf,

    /// Additional directory receiving a copy of every session log (repeatable)
    #[arg(short, long)]
    mirror: Vec<PathBuf>,

    /// Seconds a read may block before the connection is dropped
    #[arg(long, default_value = "300")]
    read_timeout: u64,

    /// Socket read buffer size in bytes
    #[arg(long, default_value = "8192")]
    buffer_size: usize,

    /// Bytes a single message may reach before it is dropped
    #[arg(long, default_value = "1048576")]
    max_message_size: usize,
}

/// Parses command-line arguments, then runs the accept loop until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for connection logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        addr: format!("{}:{}", args.host, args.port),
        root: args.root,
        mirrors: args.mirror,
        read_timeout: Duration::from_secs(args.read_timeout),
        buffer_size: args.buffer_size,
        max_message_size: args.max_message_size,
    };

    let server = Server::bind(config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let run = server.run(shutdown_rx);
    tokio::pin!(run);

    tokio::select! {
        _ = &mut run => return Ok(()),
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            let _ = shutdown_tx.send(true);
        }
    }

    // Let the active connection close its logs.
    run.await;
    Ok(())
}
