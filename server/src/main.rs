use clap::Parser;
use log::{error, info};
use server::network::{Server, ServerConfig};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "3030")]
    port: u16,

    /// Seed for the tile shuffle, for reproducible deals
    #[arg(short, long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = ServerConfig {
        address: format!("{}:{}", args.host, args.port),
        seed: args.seed,
    };

    let server = Server::bind(config).await?;
    let cancel = CancellationToken::new();

    let server_handle = tokio::spawn(server.run(cancel.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down server...");
    cancel.cancel();

    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Server stopped with an error: {}", e),
        Err(e) => error!("Server task failed: {}", e),
    }

    Ok(())
}
