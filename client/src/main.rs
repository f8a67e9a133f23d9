use clap::Parser;
use client::config::{ClientConfig, DEFAULT_SERVER_URL};
use client::input::AutoPlayer;
use client::network::{Session, SessionEnd};
use log::{info, warn};
use shared::messages::{AccountId, Credentials};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server url to connect to
    #[arg(short = 's', long, default_value = DEFAULT_SERVER_URL)]
    server: String,

    /// Give up connecting after this many milliseconds
    #[arg(short = 't', long, default_value = "5000")]
    connect_timeout: u64,

    /// Input polling interval in milliseconds
    #[arg(short = 'f', long, default_value = "16")]
    frame_ms: u64,

    /// Account id to log into, needs --token
    #[arg(long, requires = "token")]
    account: Option<u64>,

    /// Login token of --account
    #[arg(long, requires = "account")]
    token: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let mut config = ClientConfig::new(args.server)
        .with_connect_timeout(Duration::from_millis(args.connect_timeout))
        .with_frame_interval(Duration::from_millis(args.frame_ms));
    if let (Some(id), Some(token)) = (args.account, args.token) {
        config = config.with_credentials(Credentials {
            id: AccountId::new(id),
            token,
        });
    }

    info!("Starting client...");
    let mut session: Session = Session::connect(config).await?;
    if let Some(credentials) = &session.account().credentials {
        info!(
            "Playing as account {} (token {})",
            credentials.id.raw(),
            credentials.token
        );
    }

    let cancel = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, leaving match");
            cancel.cancel();
        }
    });

    match session.run(&mut AutoPlayer::new()).await? {
        SessionEnd::MatchEnded { winner: Some(winner) } => info!("Match over, {:?} won", winner),
        SessionEnd::MatchEnded { winner: None } => info!("Match over, no winner"),
        SessionEnd::Canceled => warn!("Match abandoned"),
    }

    Ok(())
}
