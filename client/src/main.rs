use clap::Parser;
use client::input::InputMode;
use client::network::{Client, SessionEnd};
use log::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Reliable channel (TCP) address of the server
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Snapshot channel (UDP) address of the server
    #[arg(short = 'd', long, default_value = "127.0.0.1:8081")]
    datagram: String,

    /// Hold random keys instead of standing still
    #[arg(short = 'w', long)]
    wander: bool,

    /// Milliseconds between two random key picks
    #[arg(long, default_value = "500")]
    wander_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mode = if args.wander {
        InputMode::Wander {
            period_ms: args.wander_ms.max(1),
        }
    } else {
        InputMode::Idle
    };

    info!("Starting client...");
    info!("Connecting to: {} (snapshots via {})", args.server, args.datagram);

    let mut client = Client::connect(&args.server, &args.datagram, mode).await?;

    let stop = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for interrupt: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match client.run_until(stop).await? {
        SessionEnd::Rejected(reason) => {
            error!("Could not join: {}", reason);
            std::process::exit(1);
        }
        end => info!("Session ended: {:?}", end),
    }
    Ok(())
}
