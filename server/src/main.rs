use clap::Parser;
use log::{error, info};
use server::network::{Server, ServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind both channels to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Reliable channel (TCP) port
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Snapshot channel (UDP) port
    #[arg(short, long, default_value = "8081")]
    udp_port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "50")]
    fps: u32,

    /// Maximum number of concurrent players
    #[arg(short, long, default_value = "16")]
    max_clients: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ServerConfig {
        host: args.host,
        tcp_port: args.port,
        udp_port: args.udp_port,
        fps: args.fps,
        max_clients: args.max_clients,
    };

    info!(
        "Starting server on {} (tcp {}, udp {}), {} ticks per second, up to {} players",
        config.host, config.tcp_port, config.udp_port, config.fps, config.max_clients
    );

    let mut server = Server::bind(&config).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received");
                shutdown.shutdown();
            }
            Err(e) => error!("Failed to listen for interrupt: {}", e),
        }
    });

    server.run().await?;
    info!("Server stopped");
    Ok(())
}
