use clap::Parser;
use log::{error, info};
use server::config::{GameConfig, RestartPolicy};
use server::network::Server;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Physics ticks per second
    #[arg(short, long, default_value_t = shared::TICK_RATE)]
    tick_rate: u32,

    /// Snapshot broadcasts per second
    #[arg(short, long, default_value_t = shared::BROADCAST_RATE)]
    broadcast_rate: u32,

    /// Eligible players needed before a countdown can start
    #[arg(long, default_value_t = shared::MIN_PLAYERS)]
    min_players: usize,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "256")]
    max_clients: usize,

    /// Countdown length in milliseconds
    #[arg(long, default_value_t = shared::COUNTDOWN_MS)]
    countdown_ms: u64,

    /// Game over screen length in milliseconds
    #[arg(long, default_value_t = shared::GAMEOVER_MS)]
    gameover_ms: u64,

    /// Round time limit in milliseconds, 0 disables it
    #[arg(long, default_value_t = shared::ROUND_TIMEOUT_MS)]
    round_timeout_ms: u64,

    /// Honor restart requests outside game over
    #[arg(long)]
    restart_any_state: bool,

    /// Restart straight into a countdown instead of the lobby
    #[arg(long)]
    restart_skip_lobby: bool,

    /// Fixed seed for course generation
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn game_config(&self) -> GameConfig {
        GameConfig {
            tick_rate: self.tick_rate,
            broadcast_rate: self.broadcast_rate,
            min_players: self.min_players,
            max_clients: self.max_clients,
            countdown: Duration::from_millis(self.countdown_ms),
            gameover: Duration::from_millis(self.gameover_ms),
            round_timeout: (self.round_timeout_ms > 0)
                .then(|| Duration::from_millis(self.round_timeout_ms)),
            restart: RestartPolicy {
                from_any_state: self.restart_any_state,
                skip_lobby: self.restart_skip_lobby,
            },
            seed: self.seed,
            ..GameConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.game_config();

    info!(
        "Starting server: {}Hz physics, {}Hz snapshots, {} players to start",
        config.tick_rate, config.broadcast_rate, config.min_players
    );

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}
