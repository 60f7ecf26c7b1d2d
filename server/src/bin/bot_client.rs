//! Headless bot that joins a room, readies up and tries to fly the course.
//!
//! Useful as a second player during development and for smoke testing a
//! deployed server.

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use shared::{ClientId, ClientMessage, Course, LifecycleState, PlayerView, ServerMessage};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Room to join
    #[arg(short, long, default_value = "lobby")]
    room: String,

    /// Display name
    #[arg(short, long, default_value = "bot")]
    name: String,

    /// Distance below the gap center at which the bot flaps
    #[arg(long, default_value = "12.0")]
    slack: f32,
}

/// Flap when falling and below the center of the next gap.
fn should_flap(player: &PlayerView, course: &Course, slack: f32) -> bool {
    let target = match course.next_pipe(player.x) {
        Some(pipe) => pipe.gap_center(),
        None => shared::START_Y,
    };
    player.vy >= 0.0 && player.y > target + slack
}

fn frame(message: &ClientMessage) -> Result<Message, serde_json::Error> {
    serde_json::to_string(message).map(Message::Text)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let url = format!("ws://{}", args.server);

    info!("Connecting to {}", url);
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();

    write
        .send(frame(&ClientMessage::Join {
            room_id: args.room.clone().into(),
            name: args.name.clone().into(),
        })?)
        .await?;

    let mut my_id: Option<ClientId> = None;
    let mut last_state: Option<LifecycleState> = None;

    while let Some(incoming) = read.next().await {
        let text = match incoming? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let message: ServerMessage = match serde_json::from_str(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Unreadable server message: {}", e);
                continue;
            }
        };

        match message {
            ServerMessage::Joined { id, room_id } => {
                info!("Joined room {} as player {}", room_id, id);
                my_id = Some(id);
            }
            ServerMessage::Error { message } => warn!("Server error: {}", message),
            ServerMessage::Rooms { rooms } => debug!("{} rooms open", rooms.len()),
            ServerMessage::State(snapshot) => {
                if last_state != Some(snapshot.state) {
                    info!("Room is now {}", snapshot.state);
                    if let (LifecycleState::Gameover, Some(winner)) =
                        (snapshot.state, snapshot.winner_id)
                    {
                        let name = snapshot
                            .player(winner)
                            .map(|p| p.name.as_str())
                            .unwrap_or("?");
                        info!("Winner: {} ({})", name, winner);
                    }
                    last_state = Some(snapshot.state);
                }

                let Some(me) = my_id.and_then(|id| snapshot.player(id)) else {
                    continue;
                };

                match snapshot.state {
                    LifecycleState::Lobby if !me.ready && !me.spectator => {
                        write.send(frame(&ClientMessage::Ready { ready: true })?).await?;
                    }
                    LifecycleState::Playing if !me.spectator => {
                        if let Some(course) = &snapshot.course {
                            if should_flap(me, course, args.slack) {
                                write.send(frame(&ClientMessage::Flap)?).await?;
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    info!("Connection closed");
    Ok(())
}
