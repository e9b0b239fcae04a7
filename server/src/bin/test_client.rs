use clap::Parser;
use shared::{EventKind, GameStateSnapshot, TelemetryEvent, Vec3};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::sleep;

/// Streams one short static game to a running server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:4444")]
    addr: String,

    /// Participant name sent in the registration
    #[arg(short, long, default_value = "test_client")]
    user: String,

    /// Pause between messages in milliseconds
    #[arg(short, long, default_value = "200")]
    delay_ms: u64,
}

fn sample_game(user: &str) -> Vec<TelemetryEvent> {
    let mut events = vec![
        TelemetryEvent::registration(user),
        TelemetryEvent::new(EventKind::Static),
        TelemetryEvent::new(EventKind::Line).with_line(vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::new(1.0, 0.0, 10.0),
        ]),
        TelemetryEvent::new(EventKind::Goal).with_position(Vec3::new(0.0, 0.0, 4.0)),
        TelemetryEvent::new(EventKind::StopObject).with_position(Vec3::new(0.8, 0.0, 8.0)),
    ];

    // Walk along the line, passing the checkpoint and then the stop sign.
    for step in 0..=10 {
        let z = step as f64;
        events.push(TelemetryEvent::new(EventKind::Camera).with_position(Vec3::new(z / 10.0, 1.5, z)));
        if step == 4 {
            events.push(
                TelemetryEvent::new(EventKind::Checkpoint)
                    .with_position(Vec3::new(0.0, 0.0, z))
                    .with_game_state(GameStateSnapshot {
                        score: 400.0,
                        num_checkpoints: 1.0,
                        minutes: 0.0,
                        seconds: 12.0,
                    }),
            );
        }
        if step == 8 {
            events.push(TelemetryEvent::new(EventKind::StopSucc));
        }
    }

    events.push(
        TelemetryEvent::new(EventKind::End)
            .with_user(user)
            .with_game_state(GameStateSnapshot {
                score: 750.0,
                num_checkpoints: 1.0,
                minutes: 0.0,
                seconds: 31.0,
            }),
    );
    events
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut stream = TcpStream::connect(&args.addr).await?;
    println!("Connected to {} as {}", args.addr, args.user);

    let events = sample_game(&args.user);
    for event in &events {
        let message = event.to_wire()?;
        stream.write_all(message.as_bytes()).await?;
        println!("Sent {:?} ({} bytes)", event.kind, message.len());
        sleep(Duration::from_millis(args.delay_ms)).await;
    }

    stream.shutdown().await?;
    println!("Test client finished after {} messages", events.len());
    Ok(())
}
