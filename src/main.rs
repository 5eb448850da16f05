// This binary is an example of how to use the `flicker_cc` library. A real
// application would feed contours from a camera; here a synthetic light sweeps
// across the frame so the MIDI output can be checked without any video input.
//
// Usage: flicker_cc [settings.yaml]

use std::path::PathBuf;
use std::time::{Duration, Instant};

use flicker_cc::config::Settings;
use flicker_cc::core_modules::blob::{Contour, Point};
use flicker_cc::midi;
use flicker_cc::pipeline::{Frame, FrameDriver};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEMO_FPS: u64 = 30;
const DEMO_SECONDS: u64 = 5;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        error!(err = %e, "flicker_cc failed.");
        std::process::exit(1);
    }
}

async fn run() -> flicker_cc::Result<()> {
    let path = std::env::args().nth(1).map(PathBuf::from);
    let settings = Settings::load(path.as_deref())?;

    match midi::list_ports() {
        Ok(ports) => info!(?ports, "Available MIDI outputs."),
        Err(e) => warn!(err = %e, "Unable to list MIDI outputs."),
    }
    let sink = midi::open_sink(&settings.midi_device)?;
    let mut driver = FrameDriver::new(settings.pipeline_config()?, sink)?;

    let (tx, rx) = mpsc::channel::<Frame>(4);
    tokio::spawn(synthetic_frames(tx));
    let frames = Box::pin(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (frame, rx))
    }));

    let processed = driver.run(frames).await?;
    info!(frames = processed, "Demo complete.");
    Ok(())
}

/// Sends a single square light moving left to right across a 640x480 frame.
async fn synthetic_frames(tx: mpsc::Sender<Frame>) {
    let mut interval = tokio::time::interval(Duration::from_millis(1000 / DEMO_FPS));
    for i in 0..DEMO_FPS * DEMO_SECONDS {
        interval.tick().await;
        let x = 40 + ((i * 12) % 560) as i32;
        let frame = Frame {
            contours: vec![square(x, 240, 12)],
            captured_at: Instant::now(),
        };
        if tx.send(frame).await.is_err() {
            break;
        }
    }
}

fn square(cx: i32, cy: i32, half: i32) -> Contour {
    vec![
        Point::new(cx - half, cy - half),
        Point::new(cx + half, cy - half),
        Point::new(cx + half, cy + half),
        Point::new(cx - half, cy + half),
    ]
}
