//! Play a speech clip with lip-sync and print the mouth-shape stream.
//!
//! Usage: `lipsync-play [--config PATH] [--headless] [--no-cues] [--devices] <clip>`

use anyhow::{Context, bail};
use bytes::Bytes;
use concierge_lipsync::audio::{AudioOutput, CpalOutput, HeadlessOutput};
use concierge_lipsync::{
    AvatarAssets, LipSync, LipSyncConfig, LipSyncEvent, MouthShape, RhubarbExtractor,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct Args {
    config: Option<PathBuf>,
    headless: bool,
    no_cues: bool,
    devices: bool,
    clip: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                args.config = Some(it.next().context("--config needs a path")?.into());
            }
            "--headless" => args.headless = true,
            "--no-cues" => args.no_cues = true,
            "--devices" => args.devices = true,
            "--help" | "-h" => {
                println!(
                    "usage: lipsync-play [--config PATH] [--headless] [--no-cues] [--devices] <clip>"
                );
                std::process::exit(0);
            }
            other if other.starts_with('-') => bail!("unknown option {other}"),
            other => args.clip = Some(other.into()),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("concierge_lipsync=info,symphonia=warn")),
        )
        .init();

    let args = parse_args()?;

    if args.devices {
        for name in CpalOutput::list_output_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    let config = match args.config {
        Some(ref path) => LipSyncConfig::from_file(path)?,
        None => {
            let path = LipSyncConfig::default_config_path();
            if path.exists() {
                LipSyncConfig::from_file(&path)?
            } else {
                LipSyncConfig::default()
            }
        }
    };

    let clip_path = args.clip.context("no clip given (see --help)")?;
    let clip = Bytes::from(
        std::fs::read(&clip_path).with_context(|| format!("reading {}", clip_path.display()))?,
    );

    let output: Arc<dyn AudioOutput> = if args.headless {
        Arc::new(HeadlessOutput::new())
    } else {
        Arc::new(CpalOutput::new(&config.audio)?)
    };

    let mut lipsync = LipSync::new(output, config.clone())?;
    if config.cues.enabled && !args.no_cues {
        match RhubarbExtractor::discover(&config.cues) {
            Ok(extractor) => lipsync = lipsync.with_extractor(Arc::new(extractor)),
            Err(e) => warn!("{e}; animating from amplitude only"),
        }
    }

    let assets = AvatarAssets::from_config(&config.avatar);
    let mut state_rx = lipsync.subscribe();
    let mut events = lipsync.subscribe_events();
    let lipsync = Arc::new(lipsync);

    let speaker = Arc::clone(&lipsync);
    let speak = tokio::spawn(async move { speaker.speak(clip).await });

    let mut frames: HashMap<MouthShape, u64> = HashMap::new();
    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                if state.speaking {
                    *frames.entry(state.mouth).or_default() += 1;
                    let frame = assets.render(&state);
                    println!("{:>5} {:?} {}", state.mouth.as_str(), state.driver, frame.mouth);
                }
            }
            event = events.recv() => {
                match event {
                    Ok(LipSyncEvent::SessionEnded { reason, .. }) => {
                        info!(?reason, "playback done");
                        break;
                    }
                    Ok(LipSyncEvent::DriverSwitched { cue_count, .. }) => {
                        info!(cue_count, "using phoneme cues");
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                lipsync.stop();
                break;
            }
        }
    }

    speak.await.context("speak task panicked")??;

    let mut summary: Vec<_> = frames.into_iter().collect();
    summary.sort_by_key(|(shape, _)| shape.band());
    for (shape, count) in summary {
        println!("{shape}: {count} frames");
    }
    Ok(())
}
