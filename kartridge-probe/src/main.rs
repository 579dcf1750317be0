//! Headless Kartridge session driver.
//!
//! Usage:
//!   kartridge-probe --game-id 264055 --frames 600
//!   kartridge-probe --mock --stat HighScore=9000 --stat Deaths=3
//!
//! Runs the same sequence a game would: restart check, initialize, one
//! `update` per frame until the frame budget runs out or Ctrl-C, stat
//! submission, shutdown. Each event is printed as a JSON line on stdout,
//! followed by the final snapshot.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use kartridge_core::config::{self, BridgeConfig};
use kartridge_core::{KartridgeLibrary, KongregateApi, MockKongregate, Session, Step};
use tokio::time::MissedTickBehavior;

#[derive(Parser, Debug)]
#[command(name = "kartridge-probe", about = "Drive a Kartridge SDK session from the command line")]
struct Args {
    /// Config file (default: <config dir>/kartridge/bridge.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Vendor library to load, overriding the config
    #[arg(long, env = "KARTRIDGE_LIBRARY")]
    library: Option<PathBuf>,

    /// Use the scripted in-process SDK instead of the vendor library
    #[arg(long)]
    mock: bool,

    /// Game id for the restart check (falls back to config, then kong_gameid.txt)
    #[arg(long)]
    game_id: Option<u32>,

    /// Initialization settings as a JSON object, overriding the config
    #[arg(long)]
    settings: Option<String>,

    /// Frames to poll; 0 polls until Ctrl-C
    #[arg(long, default_value_t = 300)]
    frames: u64,

    /// Milliseconds between polls
    #[arg(long, default_value_t = 16)]
    frame_ms: u64,

    /// Stat to submit before shutdown, as name=value (repeatable)
    #[arg(long = "stat", value_parser = parse_stat)]
    stats: Vec<(String, i64)>,

    /// Log filter, overriding RUST_LOG and the config
    #[arg(long)]
    log: Option<String>,

    /// JSON log lines
    #[arg(long)]
    log_json: bool,
}

fn parse_stat(s: &str) -> Result<(String, i64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {s:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("stat name is empty".to_string());
    }
    let value = value
        .trim()
        .parse()
        .map_err(|e| format!("bad value for stat {name}: {e}"))?;
    Ok((name.to_string(), value))
}

/// A short session: connect, guest, sign in, token, ready.
fn scripted_vendor() -> MockKongregate {
    let mock = MockKongregate::new();
    mock.on_update([Step::Connect])
        .on_update([Step::Guest])
        .on_update([
            Step::SignIn {
                user_id: 1,
                username: "probe".to_string(),
            },
            Step::AuthToken("probe-token".to_string()),
        ])
        .on_update([Step::Ready]);
    mock
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::load_default(),
    };
    let filter = args.log.clone().or_else(|| config.log_filter.clone());
    kartridge_core::logging::init_logging(
        filter.as_deref(),
        args.log_json || config.log_json.unwrap_or(false),
    )?;

    let api: Box<dyn KongregateApi> = if args.mock {
        tracing::info!("using scripted SDK");
        Box::new(scripted_vendor())
    } else {
        let path = args.library.clone().unwrap_or_else(|| config.library_path());
        let library = KartridgeLibrary::open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        tracing::info!("loaded {}", library.path().display());
        Box::new(library)
    };
    let mut session = Session::new(api);

    let game_id = match args.game_id.or(config.game_id) {
        Some(id) => Some(id),
        None => config::local_game_id(&std::env::current_dir()?)?,
    };
    match game_id {
        Some(id) if session.restart_with_kartridge_if_needed(id) => {
            println!("Kartridge is relaunching the game; exiting");
            return Ok(());
        }
        Some(_) => {}
        None => tracing::warn!("no game id configured, skipping restart check"),
    }

    let settings = match args.settings {
        Some(s) => Some(s),
        None => config.settings_json()?,
    };

    session.set_event_handler(|event| match serde_json::to_string(&event) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::error!("can't serialize event: {e}"),
    });

    if !session.initialize(settings.as_deref()) {
        tracing::warn!("not launched from Kartridge; polling offline");
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(args.frame_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut frame = 0u64;
    while args.frames == 0 || frame < args.frames {
        tokio::select! {
            _ = ticker.tick() => {
                session.update();
                frame += 1;
            }
            _ = &mut ctrl_c => {
                tracing::info!(frame, "interrupted");
                break;
            }
        }
    }

    for (name, value) in &args.stats {
        tracing::info!(%name, value, "submitting stat");
        session.submit(name, *value);
    }

    println!(
        "{}",
        serde_json::json!({ "state": session.state(), "snapshot": session.snapshot() })
    );
    session.shutdown();
    Ok(())
}
