use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, Level};

use racecore::game::{GameConfig, GameService};

mod gateway;
mod store;

#[derive(Clone, Debug)]
struct Config {
    ws_url: String,
    db_path: String,
    seed_path: Option<PathBuf>,
    emoji_correct: String,
    emoji_miss: String,
}

fn usage_and_exit() -> ! {
    eprintln!(
        "racebot (typing-race game bot)\n\n\
USAGE:\n  racebot [--ws URL] [--db PATH]\n\n\
ENV:\n  RACEBOT_WS_URL         default ws://127.0.0.1:4100/v1/json\n  RACEBOT_DB_PATH        default typing_game.db\n  RACEBOT_SEED_PATH      optional; tier<TAB>sentence rows loaded at startup\n  RACEBOT_EMOJI_CORRECT  default \u{2705}\n  RACEBOT_EMOJI_MISS     default \u{274c}\n"
    );
    std::process::exit(2);
}

fn parse_args() -> Config {
    let mut ws_url = std::env::var("RACEBOT_WS_URL")
        .unwrap_or_else(|_| "ws://127.0.0.1:4100/v1/json".to_string());
    let mut db_path =
        std::env::var("RACEBOT_DB_PATH").unwrap_or_else(|_| "typing_game.db".to_string());
    let seed_path = std::env::var("RACEBOT_SEED_PATH").ok().map(PathBuf::from);
    let emoji_correct =
        std::env::var("RACEBOT_EMOJI_CORRECT").unwrap_or_else(|_| "\u{2705}".to_string());
    let emoji_miss =
        std::env::var("RACEBOT_EMOJI_MISS").unwrap_or_else(|_| "\u{274c}".to_string());

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--ws" => ws_url = it.next().unwrap_or_else(|| usage_and_exit()),
            "--db" => db_path = it.next().unwrap_or_else(|| usage_and_exit()),
            "-h" | "--help" => usage_and_exit(),
            _ => usage_and_exit(),
        }
    }

    Config {
        ws_url,
        db_path,
        seed_path,
        emoji_correct,
        emoji_miss,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,racebot=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = parse_args();
    info!(ws_url=%cfg.ws_url, db=%cfg.db_path, "racebot starting");

    let store = Arc::new(store::SqliteStore::open(&cfg.db_path).await?);
    if let Some(seed) = &cfg.seed_path {
        let added = store.seed_from_file(seed).await?;
        info!(added, path=%seed.display(), "sentence seed loaded");
    }

    let (tx, rx) = tokio::sync::mpsc::channel(256);
    let outbox = Arc::new(gateway::WsOutbox::new(
        tx,
        cfg.emoji_correct.clone(),
        cfg.emoji_miss.clone(),
    ));
    let svc = GameService::new(GameConfig::default(), store, outbox);

    tokio::spawn(svc.clone().supervise());

    gateway::run(&cfg.ws_url, svc, rx).await
}
