// Headless scribble participant.
//
// Connects to a coordinator, registers a name, creates or joins a room and
// then follows the game, logging every screen change, notice and render
// request. Name and room are requested again after every reconnect. Inbound
// strokes are replayed onto a raster surface, which can be written out as PNG
// when the game ends. When it is this participant's turn to draw, it picks
// the first offered word and draws nothing.
//
// Usage:
//   scribble [OPTIONS]
//     --config <PATH>        JSON config file (see `ClientConfig`)
//     --server <HOST:PORT>   Coordinator address (default: 127.0.0.1:3000)
//     --name <NAME>          Player name
//     --create               Create a room with default settings
//     --join <CODE>          Join an existing room
//     --dump-canvas <PNG>    Write the canvas here when the game ends
//
// Logging goes through `tracing`; set `RUST_LOG` to override the default
// `scribble=info` filter.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use scribble_client::config::RoomRequest;
use scribble_client::leaderboard;
use scribble_client::phase::View;
use scribble_client::{
    ClientConfig, Effect, GameClient, RasterSurface, Screen, SessionStore, TcpConnector,
};
use scribble_protocol::RoomSettings;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Longest sleep between pumps when nothing is scheduled.
const IDLE_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug)]
struct Options {
    config: ClientConfig,
    dump_canvas: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scribble=info")),
        )
        .init();

    let options = parse_args();
    if let Err(e) = run(options) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(options: Options) -> scribble_client::Result<()> {
    let Options {
        config,
        dump_canvas,
    } = options;
    let surface = RasterSurface::new(config.canvas)?;
    let mut client = GameClient::new(TcpConnector::default(), surface, config);

    let effects = client.start(Instant::now());
    log_effects(client.store(), effects);
    loop {
        let now = Instant::now();
        let effects = client.pump(now);
        let offered = effects.iter().find_map(|e| match e {
            Effect::WordOptions(words) => words.first().cloned(),
            _ => None,
        });
        log_effects(client.store(), effects);

        if let Some(word) = offered.filter(|_| client.store().is_drawer()) {
            info!(%word, "picking word");
            if let Err(e) = client.select_word(&word, now) {
                warn!("could not pick word: {e}");
            }
        }

        match client.store().screen() {
            Screen::GameEnd => {
                if let Some(path) = dump_canvas.as_deref() {
                    client.engine().surface().save_png(path)?;
                    info!(path = %path.display(), "canvas saved");
                }
                for entry in client.store().ranked_leaderboard() {
                    info!(rank = entry.rank, name = entry.name, score = entry.score, "final");
                }
                if let Some(top) = leaderboard::winner(client.store().final_leaderboard()) {
                    info!(name = top.name, score = top.score, "winner");
                }
                client.close();
                return Ok(());
            }
            Screen::Disconnected => {
                return Err(scribble_client::ClientError::ChannelFailed {
                    attempts: client.config().reconnect.max_attempts,
                });
            }
            _ => {}
        }

        let sleep = client
            .next_wakeup()
            .map(|at| at.saturating_duration_since(Instant::now()))
            .map_or(IDLE_INTERVAL, |d| d.min(IDLE_INTERVAL));
        thread::sleep(sleep);
    }
}

fn log_effects(store: &SessionStore, effects: Vec<Effect>) {
    for effect in effects {
        match effect {
            Effect::Screen(screen) => info!(?screen, "screen"),
            Effect::Notice(text) => warn!("{text}"),
            Effect::WordOptions(words) => info!(?words, "word options"),
            Effect::Render(View::GameHeader) => info!(
                drawer = store.drawer_name().unwrap_or("unknown"),
                round = store.game().map_or(0, |g| g.current_round),
                "round"
            ),
            Effect::Render(view) => tracing::debug!(?view, "render"),
            Effect::ReinitSurface | Effect::ClearSurface => {}
        }
    }
}

/// Parse command-line arguments. Uses simple `std::env::args()` matching,
/// no clap dependency.
fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().collect();

    // Config file first, so flags override it wherever they appear.
    let mut config = match args.iter().position(|a| a == "--config") {
        Some(at) => {
            let path = args.get(at + 1).unwrap_or_else(|| {
                eprintln!("--config requires a path");
                std::process::exit(1);
            });
            ClientConfig::load(Path::new(path)).unwrap_or_else(|e| {
                eprintln!("{e}");
                std::process::exit(1);
            })
        }
        None => ClientConfig::default(),
    };
    let mut dump_canvas = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
            }
            "--server" => {
                i += 1;
                config.endpoint = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--server requires an address");
                    std::process::exit(1);
                });
            }
            "--name" => {
                i += 1;
                config.player_name = args.get(i).cloned().or_else(|| {
                    eprintln!("--name requires a value");
                    std::process::exit(1);
                });
            }
            "--create" => config.room = Some(RoomRequest::Create(RoomSettings::default())),
            "--join" => {
                i += 1;
                config.room = Some(RoomRequest::Join(args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--join requires a room code");
                    std::process::exit(1);
                })));
            }
            "--dump-canvas" => {
                i += 1;
                dump_canvas = args.get(i).map(PathBuf::from).or_else(|| {
                    eprintln!("--dump-canvas requires a path");
                    std::process::exit(1);
                });
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    if config.player_name.is_none() {
        eprintln!("a player name is required (--name or player_name in the config file)");
        std::process::exit(1);
    }
    if let Err(e) = config.check() {
        eprintln!("{e}");
        std::process::exit(1);
    }

    Options {
        config,
        dump_canvas,
    }
}

fn print_usage() {
    println!("Usage: scribble [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config <PATH>        JSON config file");
    println!("  --server <HOST:PORT>   Coordinator address (default: 127.0.0.1:3000)");
    println!("  --name <NAME>          Player name");
    println!("  --create               Create a room with default settings");
    println!("  --join <CODE>          Join an existing room");
    println!("  --dump-canvas <PNG>    Write the canvas here when the game ends");
    println!("  --help, -h             Show this help");
}
