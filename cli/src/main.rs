mod bot;

use std::error::Error;
use std::path::PathBuf;

use bglab_core::room_id::{RoomId, ROOM_ID_ALPHABET, ROOM_ID_LEN};
use bglab_core::{layout_by_slug, ConflictPolicy, WireFormat, LAYOUT_CATALOG};
use bglab_relay::RelayConfig;
use clap::{Args, Parser, Subcommand};
use rand::Rng;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "bglab-cli", version, about = "Relay server and room tools for bglab")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the websocket relay.
    Serve(ServeArgs),
    Rooms {
        #[command(subcommand)]
        command: RoomCommand,
    },
    Bot {
        #[command(subcommand)]
        command: bot::BotCommand,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// JSON relay config; flags below override it.
    #[arg(long, env = "BGLAB_RELAY_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "BGLAB_BIND")]
    bind: Option<String>,
    #[arg(long, env = "BGLAB_PATH_PREFIX")]
    path_prefix: Option<String>,
    #[arg(long, env = "BGLAB_POLICY", value_parser = parse_policy)]
    policy: Option<ConflictPolicy>,
    #[arg(long, env = "BGLAB_LEASE_TIMEOUT_MS")]
    lease_timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
enum RoomCommand {
    /// Prints a fresh room id and its join url.
    New {
        #[arg(long, env = "ROOM_WS_BASE_URL", default_value = "ws://localhost:8787/ws")]
        base_url: String,
        #[arg(long)]
        room_id: Option<String>,
        #[arg(long, value_parser = parse_format)]
        format: Option<WireFormat>,
    },
    /// Lists the built-in board layouts.
    Layouts,
}

#[derive(Args, Clone)]
pub(crate) struct RoomArgs {
    #[arg(long, env = "ROOM_WS_BASE_URL", default_value = "ws://localhost:8787/ws")]
    pub(crate) base_url: String,
    #[arg(long, env = "ROOM_ID")]
    pub(crate) room_id: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    load_env();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let config = relay_config(args)?;
            bglab_relay::serve(config).await?;
        }
        Commands::Rooms { command } => match command {
            RoomCommand::New {
                base_url,
                room_id,
                format,
            } => {
                let room_id = match room_id {
                    Some(id) => RoomId::parse(&id)?,
                    None => generate_room_id()?,
                };
                let join_url = build_join_url(&base_url, &room_id, format)?;
                println!("room_id: {room_id}");
                println!("join_url: {join_url}");
            }
            RoomCommand::Layouts => {
                for slug in LAYOUT_CATALOG {
                    if let Some(layout) = layout_by_slug(slug) {
                        println!(
                            "{slug}: {} pieces, {}x{} frame, grid {}",
                            layout.pieces.len(),
                            layout.frame.width,
                            layout.frame.height,
                            if layout.grid.is_some() { "on" } else { "off" }
                        );
                    }
                }
            }
        },
        Commands::Bot { command } => bot::run(command).await?,
    }

    Ok(())
}

fn load_env() {
    // .env.local is read first so its values win over .env.
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn relay_config(args: ServeArgs) -> Result<RelayConfig, Box<dyn Error>> {
    let mut config = match args.config.as_ref() {
        Some(path) => RelayConfig::load(path)?,
        None => RelayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(prefix) = args.path_prefix {
        config.path_prefix = prefix;
    }
    if let Some(policy) = args.policy {
        config.policy = policy;
    }
    if let Some(timeout) = args.lease_timeout_ms {
        config.lease_timeout_ms = timeout;
    }
    config.normalize()?;
    Ok(config)
}

fn parse_policy(raw: &str) -> Result<ConflictPolicy, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "lww" | "last_writer_wins" | "last-writer-wins" => Ok(ConflictPolicy::LastWriterWins),
        "lease" => Ok(ConflictPolicy::Lease),
        other => Err(format!("unknown policy {other:?}, expected lww or lease")),
    }
}

fn parse_format(raw: &str) -> Result<WireFormat, String> {
    WireFormat::from_query_value(raw)
        .ok_or_else(|| format!("unknown format {raw:?}, expected json or binary"))
}

fn generate_room_id() -> Result<RoomId, Box<dyn Error>> {
    let mut rng = rand::rng();
    let alphabet = ROOM_ID_ALPHABET.as_bytes();
    let mut id = String::with_capacity(ROOM_ID_LEN);
    for _ in 0..ROOM_ID_LEN {
        let idx = rng.random_range(0..alphabet.len());
        id.push(alphabet[idx] as char);
    }
    Ok(RoomId::parse(&id)?)
}

pub(crate) fn build_join_url(
    base_url: &str,
    room_id: &RoomId,
    format: Option<WireFormat>,
) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base_url)?;
    let base_path = url.path().trim_end_matches('/');
    let path = format!("{}/{}", base_path, room_id);
    url.set_path(&path);
    url.set_query(None);
    if let Some(format) = format {
        let value = match format {
            WireFormat::Json => "json",
            WireFormat::Binary => "binary",
        };
        url.query_pairs_mut().append_pair("format", value);
    }
    Ok(url)
}

pub(crate) fn err_msg(message: impl Into<String>) -> Box<dyn Error> {
    message.into().into()
}
