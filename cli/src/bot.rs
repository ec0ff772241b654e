use std::error::Error;
use std::path::PathBuf;
use std::rc::Rc;

use bglab::{ChannelTransport, Clock, RoomClient, SyncConfig, SystemClock, Transport};
use bglab_core::{
    compute_scale, decode_server, encode_client, layout_by_slug, BoardLayout, PieceId, Point,
    ReferenceFrame, RoomId, ScreenPoint, ServerMsg, Viewport, WireFormat, WireFrame,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::{build_join_url, err_msg, parse_format, RoomArgs};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

#[derive(clap::Subcommand)]
pub(crate) enum BotCommand {
    /// Joins a room and drags random pieces until the duration runs out.
    Run {
        #[command(flatten)]
        room: RoomArgs,
        #[arg(long, default_value = "bot")]
        name: String,
        #[arg(long, default_value = "light-road")]
        layout: String,
        /// JSON sync config for intervals and wire format.
        #[arg(long, env = "BGLAB_SYNC_CONFIG")]
        config: Option<PathBuf>,
        #[arg(long, value_parser = parse_format)]
        format: Option<WireFormat>,
        #[arg(long, default_value_t = 30)]
        duration_secs: u64,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value_t = 1280.0)]
        viewport_width: f32,
        #[arg(long, default_value_t = 720.0)]
        viewport_height: f32,
        #[arg(long, default_value_t = 300)]
        think_min_ms: u64,
        #[arg(long, default_value_t = 1500)]
        think_max_ms: u64,
        #[arg(long, default_value_t = 250)]
        drag_min_ms: u64,
        #[arg(long, default_value_t = 1200)]
        drag_max_ms: u64,
        #[arg(long, default_value_t = 16)]
        tick_ms: u64,
        #[arg(long, default_value_t = 0.0)]
        reset_rate: f32,
    },
}

#[derive(Debug, Clone, Copy)]
struct BotRunConfig {
    duration_secs: u64,
    think_min_ms: u64,
    think_max_ms: u64,
    drag_min_ms: u64,
    drag_max_ms: u64,
    tick_ms: u64,
    reset_rate: f32,
}

#[derive(Debug, Default)]
struct BotStats {
    drags: u32,
    refused: u32,
    resets: u32,
    frames_in: u64,
    frames_out: u64,
}

pub(crate) async fn run(command: BotCommand) -> Result<(), Box<dyn Error>> {
    match command {
        BotCommand::Run {
            room,
            name,
            layout,
            config,
            format,
            duration_secs,
            seed,
            viewport_width,
            viewport_height,
            think_min_ms,
            think_max_ms,
            drag_min_ms,
            drag_max_ms,
            tick_ms,
            reset_rate,
        } => {
            let run_config = BotRunConfig {
                duration_secs,
                think_min_ms,
                think_max_ms,
                drag_min_ms,
                drag_max_ms,
                tick_ms,
                reset_rate,
            };
            validate_bot_config(run_config)?;
            let sync = match config.as_ref() {
                Some(path) => SyncConfig::load(path)?,
                None => SyncConfig::default(),
            };
            let format = format.unwrap_or(sync.wire_format);
            let layout = layout_by_slug(&layout)
                .ok_or_else(|| err_msg(format!("unknown layout: {layout}")))?;
            let viewport = fit_viewport(&layout, viewport_width, viewport_height)?;
            let room_id = RoomId::parse(&room.room_id)?;
            let url = build_join_url(&room.base_url, &room_id, Some(format))?;

            let (ws, _response) = connect_async(url.as_str()).await?;
            let (write, read) = ws.split();
            let transport = ChannelTransport::new();
            let clock: Rc<dyn Clock> = Rc::new(SystemClock::new());
            let client = RoomClient::new(
                room_id,
                layout.clone(),
                &sync,
                Rc::new(transport.clone()) as Rc<dyn Transport>,
                clock,
            );
            let mut session = Session {
                client,
                transport,
                write,
                read,
                format,
                viewport,
                frame: layout.frame,
                stats: BotStats::default(),
            };
            let mut rng = StdRng::seed_from_u64(seed.unwrap_or_else(|| rand::rng().random()));
            session.run(&name, &layout, run_config, &mut rng).await
        }
    }
}

fn validate_bot_config(config: BotRunConfig) -> Result<(), Box<dyn Error>> {
    if config.think_min_ms > config.think_max_ms {
        return Err(err_msg("invalid think-time range"));
    }
    if config.drag_min_ms > config.drag_max_ms {
        return Err(err_msg("invalid drag-duration range"));
    }
    if config.tick_ms == 0 {
        return Err(err_msg("tick-ms must be positive"));
    }
    if !(0.0..=1.0).contains(&config.reset_rate) {
        return Err(err_msg("reset-rate must be between 0 and 1"));
    }
    Ok(())
}

/// Centers the scaled reference frame in a simulated window.
fn fit_viewport(layout: &BoardLayout, width: f32, height: f32) -> Result<Viewport, Box<dyn Error>> {
    let frame = layout.frame;
    let scale = compute_scale(&frame, width, height, layout.scale_policy)?;
    let left = (width - frame.width * scale) / 2.0;
    let top = (height - frame.height * scale) / 2.0;
    Ok(Viewport::new(left, top, scale)?)
}

fn lerp_screen(from: ScreenPoint, to: ScreenPoint, t: f32) -> ScreenPoint {
    ScreenPoint::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t)
}

struct Session {
    client: RoomClient,
    transport: ChannelTransport,
    write: WsWrite,
    read: WsRead,
    format: WireFormat,
    viewport: Viewport,
    frame: ReferenceFrame,
    stats: BotStats,
}

impl Session {
    async fn run(
        &mut self,
        name: &str,
        layout: &BoardLayout,
        config: BotRunConfig,
        rng: &mut StdRng,
    ) -> Result<(), Box<dyn Error>> {
        self.client.join(name);
        self.flush().await?;

        let deadline = Instant::now() + Duration::from_secs(10);
        while self.client.participant_id().is_none() {
            if Instant::now() >= deadline {
                return Err(err_msg("no welcome from relay before timeout"));
            }
            self.pump(Duration::from_millis(100)).await?;
        }
        tracing::info!(
            participant = ?self.client.participant_id(),
            generation = self.client.generation(),
            layout = layout.slug,
            "bot joined"
        );

        let pieces: Vec<PieceId> = layout.piece_ids().cloned().collect();
        if pieces.is_empty() {
            return Err(err_msg("layout has no pieces"));
        }
        let end_at = Instant::now() + Duration::from_secs(config.duration_secs);
        while Instant::now() < end_at {
            if config.reset_rate > 0.0 && rng.random::<f32>() < config.reset_rate {
                self.client.request_reset();
                self.stats.resets += 1;
                self.flush().await?;
            } else {
                let piece = &pieces[rng.random_range(0..pieces.len())];
                if self.drag(piece, config, rng).await? {
                    self.stats.drags += 1;
                }
            }
            let think = rng.random_range(config.think_min_ms..=config.think_max_ms);
            self.pump(Duration::from_millis(think)).await?;
            self.client.tick();
        }

        if let Some((code, message)) = self.client.last_error() {
            tracing::warn!(%code, %message, "last relay error");
        }
        tracing::info!(
            drags = self.stats.drags,
            refused = self.stats.refused,
            resets = self.stats.resets,
            frames_in = self.stats.frames_in,
            frames_out = self.stats.frames_out,
            roster = self.client.roster().len(),
            generation = self.client.generation(),
            "bot finished"
        );
        let _ = self.write.close().await;
        Ok(())
    }

    /// Returns false when the piece was held elsewhere or the drag was cut
    /// short by a reset or a lost lease.
    async fn drag(
        &mut self,
        piece: &PieceId,
        config: BotRunConfig,
        rng: &mut StdRng,
    ) -> Result<bool, Box<dyn Error>> {
        let Some(start) = self.client.piece_position(piece) else {
            return Ok(false);
        };
        let from = self.viewport.to_screen(&self.frame, start);
        let target = Point::new(rng.random_range(0.05..0.95), rng.random_range(0.05..0.95));
        let to = self.viewport.to_screen(&self.frame, target);
        let Some(handle) = self.client.begin_drag(piece, from, Some(&self.viewport)) else {
            self.stats.refused += 1;
            return Ok(false);
        };
        self.flush().await?;

        let duration = rng.random_range(config.drag_min_ms..=config.drag_max_ms);
        let steps = (duration / config.tick_ms).max(1);
        for step in 1..=steps {
            let screen = lerp_screen(from, to, step as f32 / steps as f32);
            self.client.pointer_moved(screen, Some(&self.viewport));
            if !self.client.is_dragging(piece) {
                break;
            }
            self.client.drag_to(&handle, screen, Some(&self.viewport));
            self.flush().await?;
            self.pump(Duration::from_millis(config.tick_ms)).await?;
        }
        let end = self.client.end_drag(handle, Some(to), Some(&self.viewport));
        self.flush().await?;
        Ok(end.is_some())
    }

    async fn flush(&mut self) -> Result<(), Box<dyn Error>> {
        for msg in self.transport.drain_sent() {
            let message = match encode_client(&msg, self.format)? {
                WireFrame::Binary(bytes) => Message::Binary(bytes.into()),
                WireFrame::Text(text) => Message::Text(text.into()),
            };
            self.write.send(message).await?;
            self.stats.frames_out += 1;
        }
        Ok(())
    }

    async fn pump(&mut self, window: Duration) -> Result<(), Box<dyn Error>> {
        let deadline = Instant::now() + window;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let slice = (deadline - now).min(Duration::from_millis(60));
            let Some(msg) = recv_server_msg_timeout(&mut self.read, slice).await? else {
                continue;
            };
            self.stats.frames_in += 1;
            self.transport.deliver(&msg);
        }
        Ok(())
    }
}

async fn recv_server_msg_timeout(
    read: &mut WsRead,
    dur: Duration,
) -> Result<Option<ServerMsg>, Box<dyn Error>> {
    let message = match timeout(dur, read.next()).await {
        Err(_) => return Ok(None),
        Ok(None) => return Err(err_msg("relay closed the connection")),
        Ok(Some(message)) => message?,
    };
    let frame = match message {
        Message::Binary(bytes) => WireFrame::Binary(bytes.to_vec()),
        Message::Text(text) => WireFrame::Text(text.as_str().to_string()),
        Message::Close(frame) => return Err(err_msg(format!("relay closed: {frame:?}"))),
        _ => return Ok(None),
    };
    match decode_server(&frame) {
        Ok(msg) => Ok(Some(msg)),
        Err(err) => {
            tracing::warn!(error = %err, "dropping undecodable frame");
            Ok(None)
        }
    }
}
