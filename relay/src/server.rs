use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bglab_core::{
    decode_client, encode_server, ParticipantId, RoomId, ServerMsg, WireFormat, WireFrame,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::config::RelayConfig;
use crate::hub::{peer_channel, Hub, PeerRx};
use crate::RelayError;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

#[derive(Clone)]
struct Shared {
    hub: Arc<Mutex<Hub>>,
    started: Instant,
    path_prefix: Arc<str>,
}

impl Shared {
    fn hub(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

pub struct RelayServer {
    listener: TcpListener,
    config: RelayConfig,
}

impl RelayServer {
    pub async fn bind(mut config: RelayConfig) -> Result<Self, RelayError> {
        config.normalize()?;
        let listener = TcpListener::bind(config.bind.as_str()).await?;
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until the listener fails.
    pub async fn run(self) -> Result<(), RelayError> {
        let shared = Shared {
            hub: Arc::new(Mutex::new(Hub::new(self.config.room_settings()))),
            started: Instant::now(),
            path_prefix: Arc::from(self.config.path_prefix.as_str()),
        };
        tracing::info!(
            addr = %self.local_addr()?,
            prefix = %self.config.path_prefix,
            policy = ?self.config.policy,
            "relay listening"
        );
        let sweeper = spawn_sweeper(shared.clone(), self.config.sweep_interval_ms);
        let result = loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => break Err(RelayError::Io(err)),
            };
            let shared = shared.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_connection(stream, addr, shared).await {
                    tracing::debug!(%addr, error = %err, "connection ended with error");
                }
            });
        };
        sweeper.abort();
        result
    }
}

pub async fn serve(config: RelayConfig) -> Result<(), RelayError> {
    RelayServer::bind(config).await?.run().await
}

fn spawn_sweeper(shared: Shared, interval_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            interval.tick().await;
            let now = shared.now_ms();
            let expired = shared.hub().sweep(now);
            if expired > 0 {
                tracing::debug!(expired, "released idle leases");
            }
        }
    })
}

fn format_from_query(query: Option<&str>) -> Option<WireFormat> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "format")
        .and_then(|(_, value)| WireFormat::from_query_value(&value))
}

fn reject(status: StatusCode, reason: String) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason));
    *response.status_mut() = status;
    response
}

fn to_message(frame: WireFrame) -> Message {
    match frame {
        WireFrame::Binary(bytes) => Message::Binary(bytes.into()),
        WireFrame::Text(text) => Message::Text(text.into()),
    }
}

fn spawn_writer(
    mut sink: WsSink,
    mut rx: PeerRx,
    format: WireFormat,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let frame = match encode_server(&msg, format) {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::warn!(event = msg.event(), error = %err, "encode failed");
                    continue;
                }
            };
            if sink.send(to_message(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    })
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    shared: Shared,
) -> Result<(), RelayError> {
    let mut target: Option<(RoomId, Option<WireFormat>)> = None;
    let prefix = Arc::clone(&shared.path_prefix);
    let callback = |request: &Request, response: Response| {
        let uri = request.uri();
        match RoomId::from_path(uri.path(), &prefix) {
            Ok(room_id) => {
                target = Some((room_id, format_from_query(uri.query())));
                Ok(response)
            }
            Err(err) => Err(reject(StatusCode::NOT_FOUND, err.to_string())),
        }
    };
    let ws = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    let Some((room_id, requested)) = target else {
        return Ok(());
    };
    tracing::debug!(%addr, room = %room_id, format = ?requested, "websocket accepted");

    let (sink, mut read) = ws.split();
    let mut sink = Some(sink);
    let mut session: Option<(ParticipantId, JoinHandle<()>)> = None;

    // Without ?format= the first frame decides the encoding.
    let open = |format: WireFormat, sink: &mut Option<WsSink>| {
        let sink = sink.take()?;
        let (tx, rx) = peer_channel();
        let writer = spawn_writer(sink, rx, format);
        let id = shared.hub().connect(room_id.clone(), tx);
        tracing::debug!(%addr, participant = %id, ?format, "session opened");
        Some((id, writer))
    };
    if let Some(format) = requested {
        session = open(format, &mut sink);
    }

    let result = loop {
        let Some(message) = read.next().await else {
            break Ok(());
        };
        let frame = match message {
            Ok(Message::Binary(bytes)) => WireFrame::Binary(bytes.to_vec()),
            Ok(Message::Text(text)) => WireFrame::Text(text.as_str().to_string()),
            Ok(Message::Close(_)) => break Ok(()),
            Ok(_) => continue,
            Err(err) => break Err(RelayError::WebSocket(err)),
        };
        if session.is_none() {
            session = open(frame.format(), &mut sink);
        }
        let Some((id, _)) = session.as_ref() else {
            break Ok(());
        };
        match decode_client(&frame) {
            Ok(msg) => {
                tracing::trace!(participant = %id, event = msg.event(), "inbound");
                let now = shared.now_ms();
                shared.hub().handle(*id, msg, now);
            }
            Err(err) => {
                tracing::warn!(participant = %id, error = %err, "rejected frame");
                shared
                    .hub()
                    .send_to(*id, ServerMsg::error("decode_error", err.to_string()));
            }
        }
    };

    if let Some((id, writer)) = session {
        shared.hub().disconnect(id);
        // The hub dropped our sender; the writer drains and closes.
        let _ = writer.await;
    }
    result
}
