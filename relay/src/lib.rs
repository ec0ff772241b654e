pub mod config;
pub mod hub;
pub mod room;
pub mod server;

pub use config::{RelayConfig, BIND_DEFAULT, SWEEP_INTERVAL_MS_DEFAULT};
pub use hub::{peer_channel, Hub, PeerRx, PeerTx, PEER_QUEUE_CAPACITY};
pub use room::{Outgoing, Recipients, RoomSettings, RoomState, LEASE_TIMEOUT_MS_DEFAULT};
pub use server::{serve, RelayServer};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config: {0}")]
    Config(String),
}
