pub mod board;
pub mod client;
pub mod clock;
pub mod config;
pub mod cursor;
pub mod draggable;
pub mod reset;
pub mod roster;
pub mod throttle;
pub mod transport;

pub use board::{Board, DragHandle, PieceKey};
pub use client::{DragEndHook, RoomClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, RotationSync, SyncConfig};
pub use cursor::{CursorLayer, CursorSprite, RemoteCursors};
pub use draggable::{ControllerSettings, DragEnd, DragState, PieceController};
pub use reset::ResetCoordinator;
pub use roster::Roster;
pub use throttle::{PointerEmitter, Throttle};
pub use transport::{ChannelTransport, Handler, SubscriptionId, Subscribers, Transport};
