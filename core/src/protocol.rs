use rkyv::Archive;
use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::ids::{ParticipantId, PieceId};
use crate::room_id::RoomId;

pub const PROTOCOL_VERSION: u16 = 1;

pub const COORD_MIN: f32 = -1.0;
pub const COORD_MAX: f32 = 2.0;
pub const DISPLAY_NAME_MAX_LEN: usize = 32;

pub mod events {
    pub const ROOM_JOIN: &str = "room:join";
    pub const DRAGGABLE_MOVED: &str = "draggable:moved";
    pub const DRAGGABLE_GRAB: &str = "draggable:grab";
    pub const DRAGGABLE_RELEASE: &str = "draggable:release";
    pub const DRAGGABLE_ROTATE: &str = "draggable:rotate";
    pub const CURSOR_MOVE: &str = "cursor:move";
    pub const RESET_DRAGGABLE: &str = "reset:draggable";
    pub const PING: &str = "ping";

    pub const ASSIGN_ID: &str = "player:assign-id";
    pub const PLAYERS_UPDATE: &str = "players:update";
    pub const PARTICIPANT_LEFT: &str = "participant:left";
    pub const DRAGGABLE_UPDATE: &str = "draggable:update";
    pub const DRAGGABLE_OWNER: &str = "draggable:owner";
    pub const DRAGGABLE_ROTATION: &str = "draggable:rotation";
    pub const CURSOR_UPDATE: &str = "cursor:update";
    pub const PONG: &str = "pong";
    pub const ERROR: &str = "error";
}

/// How the relay arbitrates two participants dragging the same piece.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    #[default]
    LastWriterWins,
    Lease,
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub participant_id: ParticipantId,
    pub display_name: String,
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    pub room_id: String,
    pub display_name: String,
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct PieceMoved {
    pub room_id: String,
    pub piece_id: PieceId,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub generation: u32,
}

impl PieceMoved {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct PieceGrab {
    pub room_id: String,
    pub piece_id: PieceId,
    #[serde(default)]
    pub generation: u32,
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct PieceRotate {
    pub room_id: String,
    pub piece_id: PieceId,
    pub rotation_deg: u16,
    #[serde(default)]
    pub generation: u32,
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct CursorMoved {
    pub room_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<ParticipantId>,
    pub x: f32,
    pub y: f32,
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    pub room_id: String,
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Default,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
pub struct Ping {
    #[serde(default)]
    pub nonce: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Archive, rkyv::Serialize, rkyv::Deserialize)]
pub enum ClientMsg {
    Join(JoinRoom),
    DraggableMoved(PieceMoved),
    DraggableGrab(PieceGrab),
    DraggableRelease(PieceGrab),
    DraggableRotate(PieceRotate),
    CursorMove(CursorMoved),
    ResetDraggable(ResetRequest),
    Ping(Ping),
}

impl ClientMsg {
    pub fn event(&self) -> &'static str {
        match self {
            ClientMsg::Join(_) => events::ROOM_JOIN,
            ClientMsg::DraggableMoved(_) => events::DRAGGABLE_MOVED,
            ClientMsg::DraggableGrab(_) => events::DRAGGABLE_GRAB,
            ClientMsg::DraggableRelease(_) => events::DRAGGABLE_RELEASE,
            ClientMsg::DraggableRotate(_) => events::DRAGGABLE_ROTATE,
            ClientMsg::CursorMove(_) => events::CURSOR_MOVE,
            ClientMsg::ResetDraggable(_) => events::RESET_DRAGGABLE,
            ClientMsg::Ping(_) => events::PING,
        }
    }

    pub fn room_id(&self) -> Option<&str> {
        match self {
            ClientMsg::Join(msg) => Some(&msg.room_id),
            ClientMsg::DraggableMoved(msg) => Some(&msg.room_id),
            ClientMsg::DraggableGrab(msg) | ClientMsg::DraggableRelease(msg) => Some(&msg.room_id),
            ClientMsg::DraggableRotate(msg) => Some(&msg.room_id),
            ClientMsg::CursorMove(msg) => Some(&msg.room_id),
            ClientMsg::ResetDraggable(msg) => Some(&msg.room_id),
            ClientMsg::Ping(_) => None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(room_id) = self.room_id() {
            RoomId::parse(room_id).map_err(|err| err.to_string())?;
        }
        match self {
            ClientMsg::Join(msg) => check_display_name(&msg.display_name),
            ClientMsg::DraggableMoved(msg) => {
                check_piece(&msg.piece_id)?;
                check_coords(msg.x, msg.y)
            }
            ClientMsg::DraggableGrab(msg) | ClientMsg::DraggableRelease(msg) => {
                check_piece(&msg.piece_id)
            }
            ClientMsg::DraggableRotate(msg) => {
                check_piece(&msg.piece_id)?;
                check_rotation(msg.rotation_deg)
            }
            ClientMsg::CursorMove(msg) => check_coords(msg.x, msg.y),
            ClientMsg::ResetDraggable(_) | ClientMsg::Ping(_) => Ok(()),
        }
    }
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub room_id: String,
    pub participant_id: ParticipantId,
    #[serde(default)]
    pub generation: u32,
    #[serde(default)]
    pub policy: ConflictPolicy,
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Default,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct RosterUpdate {
    pub participants: Vec<Participant>,
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantLeft {
    pub participant_id: ParticipantId,
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct PieceUpdate {
    pub piece_id: PieceId,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub generation: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ParticipantId>,
}

impl PieceUpdate {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct PieceOwner {
    pub piece_id: PieceId,
    #[serde(default)]
    pub owner: Option<ParticipantId>,
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct PieceRotation {
    pub piece_id: PieceId,
    pub rotation_deg: u16,
    #[serde(default)]
    pub generation: u32,
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct CursorUpdate {
    pub participant_id: ParticipantId,
    pub x: f32,
    pub y: f32,
}

impl CursorUpdate {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Default,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
pub struct ResetNotice {
    #[serde(default)]
    pub generation: Option<u32>,
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Default,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
pub struct Pong {
    #[serde(default)]
    pub nonce: Option<u64>,
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
pub struct ServerError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Archive, rkyv::Serialize, rkyv::Deserialize)]
pub enum ServerMsg {
    Welcome(Welcome),
    Roster(RosterUpdate),
    ParticipantLeft(ParticipantLeft),
    DraggableUpdate(PieceUpdate),
    DraggableOwner(PieceOwner),
    DraggableRotation(PieceRotation),
    CursorUpdate(CursorUpdate),
    ResetDraggable(ResetNotice),
    Pong(Pong),
    Error(ServerError),
}

/// Subscription key for inbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerEvent {
    Welcome,
    Roster,
    ParticipantLeft,
    DraggableUpdate,
    DraggableOwner,
    DraggableRotation,
    CursorUpdate,
    ResetDraggable,
    Pong,
    Error,
}

impl ServerEvent {
    pub fn name(self) -> &'static str {
        match self {
            ServerEvent::Welcome => events::ASSIGN_ID,
            ServerEvent::Roster => events::PLAYERS_UPDATE,
            ServerEvent::ParticipantLeft => events::PARTICIPANT_LEFT,
            ServerEvent::DraggableUpdate => events::DRAGGABLE_UPDATE,
            ServerEvent::DraggableOwner => events::DRAGGABLE_OWNER,
            ServerEvent::DraggableRotation => events::DRAGGABLE_ROTATION,
            ServerEvent::CursorUpdate => events::CURSOR_UPDATE,
            ServerEvent::ResetDraggable => events::RESET_DRAGGABLE,
            ServerEvent::Pong => events::PONG,
            ServerEvent::Error => events::ERROR,
        }
    }
}

impl ServerMsg {
    pub fn kind(&self) -> ServerEvent {
        match self {
            ServerMsg::Welcome(_) => ServerEvent::Welcome,
            ServerMsg::Roster(_) => ServerEvent::Roster,
            ServerMsg::ParticipantLeft(_) => ServerEvent::ParticipantLeft,
            ServerMsg::DraggableUpdate(_) => ServerEvent::DraggableUpdate,
            ServerMsg::DraggableOwner(_) => ServerEvent::DraggableOwner,
            ServerMsg::DraggableRotation(_) => ServerEvent::DraggableRotation,
            ServerMsg::CursorUpdate(_) => ServerEvent::CursorUpdate,
            ServerMsg::ResetDraggable(_) => ServerEvent::ResetDraggable,
            ServerMsg::Pong(_) => ServerEvent::Pong,
            ServerMsg::Error(_) => ServerEvent::Error,
        }
    }

    pub fn event(&self) -> &'static str {
        self.kind().name()
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMsg::Error(ServerError {
            code: code.to_string(),
            message: message.into(),
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            ServerMsg::Welcome(msg) => RoomId::parse(&msg.room_id)
                .map(|_| ())
                .map_err(|err| err.to_string()),
            ServerMsg::Roster(msg) => msg
                .participants
                .iter()
                .try_for_each(|p| check_display_name(&p.display_name)),
            ServerMsg::DraggableUpdate(msg) => {
                check_piece(&msg.piece_id)?;
                check_coords(msg.x, msg.y)
            }
            ServerMsg::DraggableOwner(msg) => check_piece(&msg.piece_id),
            ServerMsg::DraggableRotation(msg) => {
                check_piece(&msg.piece_id)?;
                check_rotation(msg.rotation_deg)
            }
            ServerMsg::CursorUpdate(msg) => check_coords(msg.x, msg.y),
            ServerMsg::ParticipantLeft(_)
            | ServerMsg::ResetDraggable(_)
            | ServerMsg::Pong(_)
            | ServerMsg::Error(_) => Ok(()),
        }
    }
}

/// Whether a room-relative point passes the wire coordinate check.
pub fn in_wire_range(point: Point) -> bool {
    [point.x, point.y]
        .iter()
        .all(|value| value.is_finite() && (COORD_MIN..=COORD_MAX).contains(value))
}

fn check_coords(x: f32, y: f32) -> Result<(), String> {
    for (axis, value) in [("x", x), ("y", y)] {
        if !value.is_finite() {
            return Err(format!("{axis} is not finite"));
        }
        if !(COORD_MIN..=COORD_MAX).contains(&value) {
            return Err(format!("{axis}={value} outside {COORD_MIN}..={COORD_MAX}"));
        }
    }
    Ok(())
}

fn check_piece(piece_id: &PieceId) -> Result<(), String> {
    piece_id.check().map_err(|err| err.to_string())
}

fn check_rotation(rotation_deg: u16) -> Result<(), String> {
    if rotation_deg % 90 != 0 || rotation_deg >= 360 {
        return Err(format!("rotation {rotation_deg} is not a quarter turn"));
    }
    Ok(())
}

fn check_display_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("display name is empty".to_string());
    }
    if trimmed.chars().count() > DISPLAY_NAME_MAX_LEN {
        return Err(format!("display name exceeds {DISPLAY_NAME_MAX_LEN} chars"));
    }
    Ok(())
}
