use rkyv::api::high::{HighDeserializer, HighSerializer, HighValidator};
use rkyv::bytecheck::CheckBytes;
use rkyv::rancor::Error;
use rkyv::ser::allocator::ArenaHandle;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::{events, ClientMsg, ServerMsg, PROTOCOL_VERSION};

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct ClientFrame {
    pub version: u16,
    pub msg: ClientMsg,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct ServerFrame {
    pub version: u16,
    pub msg: ServerMsg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    #[default]
    Binary,
    Json,
}

impl WireFormat {
    pub fn from_query_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" | "text" => Some(WireFormat::Json),
            "binary" | "rkyv" => Some(WireFormat::Binary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireFrame {
    Binary(Vec<u8>),
    Text(String),
}

impl WireFrame {
    pub fn format(&self) -> WireFormat {
        match self {
            WireFrame::Binary(_) => WireFormat::Binary,
            WireFrame::Text(_) => WireFormat::Json,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed binary frame")]
    Malformed,
    #[error("malformed json frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported protocol version {found} (expected {expected})")]
    Version { expected: u16, found: u16 },
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    #[error("invalid payload for '{event}': {reason}")]
    InvalidPayload { event: &'static str, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("binary encode failed")]
    Binary,
    #[error("json encode failed: {0}")]
    Json(#[from] serde_json::Error),
}

fn encode_archive<T>(value: &T) -> Option<Vec<u8>>
where
    T: for<'a> Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, Error>>,
{
    rkyv::to_bytes::<Error>(value).ok().map(|bytes| bytes.into_vec())
}

fn decode_archive<T>(bytes: &[u8]) -> Option<T>
where
    T: Archive,
    T::Archived:
        for<'a> CheckBytes<HighValidator<'a, Error>> + Deserialize<T, HighDeserializer<Error>>,
{
    // Archives need aligned storage; socket buffers make no such promise.
    let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
    aligned.extend_from_slice(bytes);
    rkyv::from_bytes::<T, Error>(&aligned).ok()
}

fn check_version(found: u16) -> Result<(), DecodeError> {
    if found != PROTOCOL_VERSION {
        return Err(DecodeError::Version {
            expected: PROTOCOL_VERSION,
            found,
        });
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct JsonFrameOut<'a, T: serde::Serialize> {
    v: u16,
    event: &'a str,
    data: &'a T,
}

#[derive(serde::Deserialize)]
struct JsonFrameIn {
    v: u16,
    event: String,
    #[serde(default)]
    data: Value,
}

fn to_json<T: serde::Serialize>(event: &str, data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&JsonFrameOut {
        v: PROTOCOL_VERSION,
        event,
        data,
    })
}

fn parse_json(text: &str) -> Result<(String, Value), DecodeError> {
    let frame: JsonFrameIn = serde_json::from_str(text)?;
    check_version(frame.v)?;
    // Events without a body may send `null` or omit `data`.
    let data = if frame.data.is_null() {
        Value::Object(Default::default())
    } else {
        frame.data
    };
    Ok((frame.event, data))
}

pub fn encode_client(msg: &ClientMsg, format: WireFormat) -> Result<WireFrame, EncodeError> {
    match format {
        WireFormat::Binary => {
            let frame = ClientFrame {
                version: PROTOCOL_VERSION,
                msg: msg.clone(),
            };
            encode_archive(&frame)
                .map(WireFrame::Binary)
                .ok_or(EncodeError::Binary)
        }
        WireFormat::Json => {
            let event = msg.event();
            let text = match msg {
                ClientMsg::Join(data) => to_json(event, data),
                ClientMsg::DraggableMoved(data) => to_json(event, data),
                ClientMsg::DraggableGrab(data) | ClientMsg::DraggableRelease(data) => {
                    to_json(event, data)
                }
                ClientMsg::DraggableRotate(data) => to_json(event, data),
                ClientMsg::CursorMove(data) => to_json(event, data),
                ClientMsg::ResetDraggable(data) => to_json(event, data),
                ClientMsg::Ping(data) => to_json(event, data),
            }?;
            Ok(WireFrame::Text(text))
        }
    }
}

pub fn decode_client(frame: &WireFrame) -> Result<ClientMsg, DecodeError> {
    let msg = match frame {
        WireFrame::Binary(bytes) => {
            let frame = decode_archive::<ClientFrame>(bytes).ok_or(DecodeError::Malformed)?;
            check_version(frame.version)?;
            frame.msg
        }
        WireFrame::Text(text) => {
            let (event, data) = parse_json(text)?;
            match event.as_str() {
                events::ROOM_JOIN => ClientMsg::Join(serde_json::from_value(data)?),
                events::DRAGGABLE_MOVED => ClientMsg::DraggableMoved(serde_json::from_value(data)?),
                events::DRAGGABLE_GRAB => ClientMsg::DraggableGrab(serde_json::from_value(data)?),
                events::DRAGGABLE_RELEASE => {
                    ClientMsg::DraggableRelease(serde_json::from_value(data)?)
                }
                events::DRAGGABLE_ROTATE => {
                    ClientMsg::DraggableRotate(serde_json::from_value(data)?)
                }
                events::CURSOR_MOVE => ClientMsg::CursorMove(serde_json::from_value(data)?),
                events::RESET_DRAGGABLE => {
                    ClientMsg::ResetDraggable(serde_json::from_value(data)?)
                }
                events::PING => ClientMsg::Ping(serde_json::from_value(data)?),
                _ => return Err(DecodeError::UnknownEvent(event)),
            }
        }
    };
    msg.validate().map_err(|reason| DecodeError::InvalidPayload {
        event: msg.event(),
        reason,
    })?;
    Ok(msg)
}

pub fn encode_server(msg: &ServerMsg, format: WireFormat) -> Result<WireFrame, EncodeError> {
    match format {
        WireFormat::Binary => {
            let frame = ServerFrame {
                version: PROTOCOL_VERSION,
                msg: msg.clone(),
            };
            encode_archive(&frame)
                .map(WireFrame::Binary)
                .ok_or(EncodeError::Binary)
        }
        WireFormat::Json => {
            let event = msg.event();
            let text = match msg {
                ServerMsg::Welcome(data) => to_json(event, data),
                ServerMsg::Roster(data) => to_json(event, data),
                ServerMsg::ParticipantLeft(data) => to_json(event, data),
                ServerMsg::DraggableUpdate(data) => to_json(event, data),
                ServerMsg::DraggableOwner(data) => to_json(event, data),
                ServerMsg::DraggableRotation(data) => to_json(event, data),
                ServerMsg::CursorUpdate(data) => to_json(event, data),
                ServerMsg::ResetDraggable(data) => to_json(event, data),
                ServerMsg::Pong(data) => to_json(event, data),
                ServerMsg::Error(data) => to_json(event, data),
            }?;
            Ok(WireFrame::Text(text))
        }
    }
}

pub fn decode_server(frame: &WireFrame) -> Result<ServerMsg, DecodeError> {
    let msg = match frame {
        WireFrame::Binary(bytes) => {
            let frame = decode_archive::<ServerFrame>(bytes).ok_or(DecodeError::Malformed)?;
            check_version(frame.version)?;
            frame.msg
        }
        WireFrame::Text(text) => {
            let (event, data) = parse_json(text)?;
            match event.as_str() {
                events::ASSIGN_ID => ServerMsg::Welcome(serde_json::from_value(data)?),
                events::PLAYERS_UPDATE => ServerMsg::Roster(serde_json::from_value(data)?),
                events::PARTICIPANT_LEFT => {
                    ServerMsg::ParticipantLeft(serde_json::from_value(data)?)
                }
                events::DRAGGABLE_UPDATE => {
                    ServerMsg::DraggableUpdate(serde_json::from_value(data)?)
                }
                events::DRAGGABLE_OWNER => ServerMsg::DraggableOwner(serde_json::from_value(data)?),
                events::DRAGGABLE_ROTATION => {
                    ServerMsg::DraggableRotation(serde_json::from_value(data)?)
                }
                events::CURSOR_UPDATE => ServerMsg::CursorUpdate(serde_json::from_value(data)?),
                events::RESET_DRAGGABLE => {
                    ServerMsg::ResetDraggable(serde_json::from_value(data)?)
                }
                events::PONG => ServerMsg::Pong(serde_json::from_value(data)?),
                events::ERROR => ServerMsg::Error(serde_json::from_value(data)?),
                _ => return Err(DecodeError::UnknownEvent(event)),
            }
        }
    };
    msg.validate().map_err(|reason| DecodeError::InvalidPayload {
        event: msg.event(),
        reason,
    })?;
    Ok(msg)
}
