pub mod codec;
pub mod effects;
pub mod geometry;
pub mod ids;
pub mod layout;
pub mod protocol;
pub mod room_id;

pub use codec::{
    decode_client, decode_server, encode_client, encode_server, DecodeError, EncodeError,
    WireFormat, WireFrame,
};
pub use effects::{card_effects, cell_effects, EffectContext, EffectError, EffectRegistry};
pub use geometry::{
    compute_scale, FramePoint, GeometryError, GridBounds, Point, ReferenceFrame, ScalePolicy,
    ScreenPoint, Viewport,
};
pub use ids::{ParticipantId, PieceId, PieceIdError};
pub use layout::{layout_by_slug, BoardLayout, PieceSpec, LAYOUT_CATALOG};
pub use protocol::{ClientMsg, ConflictPolicy, ServerEvent, ServerMsg, PROTOCOL_VERSION};
pub use room_id::{
    is_valid_room_id, normalize_path_prefix, RoomId, RoomIdError, DEFAULT_ROOM_PATH_PREFIX,
    ROOM_ID_ALPHABET, ROOM_ID_LEN,
};
