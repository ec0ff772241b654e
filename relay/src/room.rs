use std::collections::BTreeMap;

use bglab_core::protocol::{
    CursorMoved, JoinRoom, Participant, ParticipantLeft, PieceGrab, PieceMoved, PieceOwner,
    PieceRotate, PieceRotation, PieceUpdate, Pong, ResetNotice, RosterUpdate, Welcome,
};
use bglab_core::{ClientMsg, ConflictPolicy, ParticipantId, PieceId, Point, RoomId, ServerMsg};

pub const LEASE_TIMEOUT_MS_DEFAULT: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
    One(ParticipantId),
    AllExcept(ParticipantId),
    All,
}

impl Recipients {
    pub fn includes(&self, participant_id: ParticipantId) -> bool {
        match self {
            Recipients::One(id) => *id == participant_id,
            Recipients::AllExcept(id) => *id != participant_id,
            Recipients::All => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub to: Recipients,
    pub msg: ServerMsg,
}

impl Outgoing {
    fn one(id: ParticipantId, msg: ServerMsg) -> Self {
        Self {
            to: Recipients::One(id),
            msg,
        }
    }

    fn others(id: ParticipantId, msg: ServerMsg) -> Self {
        Self {
            to: Recipients::AllExcept(id),
            msg,
        }
    }

    fn all(msg: ServerMsg) -> Self {
        Self {
            to: Recipients::All,
            msg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomSettings {
    pub policy: ConflictPolicy,
    pub lease_timeout_ms: u64,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            policy: ConflictPolicy::LastWriterWins,
            lease_timeout_ms: LEASE_TIMEOUT_MS_DEFAULT,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Member {
    display_name: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Lease {
    owner: ParticipantId,
    last_active_ms: u64,
}

/// Relay-side state of a single room. Pure: every input returns the
/// messages to fan out instead of sending them.
#[derive(Debug, Clone)]
pub struct RoomState {
    room_id: RoomId,
    settings: RoomSettings,
    generation: u32,
    members: BTreeMap<ParticipantId, Member>,
    positions: BTreeMap<PieceId, Point>,
    rotations: BTreeMap<PieceId, u16>,
    leases: BTreeMap<PieceId, Lease>,
    lease_by_owner: BTreeMap<ParticipantId, PieceId>,
}

impl RoomState {
    pub fn new(room_id: RoomId, settings: RoomSettings) -> Self {
        Self {
            room_id,
            settings,
            generation: 0,
            members: BTreeMap::new(),
            positions: BTreeMap::new(),
            rotations: BTreeMap::new(),
            leases: BTreeMap::new(),
            lease_by_owner: BTreeMap::new(),
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn members(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.members.keys().copied()
    }

    pub fn is_member(&self, participant_id: ParticipantId) -> bool {
        self.members.contains_key(&participant_id)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn position(&self, piece_id: &PieceId) -> Option<Point> {
        self.positions.get(piece_id).copied()
    }

    pub fn owner(&self, piece_id: &PieceId) -> Option<ParticipantId> {
        self.leases.get(piece_id).map(|lease| lease.owner)
    }

    fn roster(&self) -> ServerMsg {
        let participants = self
            .members
            .iter()
            .filter_map(|(id, member)| {
                member.display_name.as_ref().map(|name| Participant {
                    participant_id: *id,
                    display_name: name.clone(),
                })
            })
            .collect();
        ServerMsg::Roster(RosterUpdate { participants })
    }

    /// Welcome plus a replay of the current generation for a late joiner.
    pub fn connect(&mut self, id: ParticipantId) -> Vec<Outgoing> {
        self.members.insert(id, Member::default());
        let mut out = vec![Outgoing::one(
            id,
            ServerMsg::Welcome(Welcome {
                room_id: self.room_id.to_string(),
                participant_id: id,
                generation: self.generation,
                policy: self.settings.policy,
            }),
        )];
        for (piece_id, point) in &self.positions {
            out.push(Outgoing::one(
                id,
                ServerMsg::DraggableUpdate(PieceUpdate {
                    piece_id: piece_id.clone(),
                    x: point.x,
                    y: point.y,
                    generation: self.generation,
                    source: None,
                }),
            ));
        }
        for (piece_id, rotation_deg) in &self.rotations {
            out.push(Outgoing::one(
                id,
                ServerMsg::DraggableRotation(PieceRotation {
                    piece_id: piece_id.clone(),
                    rotation_deg: *rotation_deg,
                    generation: self.generation,
                }),
            ));
        }
        for (piece_id, lease) in &self.leases {
            out.push(Outgoing::one(
                id,
                ServerMsg::DraggableOwner(PieceOwner {
                    piece_id: piece_id.clone(),
                    owner: Some(lease.owner),
                }),
            ));
        }
        out.push(Outgoing::one(id, self.roster()));
        tracing::info!(
            room = %self.room_id,
            participant = %id,
            members = self.members.len(),
            "participant connected"
        );
        out
    }

    pub fn leave(&mut self, id: ParticipantId) -> Vec<Outgoing> {
        if self.members.remove(&id).is_none() {
            return Vec::new();
        }
        let mut out = Vec::new();
        if let Some(piece_id) = self.release_owner(id) {
            out.push(Outgoing::all(owner_msg(piece_id, None)));
        }
        out.push(Outgoing::all(ServerMsg::ParticipantLeft(ParticipantLeft {
            participant_id: id,
        })));
        out.push(Outgoing::all(self.roster()));
        tracing::info!(
            room = %self.room_id,
            participant = %id,
            members = self.members.len(),
            "participant left"
        );
        out
    }

    pub fn handle(&mut self, id: ParticipantId, msg: ClientMsg, now_ms: u64) -> Vec<Outgoing> {
        if !self.is_member(id) {
            tracing::warn!(room = %self.room_id, participant = %id, "message from non-member");
            return Vec::new();
        }
        if let Some(room_id) = msg.room_id() {
            if room_id != self.room_id.as_str() {
                tracing::debug!(room = %self.room_id, claimed = room_id, "room mismatch");
                return vec![Outgoing::one(
                    id,
                    ServerMsg::error(
                        "room_mismatch",
                        format!("connected to room {}", self.room_id),
                    ),
                )];
            }
        }
        match msg {
            ClientMsg::Join(join) => self.join(id, join),
            ClientMsg::DraggableMoved(moved) => self.moved(id, moved, now_ms),
            ClientMsg::DraggableGrab(grab) => self.grab(id, grab, now_ms),
            ClientMsg::DraggableRelease(release) => self.release(id, release),
            ClientMsg::DraggableRotate(rotate) => self.rotate(id, rotate),
            ClientMsg::CursorMove(cursor) => self.cursor(id, cursor),
            ClientMsg::ResetDraggable(_) => self.reset(id),
            ClientMsg::Ping(ping) => {
                vec![Outgoing::one(id, ServerMsg::Pong(Pong { nonce: ping.nonce }))]
            }
        }
    }

    fn join(&mut self, id: ParticipantId, join: JoinRoom) -> Vec<Outgoing> {
        if let Some(member) = self.members.get_mut(&id) {
            member.display_name = Some(join.display_name.trim().to_string());
        }
        vec![Outgoing::all(self.roster())]
    }

    fn stale(&self, generation: u32, piece_id: &PieceId) -> bool {
        if generation == self.generation {
            return false;
        }
        tracing::trace!(
            room = %self.room_id,
            piece = %piece_id,
            generation,
            current = self.generation,
            "drop stale generation"
        );
        true
    }

    fn moved(&mut self, id: ParticipantId, moved: PieceMoved, now_ms: u64) -> Vec<Outgoing> {
        if self.stale(moved.generation, &moved.piece_id) {
            return Vec::new();
        }
        if self.settings.policy == ConflictPolicy::Lease {
            if let Some(lease) = self.leases.get_mut(&moved.piece_id) {
                if lease.owner != id {
                    tracing::trace!(
                        piece = %moved.piece_id,
                        owner = %lease.owner,
                        sender = %id,
                        "move from non-owner"
                    );
                    return Vec::new();
                }
                lease.last_active_ms = now_ms;
            }
        }
        self.positions.insert(moved.piece_id.clone(), moved.point());
        vec![Outgoing::others(
            id,
            ServerMsg::DraggableUpdate(PieceUpdate {
                piece_id: moved.piece_id,
                x: moved.x,
                y: moved.y,
                generation: moved.generation,
                source: Some(id),
            }),
        )]
    }

    fn release_owner(&mut self, id: ParticipantId) -> Option<PieceId> {
        let piece_id = self.lease_by_owner.remove(&id)?;
        self.leases.remove(&piece_id);
        Some(piece_id)
    }

    fn grab(&mut self, id: ParticipantId, grab: PieceGrab, now_ms: u64) -> Vec<Outgoing> {
        if self.settings.policy != ConflictPolicy::Lease
            || self.stale(grab.generation, &grab.piece_id)
        {
            return Vec::new();
        }
        if let Some(lease) = self.leases.get_mut(&grab.piece_id) {
            if lease.owner == id {
                lease.last_active_ms = now_ms;
                return Vec::new();
            }
            return vec![Outgoing::one(id, owner_msg(grab.piece_id, Some(lease.owner)))];
        }
        let mut out = Vec::new();
        // One lease per participant: grabbing a new piece drops the old one.
        if let Some(previous) = self.release_owner(id) {
            out.push(Outgoing::all(owner_msg(previous, None)));
        }
        self.leases.insert(
            grab.piece_id.clone(),
            Lease {
                owner: id,
                last_active_ms: now_ms,
            },
        );
        self.lease_by_owner.insert(id, grab.piece_id.clone());
        out.push(Outgoing::all(owner_msg(grab.piece_id, Some(id))));
        out
    }

    fn release(&mut self, id: ParticipantId, release: PieceGrab) -> Vec<Outgoing> {
        match self.leases.get(&release.piece_id) {
            Some(lease) if lease.owner == id => {
                self.leases.remove(&release.piece_id);
                self.lease_by_owner.remove(&id);
                vec![Outgoing::all(owner_msg(release.piece_id, None))]
            }
            _ => Vec::new(),
        }
    }

    fn rotate(&mut self, id: ParticipantId, rotate: PieceRotate) -> Vec<Outgoing> {
        if self.stale(rotate.generation, &rotate.piece_id) {
            return Vec::new();
        }
        self.rotations
            .insert(rotate.piece_id.clone(), rotate.rotation_deg);
        vec![Outgoing::others(
            id,
            ServerMsg::DraggableRotation(PieceRotation {
                piece_id: rotate.piece_id,
                rotation_deg: rotate.rotation_deg,
                generation: rotate.generation,
            }),
        )]
    }

    fn cursor(&mut self, id: ParticipantId, cursor: CursorMoved) -> Vec<Outgoing> {
        // The connection id is the identity; a claimed id is ignored.
        vec![Outgoing::others(
            id,
            ServerMsg::CursorUpdate(bglab_core::protocol::CursorUpdate {
                participant_id: id,
                x: cursor.x,
                y: cursor.y,
            }),
        )]
    }

    fn reset(&mut self, id: ParticipantId) -> Vec<Outgoing> {
        self.generation = self.generation.saturating_add(1);
        self.positions.clear();
        self.rotations.clear();
        self.leases.clear();
        self.lease_by_owner.clear();
        tracing::info!(
            room = %self.room_id,
            participant = %id,
            generation = self.generation,
            "room reset"
        );
        vec![Outgoing::all(ServerMsg::ResetDraggable(ResetNotice {
            generation: Some(self.generation),
        }))]
    }

    pub fn expire_leases(&mut self, now_ms: u64) -> Vec<Outgoing> {
        let timeout = self.settings.lease_timeout_ms;
        let expired: Vec<(PieceId, ParticipantId)> = self
            .leases
            .iter()
            .filter(|(_, lease)| now_ms.saturating_sub(lease.last_active_ms) >= timeout)
            .map(|(piece_id, lease)| (piece_id.clone(), lease.owner))
            .collect();
        let mut out = Vec::with_capacity(expired.len());
        for (piece_id, owner) in expired {
            self.leases.remove(&piece_id);
            self.lease_by_owner.remove(&owner);
            tracing::info!(
                room = %self.room_id,
                piece = %piece_id,
                owner = %owner,
                "lease timeout"
            );
            out.push(Outgoing::all(owner_msg(piece_id, None)));
        }
        out
    }
}

fn owner_msg(piece_id: PieceId, owner: Option<ParticipantId>) -> ServerMsg {
    ServerMsg::DraggableOwner(PieceOwner { piece_id, owner })
}
