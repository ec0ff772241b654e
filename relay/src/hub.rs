use std::collections::HashMap;

use bglab_core::{ClientMsg, ParticipantId, RoomId, ServerMsg};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::room::{Outgoing, Recipients, RoomSettings, RoomState};

pub const PEER_QUEUE_CAPACITY: usize = 256;

pub type PeerTx = mpsc::Sender<ServerMsg>;
pub type PeerRx = mpsc::Receiver<ServerMsg>;

pub fn peer_channel() -> (PeerTx, PeerRx) {
    mpsc::channel(PEER_QUEUE_CAPACITY)
}

struct Peer {
    room_id: RoomId,
    tx: PeerTx,
}

/// Every live room and connection of one relay process.
pub struct Hub {
    settings: RoomSettings,
    rooms: HashMap<RoomId, RoomState>,
    peers: HashMap<ParticipantId, Peer>,
    next_id: u64,
}

impl Hub {
    pub fn new(settings: RoomSettings) -> Self {
        Self {
            settings,
            rooms: HashMap::new(),
            peers: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn room(&self, room_id: &RoomId) -> Option<&RoomState> {
        self.rooms.get(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn connect(&mut self, room_id: RoomId, tx: PeerTx) -> ParticipantId {
        let id = ParticipantId(self.next_id);
        self.next_id += 1;
        self.peers.insert(
            id,
            Peer {
                room_id: room_id.clone(),
                tx,
            },
        );
        let settings = self.settings;
        let room = self
            .rooms
            .entry(room_id.clone())
            .or_insert_with(|| RoomState::new(room_id.clone(), settings));
        let out = room.connect(id);
        self.deliver(&room_id, out);
        id
    }

    pub fn handle(&mut self, id: ParticipantId, msg: ClientMsg, now_ms: u64) {
        let Some(room_id) = self.peers.get(&id).map(|peer| peer.room_id.clone()) else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        let out = room.handle(id, msg, now_ms);
        self.deliver(&room_id, out);
    }

    /// A peer whose queue is full gets disconnected; it recovers state on
    /// reconnect through the join replay.
    pub fn send_to(&mut self, id: ParticipantId, msg: ServerMsg) {
        if self.offer(id, msg) {
            self.disconnect(id);
        }
    }

    /// Returns true when the peer's queue is full. Cursor updates are shed
    /// once less than a quarter of the queue is free.
    fn offer(&self, id: ParticipantId, msg: ServerMsg) -> bool {
        let Some(peer) = self.peers.get(&id) else {
            return false;
        };
        if matches!(msg, ServerMsg::CursorUpdate(_))
            && peer.tx.capacity() * 4 < peer.tx.max_capacity()
        {
            tracing::trace!(participant = %id, "cursor update shed");
            return false;
        }
        match peer.tx.try_send(msg) {
            Ok(()) | Err(TrySendError::Closed(_)) => false,
            Err(TrySendError::Full(msg)) => {
                tracing::warn!(participant = %id, event = msg.event(), "peer queue full");
                true
            }
        }
    }

    pub fn disconnect(&mut self, id: ParticipantId) {
        let Some(peer) = self.peers.remove(&id) else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&peer.room_id) else {
            return;
        };
        let out = room.leave(id);
        if room.is_empty() {
            tracing::info!(room = %peer.room_id, "room closed");
            self.rooms.remove(&peer.room_id);
            return;
        }
        self.deliver(&peer.room_id, out);
    }

    /// Expires idle leases in every room.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        let mut batches = Vec::new();
        for (room_id, room) in self.rooms.iter_mut() {
            let out = room.expire_leases(now_ms);
            if !out.is_empty() {
                batches.push((room_id.clone(), out));
            }
        }
        let mut expired = 0;
        for (room_id, out) in batches {
            expired += out.len();
            self.deliver(&room_id, out);
        }
        expired
    }

    fn deliver(&mut self, room_id: &RoomId, out: Vec<Outgoing>) {
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };
        let mut stalled = Vec::new();
        for Outgoing { to, msg } in out {
            let targets: Vec<ParticipantId> = match to {
                Recipients::One(id) => vec![id],
                Recipients::All | Recipients::AllExcept(_) => {
                    room.members().filter(|member| to.includes(*member)).collect()
                }
            };
            for member in targets {
                if !stalled.contains(&member) && self.offer(member, msg.clone()) {
                    stalled.push(member);
                }
            }
        }
        for id in stalled {
            self.disconnect(id);
        }
    }
}
