use bglab_core::protocol::ResetRequest;
use bglab_core::{ClientMsg, RoomId};

/// Tracks the room generation. Every reset advances it; pieces built for an
/// older generation are stale.
#[derive(Debug, Clone)]
pub struct ResetCoordinator {
    room_id: RoomId,
    generation: u32,
}

impl ResetCoordinator {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn request(&self) -> ClientMsg {
        ClientMsg::ResetDraggable(ResetRequest {
            room_id: self.room_id.to_string(),
        })
    }

    /// Applies a reset notice and returns the generation to rebuild for.
    pub fn on_reset(&mut self, generation: Option<u32>) -> u32 {
        self.generation = match generation {
            Some(remote) => remote.max(self.generation),
            None => self.generation.saturating_add(1),
        };
        tracing::info!(generation = self.generation, "board reset");
        self.generation
    }

    /// Adopts the generation a (re)connect reports. The relay may have
    /// restarted, so this one can go down. Returns true on change.
    pub fn sync(&mut self, generation: u32) -> bool {
        if self.generation == generation {
            return false;
        }
        self.generation = generation;
        true
    }
}
