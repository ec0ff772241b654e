use bglab_core::protocol::{in_wire_range, CursorMoved};
use bglab_core::{ClientMsg, ParticipantId, ReferenceFrame, RoomId, ScreenPoint, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    min_interval_ms: u64,
    last_emit_ms: Option<u64>,
}

impl Throttle {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval_ms,
            last_emit_ms: None,
        }
    }

    pub fn min_interval_ms(&self) -> u64 {
        self.min_interval_ms
    }

    pub fn last_emit_ms(&self) -> Option<u64> {
        self.last_emit_ms
    }

    /// Claims an emission slot at `now`. A clock that steps backwards
    /// counts as no time elapsed.
    pub fn try_acquire(&mut self, now_ms: u64) -> bool {
        let ready = match self.last_emit_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.min_interval_ms,
        };
        if ready {
            self.last_emit_ms = Some(now_ms);
        }
        ready
    }

    /// Records an emission that bypassed the throttle.
    pub fn mark(&mut self, now_ms: u64) {
        self.last_emit_ms = Some(now_ms);
    }

    pub fn reset(&mut self) {
        self.last_emit_ms = None;
    }
}

/// Turns raw pointer samples into rate-limited `cursor:move` messages.
#[derive(Debug, Clone)]
pub struct PointerEmitter {
    room_id: RoomId,
    participant_id: Option<ParticipantId>,
    frame: ReferenceFrame,
    throttle: Throttle,
}

impl PointerEmitter {
    pub fn new(room_id: RoomId, frame: ReferenceFrame, min_interval_ms: u64) -> Self {
        Self {
            room_id,
            participant_id: None,
            frame,
            throttle: Throttle::new(min_interval_ms),
        }
    }

    pub fn set_participant(&mut self, participant_id: Option<ParticipantId>) {
        self.participant_id = participant_id;
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    /// `None` while the board is unmounted or the throttle is closed. An
    /// unmounted board does not consume the slot.
    pub fn sample(
        &mut self,
        screen: ScreenPoint,
        viewport: Option<&Viewport>,
        now_ms: u64,
    ) -> Option<ClientMsg> {
        let viewport = viewport?;
        let point = viewport.to_room_relative(&self.frame, screen);
        if !in_wire_range(point) {
            tracing::trace!(x = point.x, y = point.y, "pointer far off the board");
            return None;
        }
        if !self.throttle.try_acquire(now_ms) {
            return None;
        }
        Some(ClientMsg::CursorMove(CursorMoved {
            room_id: self.room_id.to_string(),
            participant_id: self.participant_id,
            x: point.x,
            y: point.y,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bglab_core::{decode_client, encode_client, WireFormat};

    fn emitter(interval: u64) -> PointerEmitter {
        PointerEmitter::new(
            RoomId::parse("AbCdEfGh12").unwrap(),
            ReferenceFrame::default(),
            interval,
        )
    }

    #[test]
    fn first_sample_always_passes() {
        let mut throttle = Throttle::new(100);
        assert!(throttle.try_acquire(5_000));
        assert!(!throttle.try_acquire(5_099));
        assert!(throttle.try_acquire(5_100));
        assert_eq!(throttle.last_emit_ms(), Some(5_100));
    }

    #[test]
    fn backwards_clock_does_not_open_the_throttle() {
        let mut throttle = Throttle::new(100);
        assert!(throttle.try_acquire(1_000));
        assert!(!throttle.try_acquire(10));
    }

    #[test]
    fn unmounted_board_does_not_consume_slot() {
        let mut emitter = emitter(100);
        let viewport = Viewport::new(0.0, 0.0, 1.0).unwrap();
        assert!(emitter.sample(ScreenPoint::new(1.0, 1.0), None, 0).is_none());
        assert_eq!(emitter.throttle().last_emit_ms(), None);
        assert!(emitter
            .sample(ScreenPoint::new(1.0, 1.0), Some(&viewport), 10)
            .is_some());
    }

    #[test]
    fn far_off_board_pointer_is_skipped_without_consuming_slot() {
        let mut emitter = emitter(100);
        let viewport = Viewport::new(0.0, 0.0, 1.0).unwrap();
        assert!(emitter
            .sample(ScreenPoint::new(4_000.0, 450.0), Some(&viewport), 0)
            .is_none());
        assert_eq!(emitter.throttle().last_emit_ms(), None);
        // Slightly past the edge is still a valid cursor.
        let msg = emitter
            .sample(ScreenPoint::new(1_700.0, 450.0), Some(&viewport), 0)
            .unwrap();
        let frame = encode_client(&msg, WireFormat::Json).unwrap();
        assert_eq!(decode_client(&frame).unwrap(), msg);
    }

    #[test]
    fn sample_emits_normalized_coordinates() {
        let mut emitter = emitter(50);
        emitter.set_participant(Some(ParticipantId(8)));
        let viewport = Viewport::new(100.0, 50.0, 0.5).unwrap();
        let msg = emitter
            .sample(ScreenPoint::new(500.0, 275.0), Some(&viewport), 0)
            .unwrap();
        let ClientMsg::CursorMove(cursor) = msg else {
            panic!("expected cursor move");
        };
        assert_eq!(cursor.participant_id, Some(ParticipantId(8)));
        assert!((cursor.x - 0.5).abs() < 1e-6);
        assert!((cursor.y - 0.5).abs() < 1e-6);
        assert_eq!(cursor.room_id, "AbCdEfGh12");
    }
}
