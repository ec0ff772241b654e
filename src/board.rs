use std::collections::BTreeMap;

use bglab_core::protocol::{PieceOwner, PieceRotation, PieceUpdate};
use bglab_core::{
    BoardLayout, ClientMsg, ConflictPolicy, ParticipantId, PieceId, Point, RoomId, ScreenPoint,
    Viewport,
};

use crate::config::SyncConfig;
use crate::draggable::{ControllerSettings, DragEnd, PieceController};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PieceKey {
    pub piece_id: PieceId,
    pub generation: u32,
}

/// Ties pointer events to the gesture that started them. A handle from
/// before a reset no longer matches any controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragHandle {
    key: PieceKey,
}

impl DragHandle {
    pub fn piece_id(&self) -> &PieceId {
        &self.key.piece_id
    }

    pub fn generation(&self) -> u32 {
        self.key.generation
    }
}

/// Every piece controller of one room, rebuilt from the layout on reset.
#[derive(Debug, Clone)]
pub struct Board {
    layout: BoardLayout,
    room_id: RoomId,
    generation: u32,
    settings: ControllerSettings,
    controllers: BTreeMap<PieceKey, PieceController>,
}

impl Board {
    pub fn new(layout: BoardLayout, room_id: RoomId, config: &SyncConfig) -> Self {
        let settings = ControllerSettings {
            frame: layout.frame,
            grid: if config.snap_to_grid { layout.grid } else { None },
            drag_interval_ms: config.drag_interval_ms,
            rotation_sync: config.rotation_sync,
            ..ControllerSettings::default()
        };
        let mut board = Self {
            layout,
            room_id,
            generation: 0,
            settings,
            controllers: BTreeMap::new(),
        };
        board.rebuild(0);
        board
    }

    pub fn layout(&self) -> &BoardLayout {
        &self.layout
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Discards every controller, drag state included, and starts over
    /// from the initial layout.
    pub fn rebuild(&mut self, generation: u32) {
        self.generation = generation;
        self.controllers = self
            .layout
            .pieces
            .iter()
            .map(|spec| {
                let key = PieceKey {
                    piece_id: spec.piece_id.clone(),
                    generation,
                };
                let controller =
                    PieceController::new(spec, self.room_id.clone(), generation, self.settings);
                (key, controller)
            })
            .collect();
        tracing::debug!(generation, pieces = self.controllers.len(), "board rebuilt");
    }

    pub fn set_local(&mut self, local: Option<ParticipantId>) {
        self.settings.local = local;
        for controller in self.controllers.values_mut() {
            controller.set_local(local);
        }
    }

    pub fn set_policy(&mut self, policy: ConflictPolicy) {
        self.settings.policy = policy;
        for controller in self.controllers.values_mut() {
            controller.set_policy(policy);
        }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.settings.policy
    }

    fn key(&self, piece_id: &PieceId) -> PieceKey {
        PieceKey {
            piece_id: piece_id.clone(),
            generation: self.generation,
        }
    }

    pub fn controller(&self, piece_id: &PieceId) -> Option<&PieceController> {
        self.controllers.get(&self.key(piece_id))
    }

    fn controller_mut(&mut self, piece_id: &PieceId) -> Option<&mut PieceController> {
        let key = self.key(piece_id);
        self.controllers.get_mut(&key)
    }

    pub fn position(&self, piece_id: &PieceId) -> Option<Point> {
        self.controller(piece_id).map(PieceController::position)
    }

    pub fn positions(&self) -> Vec<(PieceId, Point)> {
        self.controllers
            .values()
            .map(|controller| (controller.piece_id().clone(), controller.position()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn begin_drag(
        &mut self,
        piece_id: &PieceId,
        screen: ScreenPoint,
        viewport: Option<&Viewport>,
        now_ms: u64,
        out: &mut Vec<ClientMsg>,
    ) -> Option<DragHandle> {
        let key = self.key(piece_id);
        let Some(controller) = self.controllers.get_mut(&key) else {
            tracing::debug!(piece = %piece_id, "drag on unknown piece");
            return None;
        };
        controller
            .pointer_down(screen, viewport, now_ms, out)
            .then_some(DragHandle { key })
    }

    pub fn drag_move(
        &mut self,
        handle: &DragHandle,
        screen: ScreenPoint,
        viewport: Option<&Viewport>,
        now_ms: u64,
        out: &mut Vec<ClientMsg>,
    ) -> bool {
        self.controllers
            .get_mut(&handle.key)
            .is_some_and(|controller| controller.pointer_move(screen, viewport, now_ms, out))
    }

    pub fn end_drag(
        &mut self,
        handle: DragHandle,
        screen: Option<ScreenPoint>,
        viewport: Option<&Viewport>,
        now_ms: u64,
        out: &mut Vec<ClientMsg>,
    ) -> Option<DragEnd> {
        let Some(controller) = self.controllers.get_mut(&handle.key) else {
            tracing::debug!(
                piece = %handle.key.piece_id,
                generation = handle.key.generation,
                "stale drag ignored"
            );
            return None;
        };
        controller.pointer_up(screen, viewport, now_ms, out)
    }

    pub fn double_activate(&mut self, piece_id: &PieceId, out: &mut Vec<ClientMsg>) -> Option<u16> {
        self.controller_mut(piece_id)
            .map(|controller| controller.double_activate(out))
    }

    pub fn apply_update(&mut self, update: &PieceUpdate) -> bool {
        if update.generation != self.generation {
            tracing::trace!(
                piece = %update.piece_id,
                generation = update.generation,
                current = self.generation,
                "update for another generation"
            );
            return false;
        }
        self.controller_mut(&update.piece_id)
            .is_some_and(|controller| controller.apply_remote(update))
    }

    pub fn apply_owner(&mut self, owner: &PieceOwner) -> bool {
        self.controller_mut(&owner.piece_id)
            .is_some_and(|controller| controller.apply_owner(owner.owner))
    }

    pub fn apply_rotation(&mut self, rotation: &PieceRotation) -> bool {
        if rotation.generation != self.generation {
            return false;
        }
        self.controller_mut(&rotation.piece_id)
            .is_some_and(|controller| controller.apply_rotation(rotation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bglab_core::layout::amanogawa;

    fn board() -> Board {
        Board::new(
            amanogawa(),
            RoomId::parse("AbCdEfGh12").unwrap(),
            &SyncConfig::default(),
        )
    }

    #[test]
    fn rebuild_restores_initial_positions() {
        let mut board = board();
        let piece = PieceId::new("piece-0").unwrap();
        let initial = board.position(&piece).unwrap();
        board.apply_update(&PieceUpdate {
            piece_id: piece.clone(),
            x: 0.9,
            y: 0.9,
            generation: 0,
            source: None,
        });
        assert_ne!(board.position(&piece), Some(initial));
        board.rebuild(1);
        assert_eq!(board.position(&piece), Some(initial));
        assert_eq!(board.len(), 26);
    }

    #[test]
    fn handles_from_before_reset_are_ignored() {
        let mut board = board();
        let viewport = Viewport::new(0.0, 0.0, 1.0).unwrap();
        let piece = PieceId::new("player").unwrap();
        let mut out = Vec::new();
        let handle = board
            .begin_drag(&piece, ScreenPoint::new(500.0, 960.0), Some(&viewport), 0, &mut out)
            .unwrap();
        board.rebuild(1);
        assert!(!board.drag_move(
            &handle,
            ScreenPoint::new(10.0, 10.0),
            Some(&viewport),
            60,
            &mut out
        ));
        assert!(board
            .end_drag(handle, Some(ScreenPoint::new(10.0, 10.0)), Some(&viewport), 70, &mut out)
            .is_none());
        assert!(out.is_empty());
        assert!(!board.controller(&piece).unwrap().is_dragging());
    }

    #[test]
    fn updates_for_other_generations_are_dropped() {
        let mut board = board();
        board.rebuild(3);
        let update = |generation| PieceUpdate {
            piece_id: PieceId::new("piece-2").unwrap(),
            x: 0.7,
            y: 0.7,
            generation,
            source: None,
        };
        assert!(!board.apply_update(&update(2)));
        assert!(!board.apply_update(&update(4)));
        assert!(board.apply_update(&update(3)));
        assert!(!board.apply_update(&PieceUpdate {
            piece_id: PieceId::new("piece-99").unwrap(),
            ..update(3)
        }));
    }
}
