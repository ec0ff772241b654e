use bglab_core::layout::PieceSpec;
use bglab_core::protocol::{PieceGrab, PieceMoved, PieceRotate, PieceRotation, PieceUpdate};
use bglab_core::{
    ClientMsg, ConflictPolicy, GridBounds, ParticipantId, PieceId, Point, ReferenceFrame, RoomId,
    ScreenPoint, Viewport,
};

use crate::config::RotationSync;
use crate::throttle::Throttle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    Idle,
    /// `offset` is pointer minus piece position at grab time.
    Dragging { offset: Point, last_pointer: Point },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragEnd {
    pub piece_id: PieceId,
    pub position: Point,
    pub generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSettings {
    pub frame: ReferenceFrame,
    pub grid: Option<GridBounds>,
    pub drag_interval_ms: u64,
    pub rotation_sync: RotationSync,
    pub policy: ConflictPolicy,
    pub local: Option<ParticipantId>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            frame: ReferenceFrame::default(),
            grid: None,
            drag_interval_ms: crate::config::DRAG_INTERVAL_MS_DEFAULT,
            rotation_sync: RotationSync::Local,
            policy: ConflictPolicy::LastWriterWins,
            local: None,
        }
    }
}

/// Local state of one draggable piece within one room generation.
#[derive(Debug, Clone)]
pub struct PieceController {
    piece_id: PieceId,
    room_id: RoomId,
    generation: u32,
    settings: ControllerSettings,
    position: Point,
    rotation_deg: u16,
    state: DragState,
    throttle: Throttle,
    owner: Option<ParticipantId>,
}

impl PieceController {
    pub fn new(
        spec: &PieceSpec,
        room_id: RoomId,
        generation: u32,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            piece_id: spec.piece_id.clone(),
            room_id,
            generation,
            settings,
            position: spec.initial,
            rotation_deg: 0,
            state: DragState::Idle,
            throttle: Throttle::new(settings.drag_interval_ms),
            owner: None,
        }
    }

    pub fn piece_id(&self) -> &PieceId {
        &self.piece_id
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn rotation_deg(&self) -> u16 {
        self.rotation_deg
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn owner(&self) -> Option<ParticipantId> {
        self.owner
    }

    pub fn set_local(&mut self, local: Option<ParticipantId>) {
        self.settings.local = local;
    }

    pub fn set_policy(&mut self, policy: ConflictPolicy) {
        self.settings.policy = policy;
    }

    fn held_by_other(&self) -> bool {
        matches!(self.owner, Some(owner) if Some(owner) != self.settings.local)
    }

    fn leased(&self) -> bool {
        self.settings.policy == ConflictPolicy::Lease
    }

    fn pointer(&self, screen: ScreenPoint, viewport: &Viewport) -> Point {
        viewport.to_room_relative(&self.settings.frame, screen)
    }

    fn moved_msg(&self) -> ClientMsg {
        ClientMsg::DraggableMoved(PieceMoved {
            room_id: self.room_id.to_string(),
            piece_id: self.piece_id.clone(),
            x: self.position.x,
            y: self.position.y,
            generation: self.generation,
        })
    }

    fn grab_msg(&self) -> PieceGrab {
        PieceGrab {
            room_id: self.room_id.to_string(),
            piece_id: self.piece_id.clone(),
            generation: self.generation,
        }
    }

    /// Starts a gesture. An unmounted board or a piece leased to someone
    /// else leaves the controller untouched.
    pub fn pointer_down(
        &mut self,
        screen: ScreenPoint,
        viewport: Option<&Viewport>,
        now_ms: u64,
        out: &mut Vec<ClientMsg>,
    ) -> bool {
        let Some(viewport) = viewport else {
            tracing::debug!(piece = %self.piece_id, "drag aborted: board not mounted");
            return false;
        };
        if self.leased() && self.held_by_other() {
            tracing::debug!(
                piece = %self.piece_id,
                owner = ?self.owner,
                "drag refused: piece held"
            );
            return false;
        }
        let pointer = self.pointer(screen, viewport);
        self.state = DragState::Dragging {
            offset: pointer.offset_from(self.position),
            last_pointer: pointer,
        };
        self.throttle.reset();
        if self.leased() {
            self.owner = self.settings.local;
            out.push(ClientMsg::DraggableGrab(self.grab_msg()));
        }
        tracing::trace!(piece = %self.piece_id, now_ms, "drag start");
        true
    }

    /// Moves the piece under the pointer; broadcasts at most once per
    /// drag interval.
    pub fn pointer_move(
        &mut self,
        screen: ScreenPoint,
        viewport: Option<&Viewport>,
        now_ms: u64,
        out: &mut Vec<ClientMsg>,
    ) -> bool {
        let DragState::Dragging { offset, .. } = self.state else {
            return false;
        };
        let Some(viewport) = viewport else {
            return false;
        };
        let pointer = self.pointer(screen, viewport);
        self.position = pointer.minus(offset).clamp_to_frame();
        self.state = DragState::Dragging {
            offset,
            last_pointer: pointer,
        };
        if self.throttle.try_acquire(now_ms) {
            out.push(self.moved_msg());
        }
        true
    }

    /// Ends the gesture with one unthrottled broadcast of the final
    /// position. Without a release point the last sample is used.
    pub fn pointer_up(
        &mut self,
        screen: Option<ScreenPoint>,
        viewport: Option<&Viewport>,
        now_ms: u64,
        out: &mut Vec<ClientMsg>,
    ) -> Option<DragEnd> {
        let DragState::Dragging {
            offset,
            last_pointer,
        } = self.state
        else {
            return None;
        };
        let pointer = match (screen, viewport) {
            (Some(screen), Some(viewport)) => self.pointer(screen, viewport),
            _ => last_pointer,
        };
        let mut position = pointer.minus(offset).clamp_to_frame();
        if let Some(grid) = self.settings.grid {
            let frame = self.settings.frame;
            if let Some(center) = grid.snap(frame.to_frame(position)) {
                position = frame.normalize(center);
            }
        }
        self.position = position;
        self.state = DragState::Idle;
        self.throttle.mark(now_ms);
        out.push(self.moved_msg());
        if self.leased() {
            self.owner = None;
            out.push(ClientMsg::DraggableRelease(self.grab_msg()));
        }
        tracing::trace!(piece = %self.piece_id, x = position.x, y = position.y, "drag end");
        Some(DragEnd {
            piece_id: self.piece_id.clone(),
            position,
            generation: self.generation,
        })
    }

    /// Drops the gesture without broadcasting.
    pub fn cancel_drag(&mut self) -> bool {
        let was_dragging = self.is_dragging();
        self.state = DragState::Idle;
        was_dragging
    }

    /// Last writer wins, even mid-drag. Older generations are ignored.
    pub fn apply_remote(&mut self, update: &PieceUpdate) -> bool {
        if update.piece_id != self.piece_id || update.generation < self.generation {
            return false;
        }
        self.position = update.point();
        true
    }

    /// Returns true when the local drag was cancelled by the new owner.
    pub fn apply_owner(&mut self, owner: Option<ParticipantId>) -> bool {
        self.owner = owner;
        if self.leased() && self.held_by_other() && self.cancel_drag() {
            tracing::debug!(piece = %self.piece_id, owner = ?owner, "lost lease mid-drag");
            return true;
        }
        false
    }

    pub fn double_activate(&mut self, out: &mut Vec<ClientMsg>) -> u16 {
        self.rotation_deg = (self.rotation_deg + 90) % 360;
        if self.settings.rotation_sync == RotationSync::Shared {
            out.push(ClientMsg::DraggableRotate(PieceRotate {
                room_id: self.room_id.to_string(),
                piece_id: self.piece_id.clone(),
                rotation_deg: self.rotation_deg,
                generation: self.generation,
            }));
        }
        self.rotation_deg
    }

    pub fn apply_rotation(&mut self, rotation: &PieceRotation) -> bool {
        if self.settings.rotation_sync != RotationSync::Shared
            || rotation.piece_id != self.piece_id
            || rotation.generation < self.generation
        {
            return false;
        }
        self.rotation_deg = rotation.rotation_deg % 360;
        true
    }
}
