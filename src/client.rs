use std::cell::RefCell;
use std::rc::Rc;

use bglab_core::protocol::{JoinRoom, Ping, Welcome};
use bglab_core::{
    BoardLayout, ClientMsg, ConflictPolicy, ParticipantId, PieceId, Point, RoomId, ScreenPoint,
    ServerEvent, ServerMsg, Viewport,
};

use crate::board::{Board, DragHandle};
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::cursor::{CursorLayer, CursorSprite, RemoteCursors};
use crate::draggable::DragEnd;
use crate::reset::ResetCoordinator;
use crate::roster::Roster;
use crate::throttle::PointerEmitter;
use crate::transport::{SubscriptionId, Transport};

pub type DragEndHook = Rc<dyn Fn(&DragEnd)>;

struct ClientState {
    participant_id: Option<ParticipantId>,
    roster: Roster,
    board: Board,
    reset: ResetCoordinator,
    emitter: PointerEmitter,
    last_error: Option<(String, String)>,
}

/// One participant's view of a room: pointer emission, remote cursors and
/// every draggable piece, wired to a transport.
pub struct RoomClient {
    room_id: RoomId,
    transport: Rc<dyn Transport>,
    clock: Rc<dyn Clock>,
    state: Rc<RefCell<ClientState>>,
    cursors: Rc<RefCell<RemoteCursors>>,
    cursor_layer: CursorLayer,
    subscriptions: Vec<SubscriptionId>,
    on_drag_end: RefCell<Option<DragEndHook>>,
}

impl RoomClient {
    pub fn new(
        room_id: RoomId,
        layout: BoardLayout,
        config: &SyncConfig,
        transport: Rc<dyn Transport>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let frame = layout.frame;
        let state = Rc::new(RefCell::new(ClientState {
            participant_id: None,
            roster: Roster::default(),
            board: Board::new(layout, room_id.clone(), config),
            reset: ResetCoordinator::new(room_id.clone()),
            emitter: PointerEmitter::new(room_id.clone(), frame, config.pointer_interval_ms),
            last_error: None,
        }));
        let cursors = Rc::new(RefCell::new(RemoteCursors::new(config.cursor_ttl_ms)));
        let cursor_layer =
            CursorLayer::attach(Rc::clone(&transport), Rc::clone(&cursors), Rc::clone(&clock));
        let subscriptions = subscribe_state(&*transport, &state, &cursors);
        Self {
            room_id,
            transport,
            clock,
            state,
            cursors,
            cursor_layer,
            subscriptions,
            on_drag_end: RefCell::new(None),
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn participant_id(&self) -> Option<ParticipantId> {
        self.state.borrow().participant_id
    }

    pub fn generation(&self) -> u32 {
        self.state.borrow().board.generation()
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.state.borrow().board.policy()
    }

    pub fn roster(&self) -> Roster {
        self.state.borrow().roster.clone()
    }

    pub fn last_error(&self) -> Option<(String, String)> {
        self.state.borrow().last_error.clone()
    }

    pub fn set_on_drag_end(&self, hook: Option<DragEndHook>) {
        *self.on_drag_end.borrow_mut() = hook;
    }

    fn send_all(&self, out: Vec<ClientMsg>) {
        for msg in out {
            self.transport.send(msg);
        }
    }

    pub fn join(&self, display_name: &str) {
        self.transport.send(ClientMsg::Join(JoinRoom {
            room_id: self.room_id.to_string(),
            display_name: display_name.trim().to_string(),
        }));
    }

    pub fn ping(&self, nonce: u64) {
        self.transport.send(ClientMsg::Ping(Ping { nonce: Some(nonce) }));
    }

    pub fn pointer_moved(&self, screen: ScreenPoint, viewport: Option<&Viewport>) -> bool {
        let now = self.clock.now_ms();
        let msg = self.state.borrow_mut().emitter.sample(screen, viewport, now);
        match msg {
            Some(msg) => {
                self.transport.send(msg);
                true
            }
            None => false,
        }
    }

    pub fn begin_drag(
        &self,
        piece_id: &PieceId,
        screen: ScreenPoint,
        viewport: Option<&Viewport>,
    ) -> Option<DragHandle> {
        let now = self.clock.now_ms();
        let mut out = Vec::new();
        let handle = self
            .state
            .borrow_mut()
            .board
            .begin_drag(piece_id, screen, viewport, now, &mut out);
        self.send_all(out);
        handle
    }

    pub fn drag_to(
        &self,
        handle: &DragHandle,
        screen: ScreenPoint,
        viewport: Option<&Viewport>,
    ) -> bool {
        let now = self.clock.now_ms();
        let mut out = Vec::new();
        let moved = self
            .state
            .borrow_mut()
            .board
            .drag_move(handle, screen, viewport, now, &mut out);
        self.send_all(out);
        moved
    }

    pub fn end_drag(
        &self,
        handle: DragHandle,
        screen: Option<ScreenPoint>,
        viewport: Option<&Viewport>,
    ) -> Option<DragEnd> {
        let now = self.clock.now_ms();
        let mut out = Vec::new();
        let end = self
            .state
            .borrow_mut()
            .board
            .end_drag(handle, screen, viewport, now, &mut out);
        self.send_all(out);
        let hook = self.on_drag_end.borrow().clone();
        if let (Some(end), Some(hook)) = (end.as_ref(), hook) {
            (hook)(end);
        }
        end
    }

    pub fn double_activate(&self, piece_id: &PieceId) -> Option<u16> {
        let mut out = Vec::new();
        let rotation = self.state.borrow_mut().board.double_activate(piece_id, &mut out);
        self.send_all(out);
        rotation
    }

    pub fn request_reset(&self) {
        let msg = self.state.borrow().reset.request();
        self.transport.send(msg);
    }

    pub fn piece_position(&self, piece_id: &PieceId) -> Option<Point> {
        self.state.borrow().board.position(piece_id)
    }

    pub fn piece_rotation(&self, piece_id: &PieceId) -> Option<u16> {
        self.state
            .borrow()
            .board
            .controller(piece_id)
            .map(|controller| controller.rotation_deg())
    }

    pub fn is_dragging(&self, piece_id: &PieceId) -> bool {
        self.state
            .borrow()
            .board
            .controller(piece_id)
            .is_some_and(|controller| controller.is_dragging())
    }

    pub fn board_positions(&self) -> Vec<(PieceId, Point)> {
        self.state.borrow().board.positions()
    }

    pub fn cursor_position(&self, participant_id: ParticipantId) -> Option<Point> {
        self.cursors.borrow().position(participant_id)
    }

    pub fn cursor_count(&self) -> usize {
        self.cursors.borrow().len()
    }

    pub fn set_cursors_visible(&self, visible: bool) {
        self.cursors.borrow_mut().set_visible(visible);
    }

    pub fn render_cursors(&self, viewport: &Viewport) -> Vec<CursorSprite> {
        let state = self.state.borrow();
        let frame = state.board.layout().frame;
        self.cursors.borrow().render(&state.roster, viewport, &frame)
    }

    /// Periodic housekeeping; drops cursors that went quiet.
    pub fn tick(&self) -> usize {
        self.cursors.borrow_mut().evict_stale(self.clock.now_ms())
    }

    pub fn shutdown(&mut self) {
        self.cursor_layer.detach();
        for id in self.subscriptions.drain(..) {
            self.transport.unsubscribe(id);
        }
    }
}

impl Drop for RoomClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn apply_welcome(
    state: &RefCell<ClientState>,
    cursors: &RefCell<RemoteCursors>,
    welcome: &Welcome,
) {
    let mut state = state.borrow_mut();
    let local = Some(welcome.participant_id);
    state.participant_id = local;
    state.emitter.set_participant(local);
    state.board.set_local(local);
    state.board.set_policy(welcome.policy);
    if state.reset.sync(welcome.generation) || state.board.generation() != welcome.generation {
        state.board.rebuild(welcome.generation);
    }
    cursors.borrow_mut().set_local(local);
    tracing::info!(
        room = %welcome.room_id,
        participant = %welcome.participant_id,
        generation = welcome.generation,
        policy = ?welcome.policy,
        "joined room"
    );
}

fn subscribe_state(
    transport: &dyn Transport,
    state: &Rc<RefCell<ClientState>>,
    cursors: &Rc<RefCell<RemoteCursors>>,
) -> Vec<SubscriptionId> {
    let on_welcome = {
        let state = Rc::clone(state);
        let cursors = Rc::clone(cursors);
        Rc::new(move |msg: &ServerMsg| {
            if let ServerMsg::Welcome(welcome) = msg {
                apply_welcome(&state, &cursors, welcome);
            }
        })
    };
    let on_roster = {
        let state = Rc::clone(state);
        Rc::new(move |msg: &ServerMsg| {
            if let ServerMsg::Roster(roster) = msg {
                state.borrow_mut().roster.replace(roster.participants.clone());
            }
        })
    };
    let on_left = {
        let state = Rc::clone(state);
        Rc::new(move |msg: &ServerMsg| {
            if let ServerMsg::ParticipantLeft(left) = msg {
                state.borrow_mut().roster.remove(left.participant_id);
            }
        })
    };
    let on_update = {
        let state = Rc::clone(state);
        Rc::new(move |msg: &ServerMsg| {
            if let ServerMsg::DraggableUpdate(update) = msg {
                state.borrow_mut().board.apply_update(update);
            }
        })
    };
    let on_owner = {
        let state = Rc::clone(state);
        Rc::new(move |msg: &ServerMsg| {
            if let ServerMsg::DraggableOwner(owner) = msg {
                state.borrow_mut().board.apply_owner(owner);
            }
        })
    };
    let on_rotation = {
        let state = Rc::clone(state);
        Rc::new(move |msg: &ServerMsg| {
            if let ServerMsg::DraggableRotation(rotation) = msg {
                state.borrow_mut().board.apply_rotation(rotation);
            }
        })
    };
    let on_reset = {
        let state = Rc::clone(state);
        Rc::new(move |msg: &ServerMsg| {
            if let ServerMsg::ResetDraggable(notice) = msg {
                let mut state = state.borrow_mut();
                let generation = state.reset.on_reset(notice.generation);
                state.board.rebuild(generation);
            }
        })
    };
    let on_error = {
        let state = Rc::clone(state);
        Rc::new(move |msg: &ServerMsg| {
            if let ServerMsg::Error(err) = msg {
                tracing::warn!(code = %err.code, message = %err.message, "relay error");
                state.borrow_mut().last_error = Some((err.code.clone(), err.message.clone()));
            }
        })
    };
    vec![
        transport.subscribe(ServerEvent::Welcome, on_welcome),
        transport.subscribe(ServerEvent::Roster, on_roster),
        transport.subscribe(ServerEvent::ParticipantLeft, on_left),
        transport.subscribe(ServerEvent::DraggableUpdate, on_update),
        transport.subscribe(ServerEvent::DraggableOwner, on_owner),
        transport.subscribe(ServerEvent::DraggableRotation, on_rotation),
        transport.subscribe(ServerEvent::ResetDraggable, on_reset),
        transport.subscribe(ServerEvent::Error, on_error),
    ]
}
