use std::rc::Rc;

use bglab::{
    ChannelTransport, Clock, ManualClock, RemoteCursors, RoomClient, SyncConfig, Throttle,
    Transport,
};
use bglab_core::protocol::{CursorUpdate, ResetNotice};
use bglab_core::{
    decode_client, encode_client, layout_by_slug, BoardLayout, ClientMsg, FramePoint,
    ParticipantId, PieceId, PieceSpec, Point, ReferenceFrame, RoomId, ScalePolicy, ScreenPoint,
    ServerMsg, Viewport, WireFormat,
};
use bglab_relay::{Outgoing, RoomSettings, RoomState};
use proptest::prelude::*;

const ROOM: &str = "AbCdEfGh12";

fn room_id() -> RoomId {
    RoomId::parse(ROOM).unwrap()
}

fn piece(name: &str) -> PieceId {
    PieceId::new(name).unwrap()
}

fn px(frame: &ReferenceFrame, x: f32, y: f32) -> Point {
    frame.normalize(FramePoint::new(x, y))
}

/// Default 1600x900 frame with piece-3 at (50,50) and piece-1 at (95,95).
fn test_layout() -> BoardLayout {
    let frame = ReferenceFrame::default();
    BoardLayout {
        slug: "test-board",
        frame,
        scale_policy: ScalePolicy::Fit,
        grid: None,
        pieces: vec![
            PieceSpec::new(piece("piece-1"), px(&frame, 95.0, 95.0)),
            PieceSpec::new(piece("piece-3"), px(&frame, 50.0, 50.0)),
        ],
    }
}

fn identity_viewport() -> Viewport {
    Viewport::new(0.0, 0.0, 1.0).unwrap()
}

/// One participant: the client plus handles the test drives it through.
struct Seat {
    id: ParticipantId,
    client: RoomClient,
    transport: ChannelTransport,
    clock: Rc<ManualClock>,
}

/// In-process relay that pumps client outboxes through a `RoomState`.
struct LocalRelay {
    room: RoomState,
    peers: Vec<(ParticipantId, ChannelTransport)>,
    now_ms: u64,
}

impl LocalRelay {
    fn new() -> Self {
        Self {
            room: RoomState::new(room_id(), RoomSettings::default()),
            peers: Vec::new(),
            now_ms: 0,
        }
    }

    fn seat(&mut self, config: &SyncConfig) -> Seat {
        let transport = ChannelTransport::new();
        let clock = Rc::new(ManualClock::new(0));
        let client = RoomClient::new(
            room_id(),
            test_layout(),
            config,
            Rc::new(transport.clone()) as Rc<dyn Transport>,
            Rc::clone(&clock) as Rc<dyn Clock>,
        );
        let id = ParticipantId(self.peers.len() as u64 + 1);
        self.peers.push((id, transport.clone()));
        let out = self.room.connect(id);
        self.deliver(out);
        Seat {
            id,
            client,
            transport,
            clock,
        }
    }

    fn deliver(&self, out: Vec<Outgoing>) {
        for Outgoing { to, msg } in out {
            for (id, transport) in &self.peers {
                if to.includes(*id) {
                    transport.deliver(&msg);
                }
            }
        }
    }

    /// Runs until every outbox is empty; returns the number of relayed frames.
    fn pump(&mut self) -> usize {
        let mut total = 0;
        loop {
            let mut handled = 0;
            for index in 0..self.peers.len() {
                let (id, transport) = self.peers[index].clone();
                for msg in transport.drain_sent() {
                    let out = self.room.handle(id, msg, self.now_ms);
                    self.deliver(out);
                    handled += 1;
                }
            }
            if handled == 0 {
                return total;
            }
            total += handled;
        }
    }
}

fn assert_near(actual: Option<Point>, frame: &ReferenceFrame, x: f32, y: f32) {
    let actual = frame.to_frame(actual.expect("piece is on the board"));
    assert!(
        (actual.x - x).abs() < 1e-2 && (actual.y - y).abs() < 1e-2,
        "expected ({x},{y}), got ({},{})",
        actual.x,
        actual.y
    );
}

proptest! {
    #[test]
    fn throttle_admits_at_most_one_per_interval(
        interval in 1u64..200,
        mut samples in proptest::collection::vec(0u64..5_000, 1..200),
    ) {
        samples.sort_unstable();
        let mut throttle = Throttle::new(interval);
        let mut accepted = Vec::new();
        for now in &samples {
            if throttle.try_acquire(*now) {
                accepted.push(*now);
            }
        }
        let elapsed = samples[samples.len() - 1] - samples[0];
        prop_assert!(accepted.len() as u64 <= elapsed / interval + 1);
        prop_assert_eq!(accepted.first(), samples.first());
        for pair in accepted.windows(2) {
            prop_assert!(pair[1] - pair[0] >= interval);
        }
    }
}

#[test]
fn own_cursor_never_renders() {
    let mut cursors = RemoteCursors::new(10_000);
    cursors.set_local(Some(ParticipantId(1)));
    let own = CursorUpdate {
        participant_id: ParticipantId(1),
        x: 0.5,
        y: 0.5,
    };
    assert!(!cursors.apply(&own, 0));
    assert!(cursors.is_empty());

    let mut relay = LocalRelay::new();
    let config = SyncConfig::default();
    let alice = relay.seat(&config);
    let bob = relay.seat(&config);
    relay.pump();
    assert!(alice.client.pointer_moved(ScreenPoint::new(800.0, 450.0), Some(&identity_viewport())));
    relay.pump();
    assert_eq!(alice.client.cursor_count(), 0);
    let seen = bob.client.cursor_position(alice.id).unwrap();
    assert!(seen.approx_eq(Point::new(0.5, 0.5), 1e-6));
}

#[test]
fn last_broadcast_wins() {
    let mut relay = LocalRelay::new();
    let config = SyncConfig::default();
    let alice = relay.seat(&config);
    let bob = relay.seat(&config);
    let carol = relay.seat(&config);
    relay.pump();
    let viewport = identity_viewport();
    let frame = ReferenceFrame::default();

    let handle = alice
        .client
        .begin_drag(&piece("piece-1"), ScreenPoint::new(95.0, 95.0), Some(&viewport))
        .unwrap();
    alice
        .client
        .end_drag(handle, Some(ScreenPoint::new(400.0, 400.0)), Some(&viewport));
    relay.pump();
    assert_near(bob.client.piece_position(&piece("piece-1")), &frame, 400.0, 400.0);
    let handle = bob
        .client
        .begin_drag(&piece("piece-1"), ScreenPoint::new(400.0, 400.0), Some(&viewport))
        .unwrap();
    bob.client
        .end_drag(handle, Some(ScreenPoint::new(700.0, 200.0)), Some(&viewport));
    relay.pump();

    for seat in [&alice, &bob, &carol] {
        assert_near(seat.client.piece_position(&piece("piece-1")), &frame, 700.0, 200.0);
    }
}

#[test]
fn final_broadcast_is_release_minus_offset() {
    let transport = ChannelTransport::new();
    let clock = Rc::new(ManualClock::new(1_000));
    let client = RoomClient::new(
        room_id(),
        test_layout(),
        &SyncConfig::default(),
        Rc::new(transport.clone()) as Rc<dyn Transport>,
        Rc::clone(&clock) as Rc<dyn Clock>,
    );
    let viewport = identity_viewport();
    let frame = ReferenceFrame::default();

    let handle = client
        .begin_drag(&piece("piece-1"), ScreenPoint::new(100.0, 100.0), Some(&viewport))
        .unwrap();
    for step in 1..=40 {
        clock.advance(3);
        let t = step as f32 / 40.0;
        client.drag_to(
            &handle,
            ScreenPoint::new(100.0 + 80.0 * t, 100.0 + 20.0 * t),
            Some(&viewport),
        );
    }
    clock.advance(1);
    let end = client
        .end_drag(handle, Some(ScreenPoint::new(200.0, 150.0)), Some(&viewport))
        .unwrap();
    assert_near(Some(end.position), &frame, 195.0, 145.0);

    let sent = transport.drain_sent();
    let moves: Vec<Point> = sent
        .iter()
        .filter_map(|msg| match msg {
            ClientMsg::DraggableMoved(moved) => Some(moved.point()),
            _ => None,
        })
        .collect();
    // 120 ms of samples at a 50 ms interval, plus the release.
    assert!(moves.len() <= 4, "sent {} moves", moves.len());
    assert_near(moves.last().copied(), &frame, 195.0, 145.0);
}

#[test]
fn repeated_reset_notice_is_idempotent() {
    let mut relay = LocalRelay::new();
    let config = SyncConfig::default();
    let alice = relay.seat(&config);
    let bob = relay.seat(&config);
    relay.pump();
    let viewport = identity_viewport();
    let frame = ReferenceFrame::default();

    let handle = alice
        .client
        .begin_drag(&piece("piece-3"), ScreenPoint::new(50.0, 50.0), Some(&viewport))
        .unwrap();
    alice
        .client
        .end_drag(handle, Some(ScreenPoint::new(600.0, 600.0)), Some(&viewport));
    relay.pump();
    assert_near(bob.client.piece_position(&piece("piece-3")), &frame, 600.0, 600.0);

    bob.client.request_reset();
    relay.pump();
    for seat in [&alice, &bob] {
        assert_eq!(seat.client.generation(), 1);
        assert_near(seat.client.piece_position(&piece("piece-3")), &frame, 50.0, 50.0);
    }

    let duplicate = ServerMsg::ResetDraggable(ResetNotice {
        generation: Some(1),
    });
    bob.transport.deliver(&duplicate);
    bob.transport.deliver(&duplicate);
    assert_eq!(bob.client.generation(), 1);
    assert_near(bob.client.piece_position(&piece("piece-3")), &frame, 50.0, 50.0);
}

#[test]
fn consecutive_resets_each_restore_the_layout() {
    let mut relay = LocalRelay::new();
    let config = SyncConfig::default();
    let alice = relay.seat(&config);
    let bob = relay.seat(&config);
    relay.pump();
    let viewport = identity_viewport();
    let frame = ReferenceFrame::default();
    let layout = test_layout();

    let drag = |from: (f32, f32), to: (f32, f32)| {
        let handle = alice
            .client
            .begin_drag(&piece("piece-3"), ScreenPoint::new(from.0, from.1), Some(&viewport))
            .unwrap();
        alice
            .client
            .end_drag(handle, Some(ScreenPoint::new(to.0, to.1)), Some(&viewport));
    };

    drag((50.0, 50.0), (600.0, 600.0));
    relay.pump();
    bob.client.request_reset();
    relay.pump();
    for expected in [1, 2] {
        for seat in [&alice, &bob] {
            assert_eq!(seat.client.generation(), expected);
            for spec in &layout.pieces {
                assert_eq!(seat.client.piece_position(&spec.piece_id), Some(spec.initial));
            }
        }
        if expected == 1 {
            drag((50.0, 50.0), (800.0, 300.0));
            relay.pump();
            assert_near(bob.client.piece_position(&piece("piece-3")), &frame, 800.0, 300.0);
            alice.client.request_reset();
            relay.pump();
        }
    }
}

#[test]
fn drag_past_the_board_edge_stays_on_the_wire() {
    let layout = layout_by_slug("amanogawa").unwrap();
    let frame = layout.frame;
    let transport = ChannelTransport::new();
    let clock = Rc::new(ManualClock::new(0));
    let client = RoomClient::new(
        room_id(),
        layout,
        &SyncConfig::default(),
        Rc::new(transport.clone()) as Rc<dyn Transport>,
        Rc::clone(&clock) as Rc<dyn Clock>,
    );
    // 3440x1440 window: the 1000 px wide board sits centered at scale 1.
    let viewport = Viewport::new(1220.0, 0.0, 1.0).unwrap();
    let player = piece("player");
    let start = viewport.to_screen(&frame, client.piece_position(&player).unwrap());
    let handle = client.begin_drag(&player, start, Some(&viewport)).unwrap();
    for step in 1..=10 {
        clock.advance(60);
        let x = start.x + (3400.0 - start.x) * step as f32 / 10.0;
        client.drag_to(&handle, ScreenPoint::new(x, start.y), Some(&viewport));
    }
    let end = client
        .end_drag(handle, Some(ScreenPoint::new(3400.0, start.y)), Some(&viewport))
        .unwrap();
    assert_eq!(end.position.x, 1.0);

    let sent = transport.drain_sent();
    assert!(sent.len() > 1);
    for format in [WireFormat::Json, WireFormat::Binary] {
        for msg in &sent {
            let frame = encode_client(msg, format).unwrap();
            assert_eq!(&decode_client(&frame).unwrap(), msg);
        }
    }
    let Some(ClientMsg::DraggableMoved(last)) = sent.last() else {
        panic!("release must end with draggable:moved");
    };
    assert_eq!(last.point(), end.position);
    assert_eq!(client.piece_position(&player), Some(end.position));
}

#[test]
fn drag_started_before_reset_goes_nowhere() {
    let mut relay = LocalRelay::new();
    let config = SyncConfig::default();
    let alice = relay.seat(&config);
    let bob = relay.seat(&config);
    relay.pump();
    let viewport = identity_viewport();
    let frame = ReferenceFrame::default();

    let handle = alice
        .client
        .begin_drag(&piece("piece-3"), ScreenPoint::new(50.0, 50.0), Some(&viewport))
        .unwrap();
    bob.client.request_reset();
    relay.pump();
    assert!(!alice.client.is_dragging(&piece("piece-3")));
    assert!(alice
        .client
        .end_drag(handle, Some(ScreenPoint::new(900.0, 100.0)), Some(&viewport))
        .is_none());
    assert_eq!(relay.pump(), 0);
    assert_near(bob.client.piece_position(&piece("piece-3")), &frame, 50.0, 50.0);
}

#[test]
fn remote_drag_converges_on_release_point() {
    let mut relay = LocalRelay::new();
    let config = SyncConfig::default();
    let alice = relay.seat(&config);
    let bob = relay.seat(&config);
    relay.pump();
    assert_ne!(alice.client.participant_id(), bob.client.participant_id());
    let viewport = identity_viewport();
    let frame = ReferenceFrame::default();
    let piece_3 = piece("piece-3");

    let handle = alice
        .client
        .begin_drag(&piece_3, ScreenPoint::new(50.0, 50.0), Some(&viewport))
        .unwrap();
    for step in 1..=25 {
        alice.clock.advance(16);
        let t = step as f32 / 25.0;
        alice.client.drag_to(
            &handle,
            ScreenPoint::new(50.0 + 250.0 * t, 50.0 + 70.0 * t),
            Some(&viewport),
        );
        if step % 5 == 0 {
            relay.pump();
        }
    }
    alice
        .client
        .end_drag(handle, Some(ScreenPoint::new(300.0, 120.0)), Some(&viewport));
    relay.pump();

    assert_near(bob.client.piece_position(&piece_3), &frame, 300.0, 120.0);
    assert_eq!(relay.pump(), 0);
    assert_eq!(
        alice.client.piece_position(&piece_3),
        bob.client.piece_position(&piece_3)
    );
    assert_eq!(bob.transport.pending(), 0);
}
