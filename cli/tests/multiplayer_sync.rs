use std::net::SocketAddr;
use std::rc::Rc;

use bglab::{ChannelTransport, Clock, RoomClient, SyncConfig, SystemClock, Transport};
use bglab_core::{
    decode_server, encode_client, layout_by_slug, ConflictPolicy, PieceId, Point, ReferenceFrame,
    ScreenPoint, Viewport, WireFormat, WireFrame,
};
use bglab_core::room_id::{RoomId, ROOM_ID_ALPHABET, ROOM_ID_LEN};
use bglab_relay::{RelayConfig, RelayServer};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const LAYOUT: &str = "light-road";

fn generate_room_id() -> RoomId {
    let mut rng = rand::rng();
    let alphabet = ROOM_ID_ALPHABET.as_bytes();
    let id: String = (0..ROOM_ID_LEN)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect();
    RoomId::parse(&id).unwrap()
}

async fn start_relay(policy: ConflictPolicy) -> SocketAddr {
    let config = RelayConfig {
        bind: "127.0.0.1:0".to_string(),
        policy,
        ..RelayConfig::default()
    };
    let server = RelayServer::bind(config).await.expect("bind relay");
    let addr = server.local_addr().expect("relay addr");
    tokio::spawn(server.run());
    addr
}

/// A `RoomClient` wired to a live websocket.
struct Peer {
    client: RoomClient,
    transport: ChannelTransport,
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    format: WireFormat,
}

impl Peer {
    async fn connect(addr: SocketAddr, room_id: &RoomId, format: WireFormat, name: &str) -> Self {
        let query = match format {
            WireFormat::Json => "json",
            WireFormat::Binary => "binary",
        };
        let url = format!("ws://{addr}/ws/{room_id}?format={query}");
        let (ws, _) = connect_async(url).await.expect("connect");
        let (write, read) = ws.split();
        let transport = ChannelTransport::new();
        let client = RoomClient::new(
            room_id.clone(),
            layout_by_slug(LAYOUT).unwrap(),
            &SyncConfig::default(),
            Rc::new(transport.clone()) as Rc<dyn Transport>,
            Rc::new(SystemClock::new()) as Rc<dyn Clock>,
        );
        let mut peer = Self {
            client,
            transport,
            write,
            read,
            format,
        };
        peer.client.join(name);
        peer.flush().await;
        let deadline = Instant::now() + Duration::from_secs(3);
        while peer.client.participant_id().is_none() {
            assert!(Instant::now() < deadline, "no welcome for {name}");
            peer.pump(Duration::from_millis(50)).await;
        }
        peer
    }

    async fn flush(&mut self) {
        for msg in self.transport.drain_sent() {
            let message = match encode_client(&msg, self.format).expect("encode") {
                WireFrame::Binary(bytes) => Message::Binary(bytes.into()),
                WireFrame::Text(text) => Message::Text(text.into()),
            };
            self.write.send(message).await.expect("send");
        }
    }

    async fn pump(&mut self, window: Duration) {
        let deadline = Instant::now() + window;
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            let Ok(next) = timeout(remaining, self.read.next()).await else {
                return;
            };
            let frame = match next.expect("stream ended").expect("websocket error") {
                Message::Binary(bytes) => WireFrame::Binary(bytes.to_vec()),
                Message::Text(text) => WireFrame::Text(text.as_str().to_string()),
                _ => continue,
            };
            self.transport.deliver(&decode_server(&frame).expect("decode"));
        }
    }

    /// Pumps until `done` holds or three seconds pass.
    async fn wait_for(&mut self, what: &str, done: impl Fn(&RoomClient) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(3);
        while !done(&self.client) {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            self.pump(Duration::from_millis(20)).await;
        }
    }

    fn screen_of(&self, piece: &PieceId, viewport: &Viewport) -> ScreenPoint {
        let frame = self.client_frame();
        viewport.to_screen(&frame, self.client.piece_position(piece).unwrap())
    }

    fn client_frame(&self) -> ReferenceFrame {
        layout_by_slug(LAYOUT).unwrap().frame
    }
}

fn near(a: Option<Point>, b: Point) -> bool {
    a.is_some_and(|a| a.approx_eq(b, 1e-4))
}

fn viewport() -> Viewport {
    Viewport::new(0.0, 0.0, 1.0).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn drag_converges_across_wire_formats() {
    let addr = start_relay(ConflictPolicy::LastWriterWins).await;
    let room_id = generate_room_id();
    let mut alice = Peer::connect(addr, &room_id, WireFormat::Json, "Alice").await;
    let mut bob = Peer::connect(addr, &room_id, WireFormat::Binary, "Bob").await;
    bob.wait_for("roster", |client| client.roster().len() == 2).await;

    let viewport = viewport();
    let piece = PieceId::new("piece-3").unwrap();
    let frame = alice.client_frame();
    let start = alice.screen_of(&piece, &viewport);
    let target = ScreenPoint::new(300.0, 120.0);
    let handle = alice
        .client
        .begin_drag(&piece, start, Some(&viewport))
        .expect("drag starts");
    for step in 1..=10 {
        let t = step as f32 / 10.0;
        let screen = ScreenPoint::new(
            start.x + (target.x - start.x) * t,
            start.y + (target.y - start.y) * t,
        );
        alice.client.pointer_moved(screen, Some(&viewport));
        alice.client.drag_to(&handle, screen, Some(&viewport));
        alice.flush().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    alice.client.end_drag(handle, Some(target), Some(&viewport));
    alice.flush().await;

    let expected = viewport.to_room_relative(&frame, target);
    bob.wait_for("piece-3 to land", |client| near(client.piece_position(&piece), expected))
        .await;
    let alice_id = alice.client.participant_id().unwrap();
    bob.wait_for("alice's cursor", |client| client.cursor_position(alice_id).is_some())
        .await;
    assert_eq!(alice.client.cursor_count(), 0);
    assert!(near(alice.client.piece_position(&piece), expected));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_returns_everyone_to_the_layout() {
    let addr = start_relay(ConflictPolicy::LastWriterWins).await;
    let room_id = generate_room_id();
    let mut alice = Peer::connect(addr, &room_id, WireFormat::Json, "Alice").await;
    let mut bob = Peer::connect(addr, &room_id, WireFormat::Json, "Bob").await;
    let viewport = viewport();
    let piece = PieceId::new("piece-0").unwrap();
    let initial = layout_by_slug(LAYOUT)
        .unwrap()
        .initial_position(&piece)
        .unwrap();

    let start = alice.screen_of(&piece, &viewport);
    let handle = alice.client.begin_drag(&piece, start, Some(&viewport)).unwrap();
    alice
        .client
        .end_drag(handle, Some(ScreenPoint::new(1200.0, 700.0)), Some(&viewport));
    alice.flush().await;
    bob.wait_for("move", |client| !near(client.piece_position(&piece), initial))
        .await;

    bob.client.request_reset();
    bob.flush().await;
    bob.wait_for("reset", |client| client.generation() == 1).await;
    alice.wait_for("reset", |client| client.generation() == 1).await;
    assert!(near(alice.client.piece_position(&piece), initial));
    assert!(near(bob.client.piece_position(&piece), initial));

    let mut carol = Peer::connect(addr, &room_id, WireFormat::Binary, "Carol").await;
    carol.pump(Duration::from_millis(50)).await;
    assert_eq!(carol.client.generation(), 1);
    assert!(near(carol.client.piece_position(&piece), initial));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lease_blocks_a_second_dragger() {
    let addr = start_relay(ConflictPolicy::Lease).await;
    let room_id = generate_room_id();
    let mut alice = Peer::connect(addr, &room_id, WireFormat::Binary, "Alice").await;
    let mut bob = Peer::connect(addr, &room_id, WireFormat::Binary, "Bob").await;
    assert_eq!(bob.client.policy(), ConflictPolicy::Lease);
    let viewport = viewport();
    let piece = PieceId::new("piece-1").unwrap();

    let start = alice.screen_of(&piece, &viewport);
    let handle = alice.client.begin_drag(&piece, start, Some(&viewport)).unwrap();
    alice.flush().await;
    // A drag move round-trip means the grab has reached bob as well.
    alice
        .client
        .drag_to(&handle, ScreenPoint::new(start.x + 40.0, start.y), Some(&viewport));
    alice.flush().await;
    let moved = viewport.to_room_relative(
        &alice.client_frame(),
        ScreenPoint::new(start.x + 40.0, start.y),
    );
    bob.wait_for("alice's move", |client| near(client.piece_position(&piece), moved))
        .await;
    let bob_start = bob.screen_of(&piece, &viewport);
    assert!(bob.client.begin_drag(&piece, bob_start, Some(&viewport)).is_none());

    alice.client.end_drag(handle, None, Some(&viewport));
    alice.flush().await;
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        bob.pump(Duration::from_millis(20)).await;
        let bob_start = bob.screen_of(&piece, &viewport);
        if let Some(handle) = bob.client.begin_drag(&piece, bob_start, Some(&viewport)) {
            bob.client.end_drag(handle, None, Some(&viewport));
            bob.flush().await;
            break;
        }
        assert!(Instant::now() < deadline, "lease never released");
    }
}
