// Test-only harness for end-to-end participant tests.
//
// `MockCoordinator` is a scripted stand-in for the game coordinator. It
// listens on a random localhost port, completes the `hello`/`welcome`
// handshake for each connection, and hands every connection to the test as a
// `Peer`. Tests decide what the coordinator says; the harness only does
// framing and bookkeeping.
//
// `TestParticipant` wraps the real `GameClient` over the real
// `TcpConnector`, with a `RecordingSurface` so strokes can be inspected. The
// only test-specific code is the synchronous polling wrappers (blocking
// loops around `GameClient::pump()`).
//
// See also: `tests/full_round.rs` for the scenarios.

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use scribble_client::config::ReconnectPolicy;
use scribble_client::{ClientConfig, Effect, GameClient, RecordingSurface, TcpConnector};
use scribble_protocol::{ClientMessage, MoveBatch, ServerMessage, recv, send, write_message};

/// Default timeout for blocking poll operations.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration between poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// Mock coordinator
// ---------------------------------------------------------------------------

pub struct MockCoordinator {
    addr: SocketAddr,
    peers: Receiver<Peer>,
    accepting: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

impl MockCoordinator {
    /// Listen on a random localhost port.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock coordinator");
        let addr = listener.local_addr().expect("local addr");
        let accepting = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel();

        let flag = accepting.clone();
        let accept_thread = thread::spawn(move || {
            let mut sessions = 0u32;
            for stream in listener.incoming() {
                if !flag.load(Ordering::SeqCst) {
                    return;
                }
                let Ok(stream) = stream else {
                    continue;
                };
                sessions += 1;
                match Peer::handshake(stream, format!("sess-{sessions}")) {
                    Ok(peer) => {
                        if tx.send(peer).is_err() {
                            return;
                        }
                    }
                    Err(e) => eprintln!("mock coordinator: handshake failed: {e}"),
                }
            }
        });

        Self {
            addr,
            peers: rx,
            accepting,
            accept_thread: Some(accept_thread),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until the next participant has connected and said hello.
    pub fn accept(&self) -> Peer {
        match self.peers.recv_timeout(POLL_TIMEOUT) {
            Ok(peer) => peer,
            Err(RecvTimeoutError::Timeout) => panic!("timed out waiting for a participant"),
            Err(RecvTimeoutError::Disconnected) => panic!("mock coordinator stopped"),
        }
    }

    /// Stop listening. Later connection attempts are refused.
    pub fn stop_listening(&mut self) {
        self.accepting.store(false, Ordering::SeqCst);
        // Wake the blocked accept() so the thread sees the flag.
        let _ = TcpStream::connect(self.addr);
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockCoordinator {
    fn drop(&mut self) {
        if self.accept_thread.is_some() {
            self.stop_listening();
        }
    }
}

/// One connected participant as seen from the coordinator.
pub struct Peer {
    pub session_id: String,
    writer: BufWriter<TcpStream>,
    inbox: Receiver<ClientMessage>,
}

impl Peer {
    fn handshake(stream: TcpStream, session_id: String) -> std::io::Result<Self> {
        stream.set_read_timeout(Some(POLL_TIMEOUT))?;
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream);
        let hello: ClientMessage = recv(&mut reader)?;
        if !matches!(hello, ClientMessage::Hello { .. }) {
            return Err(std::io::Error::other(format!("expected hello, got {hello:?}")));
        }
        send(
            &mut writer,
            &ServerMessage::Welcome {
                session_id: session_id.clone(),
            },
        )?;
        reader.get_ref().set_read_timeout(None)?;

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            while let Ok(msg) = recv::<_, ClientMessage>(&mut reader) {
                if tx.send(msg).is_err() {
                    return;
                }
            }
        });

        Ok(Self {
            session_id,
            writer,
            inbox: rx,
        })
    }

    /// Send one coordinator message to this participant.
    pub fn push(&mut self, msg: ServerMessage) {
        send(&mut self.writer, &msg).expect("mock coordinator send failed");
    }

    /// Send one hand-written JSON frame, bypassing the typed enum.
    pub fn push_raw(&mut self, json: &str) {
        write_message(&mut self.writer, json.as_bytes()).expect("mock coordinator send failed");
    }

    /// Block until the participant sends a message matching `pred`. Earlier
    /// non-matching messages are discarded.
    pub fn expect(&self, what: &str, pred: impl Fn(&ClientMessage) -> bool) -> ClientMessage {
        let deadline = Instant::now() + POLL_TIMEOUT;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.inbox.recv_timeout(left) {
                Ok(msg) if pred(&msg) => return msg,
                Ok(_) => {}
                Err(_) => panic!("timed out waiting for {what}"),
            }
        }
    }

    /// Block until exactly `n` messages have arrived, and return them.
    pub fn take(&self, n: usize) -> Vec<ClientMessage> {
        (0..n)
            .map(|i| {
                self.inbox
                    .recv_timeout(POLL_TIMEOUT)
                    .unwrap_or_else(|_| panic!("timed out waiting for message {}", i + 1))
            })
            .collect()
    }

    /// Drop the connection from the coordinator side.
    pub fn hang_up(self) {
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}

/// What the coordinator would broadcast to guessers for a drawer's stroke
/// message, if anything.
pub fn stroke_broadcast(msg: &ClientMessage) -> Option<ServerMessage> {
    match msg {
        ClientMessage::DrawStart(point) => Some(ServerMessage::DrawStart(point.clone())),
        ClientMessage::DrawMove(points) => {
            Some(ServerMessage::DrawMove(MoveBatch::Many(points.clone())))
        }
        ClientMessage::DrawEnd => Some(ServerMessage::DrawEnd),
        ClientMessage::ClearCanvas => Some(ServerMessage::ClearCanvas),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

pub type TestClient = GameClient<TcpConnector, RecordingSurface>;

/// A real participant runtime with blocking helpers.
pub struct TestParticipant {
    pub client: TestClient,
    /// Every render-layer effect seen so far.
    pub effects: Vec<Effect>,
}

impl TestParticipant {
    /// Connect with the given name registered automatically. Reconnects are
    /// fast so tests do not wait on the real schedule.
    pub fn connect(addr: SocketAddr, name: &str) -> Self {
        Self::connect_with(
            addr,
            name,
            ReconnectPolicy {
                max_attempts: 3,
                initial_delay_ms: 20,
                max_delay_ms: 50,
            },
        )
    }

    pub fn connect_with(addr: SocketAddr, name: &str, reconnect: ReconnectPolicy) -> Self {
        let config = ClientConfig {
            endpoint: addr.to_string(),
            player_name: Some(name.to_string()),
            reconnect,
            ..ClientConfig::default()
        };
        let mut client = GameClient::new(TcpConnector::default(), RecordingSurface::new(), config);
        let effects = client.start(Instant::now());
        Self { client, effects }
    }

    /// Run one pump.
    pub fn pump(&mut self) {
        let fx = self.client.pump(Instant::now());
        self.effects.extend(fx);
    }

    /// Pump until `pred` holds for the participant.
    pub fn poll_until(&mut self, what: &str, pred: impl Fn(&TestClient) -> bool) {
        let start = Instant::now();
        loop {
            self.pump();
            if pred(&self.client) {
                return;
            }
            assert!(start.elapsed() < POLL_TIMEOUT, "timed out waiting for {what}");
            thread::sleep(POLL_INTERVAL);
        }
    }
}
