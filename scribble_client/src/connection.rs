// Connection Manager: the single persistent channel to the coordinator.
//
// Architecture:
// - `TcpConnector::connect()` performs TCP connect + `hello`/`welcome`
//   handshake on the calling thread, then spawns a background reader thread.
// - The reader thread reads frames in a loop and pushes decoded
//   `ServerMessage`s into an `mpsc` channel. EOF and framing errors push a
//   final `Inbound::Closed`; a frame whose JSON does not decode is logged and
//   skipped.
// - The event loop holds the `BufWriter<TcpStream>` for sending and drains the
//   inbox without blocking in `poll()`.
//
// `ConnectionManager` sits on top of any `Connector` and owns the reconnect
// policy. It never sleeps: callers pass `now` into `connect`/`poll` and ask
// `next_wakeup()` when the next retry is due, so the policy is testable with
// synthetic clocks. Ordering: one channel delivers messages in send order;
// nothing is promised across reconnects, which is why every `Connected`
// event is treated upstream as a fresh session.

use std::collections::VecDeque;
use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use scribble_protocol::{ClientMessage, PROTOCOL_VERSION, ServerMessage, read_message, recv, send};
use tracing::{debug, error, info, warn};

use crate::config::ReconnectPolicy;
use crate::error::{ClientError, Result};

/// Input drained from an open channel.
#[derive(Debug)]
pub enum Inbound {
    Message(ServerMessage),
    /// The channel is gone; nothing follows.
    Closed,
}

/// One established, handshaken channel.
pub trait Channel {
    /// Send one message. Fire-and-forget: no reply is awaited.
    fn send(&mut self, msg: &ClientMessage) -> Result<()>;
    /// Drain everything received so far, in arrival order. Never blocks.
    fn poll(&mut self) -> Vec<Inbound>;
}

/// A channel plus the session id the coordinator assigned in the handshake.
pub struct Established {
    pub channel: Box<dyn Channel>,
    pub session_id: String,
}

/// Opens channels. The manager calls this once per (re)connect attempt.
pub trait Connector {
    fn connect(&mut self, endpoint: &str) -> Result<Established>;
}

// ---------------------------------------------------------------------------
// TCP transport
// ---------------------------------------------------------------------------

/// Connects over TCP using the protocol crate's framing.
pub struct TcpConnector {
    pub handshake_timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

impl Connector for TcpConnector {
    fn connect(&mut self, endpoint: &str) -> Result<Established> {
        let stream = TcpStream::connect(endpoint)?;
        stream.set_nodelay(true).ok();
        stream.set_read_timeout(Some(self.handshake_timeout))?;

        let reader_stream = stream.try_clone()?;
        let mut writer = BufWriter::new(stream);
        send(
            &mut writer,
            &ClientMessage::Hello {
                protocol_version: PROTOCOL_VERSION,
            },
        )?;

        let mut reader = BufReader::new(reader_stream);
        let session_id = match recv::<_, ServerMessage>(&mut reader)? {
            ServerMessage::Welcome { session_id } => session_id,
            ServerMessage::Rejected { reason } => return Err(ClientError::Rejected(reason)),
            other => return Err(ClientError::Handshake(other.kind().into())),
        };

        // Long-lived reader loop blocks indefinitely.
        reader.get_ref().set_read_timeout(None)?;

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || reader_loop(reader, tx));

        Ok(Established {
            channel: Box::new(TcpChannel {
                writer,
                inbox: rx,
                _reader_thread: reader_thread,
            }),
            session_id,
        })
    }
}

struct TcpChannel {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<Inbound>,
    _reader_thread: JoinHandle<()>,
}

impl Channel for TcpChannel {
    fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        send(&mut self.writer, msg)?;
        Ok(())
    }

    fn poll(&mut self) -> Vec<Inbound> {
        let mut drained = Vec::new();
        loop {
            match self.inbox.try_recv() {
                Ok(input) => drained.push(input),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    // Reader exited after already reporting Closed, or panicked.
                    if !matches!(drained.last(), Some(Inbound::Closed)) {
                        drained.push(Inbound::Closed);
                    }
                    break;
                }
            }
        }
        drained
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        // Unblocks the reader thread.
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}

/// Reader thread: read frames until the stream ends, then report closure.
/// A frame that arrives intact but does not decode is skipped; only I/O and
/// framing errors end the channel.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: Sender<Inbound>) {
    loop {
        let bytes = match read_message(&mut reader) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("reader loop ending: {e}");
                let _ = tx.send(Inbound::Closed);
                return;
            }
        };
        match serde_json::from_slice::<ServerMessage>(&bytes) {
            Ok(msg) => {
                if tx.send(Inbound::Message(msg)).is_err() {
                    return; // Channel dropped
                }
            }
            Err(e) => warn!(len = bytes.len(), "skipping undecodable message: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// Never connected, or closed deliberately.
    Idle,
    Connected { session_id: String },
    /// Waiting for reconnect attempt `attempt`.
    Reconnecting { attempt: u32 },
    /// Attempts exhausted. Terminal.
    Failed,
}

/// Lifecycle and traffic reported upward by `ConnectionManager::poll`.
#[derive(Debug)]
pub enum ChannelEvent {
    Connected { session_id: String },
    Message(ServerMessage),
    Disconnected,
    Reconnecting { attempt: u32, delay: Duration },
    Failed { attempts: u32 },
}

pub struct ConnectionManager<C: Connector> {
    connector: C,
    endpoint: String,
    policy: ReconnectPolicy,
    channel: Option<Box<dyn Channel>>,
    state: ChannelState,
    /// Failed reconnect attempts in the current outage.
    failed_attempts: u32,
    next_attempt_at: Option<Instant>,
    pending: VecDeque<ChannelEvent>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, endpoint: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            connector,
            endpoint: endpoint.into(),
            policy,
            channel: None,
            state: ChannelState::Idle,
            failed_attempts: 0,
            next_attempt_at: None,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ChannelState::Connected { .. })
    }

    /// First connection attempt. A failure enters the reconnect schedule.
    /// No-op unless idle.
    pub fn connect(&mut self, now: Instant) {
        if self.state != ChannelState::Idle {
            return;
        }
        info!(endpoint = %self.endpoint, "connecting");
        self.failed_attempts = 0;
        if let Err(e) = self.try_open() {
            warn!("initial connect failed: {e}");
            self.schedule_retry(now);
        }
    }

    /// Drain channel traffic and run any due reconnect attempt. Events come
    /// back in the order they happened.
    pub fn poll(&mut self, now: Instant) -> Vec<ChannelEvent> {
        let mut lost = false;
        if let Some(channel) = self.channel.as_mut() {
            for input in channel.poll() {
                match input {
                    Inbound::Message(msg) => self.pending.push_back(ChannelEvent::Message(msg)),
                    Inbound::Closed => {
                        lost = true;
                        break;
                    }
                }
            }
        }
        if lost {
            warn!("channel lost");
            self.channel = None;
            self.failed_attempts = 0;
            self.pending.push_back(ChannelEvent::Disconnected);
            self.schedule_retry(now);
        }

        let retry_due = match self.state {
            ChannelState::Reconnecting { attempt }
                if self.next_attempt_at.is_some_and(|at| now >= at) =>
            {
                Some(attempt)
            }
            _ => None,
        };
        if let Some(attempt) = retry_due {
            debug!(attempt, "reconnect attempt");
            self.next_attempt_at = None;
            if let Err(e) = self.try_open() {
                warn!(attempt, "reconnect failed: {e}");
                self.failed_attempts += 1;
                self.schedule_retry(now);
            }
        }

        self.pending.drain(..).collect()
    }

    /// Send a command. Fails fast when there is no open channel.
    pub fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        match self.channel.as_mut() {
            Some(channel) => channel.send(msg),
            None if self.state == ChannelState::Failed => Err(ClientError::ChannelFailed {
                attempts: self.failed_attempts,
            }),
            None => Err(ClientError::NotConnected),
        }
    }

    /// Deliberate close: says goodbye and never reconnects.
    pub fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            let _ = channel.send(&ClientMessage::Goodbye);
        }
        self.state = ChannelState::Idle;
        self.next_attempt_at = None;
        self.pending.clear();
    }

    /// When `poll` next has timed work to do.
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.next_attempt_at
    }

    fn try_open(&mut self) -> Result<()> {
        let Established {
            channel,
            session_id,
        } = self.connector.connect(&self.endpoint)?;
        info!(%session_id, "channel open");
        self.channel = Some(channel);
        self.failed_attempts = 0;
        self.state = ChannelState::Connected {
            session_id: session_id.clone(),
        };
        self.pending
            .push_back(ChannelEvent::Connected { session_id });
        Ok(())
    }

    fn schedule_retry(&mut self, now: Instant) {
        if self.failed_attempts >= self.policy.max_attempts {
            error!(attempts = self.failed_attempts, "giving up on the coordinator");
            self.state = ChannelState::Failed;
            self.next_attempt_at = None;
            self.pending.push_back(ChannelEvent::Failed {
                attempts: self.failed_attempts,
            });
            return;
        }
        let attempt = self.failed_attempts + 1;
        let delay = self.policy.delay_for(attempt);
        self.state = ChannelState::Reconnecting { attempt };
        self.next_attempt_at = Some(now + delay);
        self.pending
            .push_back(ChannelEvent::Reconnecting { attempt, delay });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::net::TcpListener;
    use std::rc::Rc;

    use scribble_protocol::write_message;

    use super::*;

    /// Shared inspection handle for a `FakeChannel`.
    #[derive(Default)]
    pub(crate) struct FakeWire {
        pub inbound: VecDeque<Inbound>,
        pub sent: Vec<ClientMessage>,
        /// Sends to fail before accepting again.
        pub refuse_sends: usize,
    }

    pub(crate) struct FakeChannel(pub Rc<RefCell<FakeWire>>);

    impl Channel for FakeChannel {
        fn send(&mut self, msg: &ClientMessage) -> Result<()> {
            let mut wire = self.0.borrow_mut();
            if wire.refuse_sends > 0 {
                wire.refuse_sends -= 1;
                return Err(ClientError::Io(std::io::Error::from(
                    std::io::ErrorKind::BrokenPipe,
                )));
            }
            wire.sent.push(msg.clone());
            Ok(())
        }

        fn poll(&mut self) -> Vec<Inbound> {
            self.0.borrow_mut().inbound.drain(..).collect()
        }
    }

    /// Connector that succeeds or fails per a script; every success hands
    /// out a fresh wire, recorded in `wires`.
    #[derive(Default)]
    pub(crate) struct FakeConnector {
        pub script: VecDeque<bool>,
        pub attempts: Rc<RefCell<u32>>,
        pub wires: Rc<RefCell<Vec<Rc<RefCell<FakeWire>>>>>,
    }

    impl FakeConnector {
        pub fn scripted(outcomes: &[bool]) -> Self {
            Self {
                script: outcomes.iter().copied().collect(),
                ..Self::default()
            }
        }
    }

    impl Connector for FakeConnector {
        fn connect(&mut self, _endpoint: &str) -> Result<Established> {
            *self.attempts.borrow_mut() += 1;
            if !self.script.pop_front().unwrap_or(false) {
                return Err(ClientError::Io(std::io::Error::from(
                    std::io::ErrorKind::ConnectionRefused,
                )));
            }
            let wire = Rc::new(RefCell::new(FakeWire::default()));
            let mut wires = self.wires.borrow_mut();
            wires.push(wire.clone());
            Ok(Established {
                channel: Box::new(FakeChannel(wire)),
                session_id: format!("s{}", wires.len()),
            })
        }
    }

    fn manager(outcomes: &[bool]) -> ConnectionManager<FakeConnector> {
        ConnectionManager::new(
            FakeConnector::scripted(outcomes),
            "fake:0",
            ReconnectPolicy::default(),
        )
    }

    #[test]
    fn connect_reports_session_and_messages_in_order() {
        let mut mgr = manager(&[true]);
        let now = Instant::now();
        mgr.connect(now);
        let wire = mgr.connector.wires.borrow()[0].clone();
        wire.borrow_mut()
            .inbound
            .push_back(Inbound::Message(ServerMessage::RoomLeft));
        wire.borrow_mut()
            .inbound
            .push_back(Inbound::Message(ServerMessage::DrawEnd));

        let events = mgr.poll(now);
        assert!(matches!(&events[0], ChannelEvent::Connected { session_id } if session_id == "s1"));
        assert!(matches!(events[1], ChannelEvent::Message(ServerMessage::RoomLeft)));
        assert!(matches!(events[2], ChannelEvent::Message(ServerMessage::DrawEnd)));
        assert!(mgr.is_connected());
    }

    #[test]
    fn loss_schedules_growing_delays_then_fails_for_good() {
        let mut mgr = manager(&[true]);
        let mut now = Instant::now();
        mgr.connect(now);
        mgr.poll(now);
        mgr.connector.wires.borrow()[0]
            .borrow_mut()
            .inbound
            .push_back(Inbound::Closed);

        let events = mgr.poll(now);
        assert!(matches!(events[0], ChannelEvent::Disconnected));
        assert!(matches!(
            events[1],
            ChannelEvent::Reconnecting { attempt: 1, delay } if delay == Duration::from_millis(1000)
        ));

        let mut seen_delays = Vec::new();
        let mut failed = None;
        for _ in 0..20 {
            let Some(wake) = mgr.next_wakeup() else {
                break;
            };
            now = wake;
            for event in mgr.poll(now) {
                match event {
                    ChannelEvent::Reconnecting { delay, .. } => {
                        seen_delays.push(delay.as_millis() as u64)
                    }
                    ChannelEvent::Failed { attempts } => failed = Some(attempts),
                    other => panic!("unexpected event {other:?}"),
                }
            }
        }
        assert_eq!(seen_delays, vec![2000, 4000, 5000, 5000]);
        assert_eq!(failed, Some(5));
        assert_eq!(mgr.state(), &ChannelState::Failed);
        // One initial connect plus exactly five reconnect attempts.
        assert_eq!(*mgr.connector.attempts.borrow(), 6);

        // Terminal: nothing more happens, however long we wait.
        assert!(mgr.next_wakeup().is_none());
        assert!(mgr.poll(now + Duration::from_secs(3600)).is_empty());
        assert_eq!(*mgr.connector.attempts.borrow(), 6);
        assert!(matches!(
            mgr.send(&ClientMessage::StartGame),
            Err(ClientError::ChannelFailed { attempts: 5 })
        ));
    }

    #[test]
    fn successful_reconnect_resets_the_attempt_budget() {
        let mut mgr = manager(&[true, false, true]);
        let now = Instant::now();
        mgr.connect(now);
        mgr.poll(now);
        mgr.connector.wires.borrow()[0]
            .borrow_mut()
            .inbound
            .push_back(Inbound::Closed);
        mgr.poll(now);

        let first = mgr.next_wakeup().unwrap();
        let events = mgr.poll(first);
        assert!(matches!(events[0], ChannelEvent::Reconnecting { attempt: 2, .. }));

        let second = mgr.next_wakeup().unwrap();
        let events = mgr.poll(second);
        assert!(matches!(&events[0], ChannelEvent::Connected { session_id } if session_id == "s2"));
        assert!(mgr.is_connected());
        assert_eq!(mgr.failed_attempts, 0);
    }

    #[test]
    fn failed_initial_connect_enters_the_schedule() {
        let mut mgr = manager(&[false, true]);
        let now = Instant::now();
        mgr.connect(now);
        assert_eq!(mgr.state(), &ChannelState::Reconnecting { attempt: 1 });
        assert!(matches!(
            mgr.send(&ClientMessage::StartGame),
            Err(ClientError::NotConnected)
        ));

        // Not due yet.
        let events = mgr.poll(now);
        assert!(matches!(events[0], ChannelEvent::Reconnecting { attempt: 1, .. }));
        assert_eq!(*mgr.connector.attempts.borrow(), 1);

        let events = mgr.poll(now + Duration::from_millis(1000));
        assert!(matches!(events[0], ChannelEvent::Connected { .. }));
    }

    #[test]
    fn close_says_goodbye_and_never_retries() {
        let mut mgr = manager(&[true, true]);
        let now = Instant::now();
        mgr.connect(now);
        mgr.poll(now);
        mgr.send(&ClientMessage::StartGame).unwrap();
        mgr.close();

        let wire = mgr.connector.wires.borrow()[0].clone();
        assert_eq!(
            wire.borrow().sent,
            vec![ClientMessage::StartGame, ClientMessage::Goodbye]
        );
        assert_eq!(mgr.state(), &ChannelState::Idle);
        assert!(mgr.poll(now + Duration::from_secs(60)).is_empty());
        assert_eq!(*mgr.connector.attempts.borrow(), 1);
    }

    #[test]
    fn tcp_connector_handshakes_and_reports_closure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = BufWriter::new(stream);
            let hello: ClientMessage = recv(&mut reader).unwrap();
            assert_eq!(
                hello,
                ClientMessage::Hello {
                    protocol_version: PROTOCOL_VERSION
                }
            );
            send(
                &mut writer,
                &ServerMessage::Welcome {
                    session_id: "abc".into(),
                },
            )
            .unwrap();
            send(&mut writer, &ServerMessage::RoomLeft).unwrap();
            let guess: ClientMessage = recv(&mut reader).unwrap();
            assert_eq!(
                guess,
                ClientMessage::Guess {
                    guess: "tree".into()
                }
            );
            // Dropping both halves closes the connection.
        });

        let Established {
            mut channel,
            session_id,
        } = TcpConnector::default().connect(&addr.to_string()).unwrap();
        assert_eq!(session_id, "abc");
        channel
            .send(&ClientMessage::Guess {
                guess: "tree".into(),
            })
            .unwrap();
        server.join().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut inputs = Vec::new();
        while !matches!(inputs.last(), Some(Inbound::Closed)) {
            assert!(Instant::now() < deadline, "timed out waiting for closure");
            inputs.extend(channel.poll());
            thread::sleep(Duration::from_millis(10));
        }
        assert!(matches!(inputs[0], Inbound::Message(ServerMessage::RoomLeft)));
        assert_eq!(inputs.len(), 2);
    }

    #[test]
    fn undecodable_frame_is_skipped_and_channel_stays_open() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = BufWriter::new(stream);
            let _hello: ClientMessage = recv(&mut reader).unwrap();
            send(
                &mut writer,
                &ServerMessage::Welcome {
                    session_id: "abc".into(),
                },
            )
            .unwrap();
            write_message(&mut writer, br#"{"type": "confetti", "data": {}}"#).unwrap();
            write_message(
                &mut writer,
                br#"{"type": "timer_tick", "data": {"remaining": -3, "type": "drawing"}}"#,
            )
            .unwrap();
            send(&mut writer, &ServerMessage::RoomLeft).unwrap();
            // Hold the connection until the participant answers.
            let _reply: ClientMessage = recv(&mut reader).unwrap();
        });

        let mut mgr = ConnectionManager::new(
            TcpConnector::default(),
            addr.to_string(),
            ReconnectPolicy::default(),
        );
        let start = Instant::now();
        mgr.connect(start);

        let mut events = Vec::new();
        while !events
            .iter()
            .any(|e| matches!(e, ChannelEvent::Message(ServerMessage::RoomLeft)))
        {
            assert!(start.elapsed() < Duration::from_secs(5), "timed out");
            events.extend(mgr.poll(Instant::now()));
            thread::sleep(Duration::from_millis(10));
        }
        assert!(matches!(&events[0], ChannelEvent::Connected { session_id } if session_id == "abc"));
        assert_eq!(events.len(), 2);
        assert!(mgr.is_connected());

        mgr.send(&ClientMessage::LeaveRoom).unwrap();
        server.join().unwrap();
    }

    #[test]
    fn tcp_connector_surfaces_rejection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = BufWriter::new(stream);
            let _hello: ClientMessage = recv(&mut reader).unwrap();
            send(
                &mut writer,
                &ServerMessage::Rejected {
                    reason: "server full".into(),
                },
            )
            .unwrap();
        });

        let result = TcpConnector::default().connect(&addr.to_string());
        server.join().unwrap();
        assert!(matches!(result, Err(ClientError::Rejected(reason)) if reason == "server full"));
    }
}
