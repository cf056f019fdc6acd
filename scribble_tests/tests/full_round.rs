// End-to-end tests for the participant runtime.
//
// Each test starts a `MockCoordinator` on a random port, connects real
// participant runtimes (via `TestParticipant`) over TCP, and scripts the
// coordinator's side of the conversation by hand. Everything on the
// participant side is the production code path: TCP connector, reader
// thread, connection manager, phase machine, drawing engine.

use scribble_client::config::ReconnectPolicy;
use scribble_client::drawing::{InputEvent, Point};
use scribble_client::{ChannelState, Screen};
use scribble_protocol::{
    ClientMessage, GameFragment, GamePhase, LeaderboardEntry, PlayerId, PlayerSnapshot, RoomId,
    RoomSettings, RoomSnapshot, ServerMessage,
};
use scribble_tests::{MockCoordinator, Peer, TestParticipant, stroke_broadcast};

fn player(id: &str, name: &str, owner: bool) -> PlayerSnapshot {
    PlayerSnapshot {
        id: PlayerId::from(id),
        name: name.into(),
        score: 0,
        is_owner: owner,
    }
}

fn room(players: Vec<PlayerSnapshot>, settings: RoomSettings) -> RoomSnapshot {
    RoomSnapshot {
        id: RoomId("K7QX".into()),
        owner_id: PlayerId::from("p-alice"),
        players,
        settings,
    }
}

/// Connect a participant, confirm its identity, and return both ends.
fn join(coordinator: &MockCoordinator, id: &str, name: &str) -> (TestParticipant, Peer) {
    let mut participant = TestParticipant::connect(coordinator.addr(), name);
    let mut peer = coordinator.accept();
    let hello = peer.expect("set_player_name", |m| {
        matches!(m, ClientMessage::SetPlayerName { .. })
    });
    assert_eq!(hello, ClientMessage::SetPlayerName { name: name.into() });
    peer.push(ServerMessage::IdentityUpdate {
        id: PlayerId::from(id),
        name: name.into(),
    });
    participant.poll_until("identity", |c| c.store().player_id().is_some());
    assert_eq!(participant.client.store().screen(), Screen::Home);
    (participant, peer)
}

/// Alice creates a room, Bob joins it; both end up in the lobby.
fn lobby(
    coordinator: &MockCoordinator,
) -> (TestParticipant, Peer, TestParticipant, Peer, RoomSnapshot) {
    let (mut alice, mut alice_peer) = join(coordinator, "p-alice", "Alice");
    let (mut bob, mut bob_peer) = join(coordinator, "p-bob", "Bob");

    let settings = RoomSettings {
        max_players: 8,
        draw_time: 80,
        rounds: 3,
        hints: true,
        custom_words: vec![],
    };
    alice
        .client
        .create_room(settings.clone(), std::time::Instant::now())
        .unwrap();
    let create = alice_peer.expect("create_room", |m| {
        matches!(m, ClientMessage::CreateRoom { .. })
    });
    let wire = serde_json::to_value(&create).unwrap();
    assert_eq!(wire["type"], "create_room");
    assert_eq!(wire["data"]["settings"]["maxPlayers"], 8);
    assert_eq!(wire["data"]["settings"]["drawTime"], 80);
    assert_eq!(wire["data"]["settings"]["hints"], true);

    let solo = room(vec![player("p-alice", "Alice", true)], settings.clone());
    alice_peer.push(ServerMessage::RoomCreated { room: solo });
    alice.poll_until("lobby", |c| c.store().screen() == Screen::Lobby);
    assert!(alice.client.store().is_room_owner());

    bob.client.join_room(" k7qx ", std::time::Instant::now()).unwrap();
    let joined = bob_peer.expect("join_room", |m| matches!(m, ClientMessage::JoinRoom { .. }));
    assert_eq!(
        joined,
        ClientMessage::JoinRoom {
            room_id: RoomId("K7QX".into())
        }
    );

    let both = room(
        vec![
            player("p-alice", "Alice", true),
            player("p-bob", "Bob", false),
        ],
        settings,
    );
    bob_peer.push(ServerMessage::RoomJoined { room: both.clone() });
    alice_peer.push(ServerMessage::RoomUpdated { room: both.clone() });
    bob.poll_until("lobby", |c| c.store().screen() == Screen::Lobby);
    alice.poll_until("second player", |c| c.store().can_start_game());
    assert!(!bob.client.store().is_room_owner());

    (alice, alice_peer, bob, bob_peer, both)
}

/// Start a game with Alice drawing and take it to the drawing phase.
fn into_drawing(
    alice: &mut TestParticipant,
    alice_peer: &mut Peer,
    bob: &mut TestParticipant,
    bob_peer: &mut Peer,
    room: &RoomSnapshot,
) {
    let started = ServerMessage::GameStarted {
        game: GameFragment {
            drawer_id: Some(Some(PlayerId::from("p-alice"))),
            current_round: Some(1),
            total_rounds: Some(3),
            ..GameFragment::default()
        },
        room: room.clone(),
        players: vec![],
    };
    alice_peer.push(started.clone());
    bob_peer.push(started);
    alice.poll_until("game screen", |c| c.store().screen() == Screen::InGame);
    bob.poll_until("game screen", |c| c.store().screen() == Screen::InGame);
    assert!(!bob.client.store().is_drawer());
    assert!(!bob.client.store().can_draw());

    alice_peer.push(ServerMessage::WordOptions {
        options: vec!["tree".into(), "boat".into(), "lamp".into()],
        game: Some(GameFragment {
            phase: Some(Some(GamePhase::WordSelect)),
            ..GameFragment::default()
        }),
    });
    alice.poll_until("word options", |c| !c.store().word_options().is_empty());
    assert!(alice.client.store().is_drawer());
    assert!(!alice.client.store().can_draw());

    alice
        .client
        .select_word("tree", std::time::Instant::now())
        .unwrap();
    alice_peer.expect("select_word", |m| {
        *m == ClientMessage::SelectWord {
            word: "tree".into(),
        }
    });

    let selected = ServerMessage::WordSelected {
        masked_word: "_ _ _ _".into(),
        game: None,
    };
    alice_peer.push(selected.clone());
    bob_peer.push(selected);
    alice.poll_until("drawing permission", |c| c.store().can_draw());
    bob.poll_until("masked word", |c| {
        c.store().game().and_then(|g| g.masked_word.as_deref()) == Some("_ _ _ _")
    });
    assert!(!bob.client.store().can_draw());
    assert_eq!(bob.client.store().masked_word_display(), "_ _ _ _");
}

// ---------------------------------------------------------------------------
// Test scenarios
// ---------------------------------------------------------------------------

/// Room creation, join, and the drawer lock through word selection.
#[test]
fn two_player_round_setup() {
    let coordinator = MockCoordinator::start();
    let (mut alice, mut alice_peer, mut bob, mut bob_peer, room) = lobby(&coordinator);
    into_drawing(&mut alice, &mut alice_peer, &mut bob, &mut bob_peer, &room);

    assert_eq!(alice.client.engine().surface().attached().len(), 1);
    assert!(bob.client.engine().surface().attached().is_empty());
}

/// Alice draws a stroke of seven moves; the coordinator relays it to Bob.
#[test]
fn stroke_relayed_in_two_batches() {
    let coordinator = MockCoordinator::start();
    let (mut alice, mut alice_peer, mut bob, mut bob_peer, room) = lobby(&coordinator);
    into_drawing(&mut alice, &mut alice_peer, &mut bob, &mut bob_peer, &room);

    alice
        .client
        .pointer(InputEvent::MouseDown(Point::new(10.0, 20.0)))
        .unwrap();
    for i in 1..=7 {
        alice
            .client
            .pointer(InputEvent::MouseMove(Point::new(10.0 + i as f32, 20.0 + i as f32)))
            .unwrap();
    }
    alice.client.pointer(InputEvent::MouseUp).unwrap();

    let stroke = alice_peer.take(4);
    match &stroke[0] {
        ClientMessage::DrawStart(p) => {
            assert_eq!((p.x, p.y), (10.0, 20.0));
            assert_eq!(p.color, "#000000");
            assert_eq!(p.line_width, 4.0);
        }
        other => panic!("expected draw_start, got {other:?}"),
    }
    assert!(matches!(&stroke[1], ClientMessage::DrawMove(p) if p.len() == 5));
    assert!(matches!(&stroke[2], ClientMessage::DrawMove(p) if p.len() == 2));
    assert_eq!(stroke[3], ClientMessage::DrawEnd);

    for msg in &stroke {
        bob_peer.push(stroke_broadcast(msg).unwrap());
    }
    bob.poll_until("replayed stroke", |c| {
        c.engine()
            .surface()
            .count(|op| *op == scribble_client::surface::SurfaceOp::ClosePath)
            == 1
    });
    assert_eq!(
        bob.client.engine().surface().path_points(),
        alice.client.engine().surface().path_points()
    );
}

/// Guess, correct-guess broadcast, round end, game end, restart.
#[test]
fn game_runs_to_the_end_and_resets() {
    let coordinator = MockCoordinator::start();
    let (mut alice, mut alice_peer, mut bob, mut bob_peer, room) = lobby(&coordinator);
    into_drawing(&mut alice, &mut alice_peer, &mut bob, &mut bob_peer, &room);

    // The drawer's guesses never leave the participant.
    alice
        .client
        .submit_guess("tree", std::time::Instant::now())
        .unwrap();
    bob.client
        .submit_guess("  tree ", std::time::Instant::now())
        .unwrap();
    bob_peer.expect("guess", |m| {
        *m == ClientMessage::Guess {
            guess: "tree".into(),
        }
    });

    let board = vec![
        LeaderboardEntry {
            name: "Alice".into(),
            score: 40,
        },
        LeaderboardEntry {
            name: "Bob".into(),
            score: 120,
        },
    ];
    bob_peer.push(ServerMessage::CorrectGuess {
        player_name: "Bob".into(),
        score: 120,
        leaderboard: Some(board.clone()),
    });
    bob.poll_until("correct guess", |c| c.store().flags().has_guessed);
    assert_eq!(
        bob.client.store().chat().last().map(|c| c.message.as_str()),
        Some("guessed the word! (+120)")
    );

    let ended = ServerMessage::RoundEnded {
        game: Some(GameFragment {
            drawer_id: Some(Some(PlayerId::from("p-bob"))),
            ..GameFragment::default()
        }),
        round_completed: true,
        selected_word: Some("tree".into()),
        leaderboard: Some(board.clone()),
    };
    alice_peer.push(ended.clone());
    bob_peer.push(ended);
    alice.poll_until("round end", |c| c.store().screen() == Screen::RoundEnd);
    bob.poll_until("round end", |c| c.store().screen() == Screen::RoundEnd);
    assert!(!alice.client.store().can_draw());
    assert!(alice.client.engine().surface().attached().is_empty());
    assert!(bob.client.store().is_drawer());
    assert!(!bob.client.store().can_draw());
    assert!(!bob.client.store().flags().has_guessed);

    let finished = ServerMessage::GameEnded {
        leaderboard: board,
    };
    alice_peer.push(finished.clone());
    bob_peer.push(finished);
    alice.poll_until("game end", |c| c.store().screen() == Screen::GameEnd);
    bob.poll_until("game end", |c| c.store().screen() == Screen::GameEnd);
    let ranked = alice.client.store().ranked_leaderboard();
    assert_eq!((ranked[0].name, ranked[0].rank), ("Bob", 1));

    assert!(bob.client.play_again(std::time::Instant::now()).is_err());
    alice
        .client
        .play_again(std::time::Instant::now())
        .unwrap();
    alice_peer.expect("play_again", |m| *m == ClientMessage::PlayAgain);

    alice_peer.push(ServerMessage::GameReset { room: room.clone() });
    bob_peer.push(ServerMessage::GameReset { room });
    alice.poll_until("lobby", |c| c.store().screen() == Screen::Lobby);
    bob.poll_until("lobby", |c| c.store().screen() == Screen::Lobby);
    assert!(alice.client.store().game().is_none());
    assert!(bob.client.store().chat().is_empty());
}

/// Error notices and frames the participant cannot decode leave the session
/// alone.
#[test]
fn bad_frames_and_room_errors_keep_the_session() {
    let coordinator = MockCoordinator::start();
    let (mut alice, mut alice_peer, _bob, _bob_peer, _room) = lobby(&coordinator);
    let session = alice.client.channel_state().clone();

    alice_peer.push_raw(r#"{"type": "room_error", "data": {"error": "Room is full"}}"#);
    alice_peer.push_raw(r#"{"type": "fireworks", "data": {"count": 3}}"#);
    alice_peer.push_raw(r#"{"type": "timer_tick", "data": {"remaining": -1, "type": "drawing"}}"#);
    alice_peer.push(ServerMessage::TimerTick {
        remaining: 42,
        kind: "drawing".into(),
    });
    alice.poll_until("timer", |c| c.store().timer().is_some());

    assert!(
        alice
            .effects
            .contains(&scribble_client::Effect::Notice("Room is full".into()))
    );
    assert_eq!(alice.client.store().timer().map(|t| t.remaining), Some(42));
    assert_eq!(alice.client.store().screen(), Screen::Lobby);
    assert_eq!(alice.client.channel_state(), &session);
    assert!(alice.client.store().room().is_some());
}

/// The coordinator hangs up; the participant reconnects into a fresh
/// session and registers its name again.
#[test]
fn reconnects_into_a_fresh_session() {
    let coordinator = MockCoordinator::start();
    let (mut alice, alice_peer) = join(&coordinator, "p-alice", "Alice");
    let first = alice_peer.session_id.clone();
    alice_peer.hang_up();

    alice.poll_until("reconnected", |c| {
        matches!(c.channel_state(), ChannelState::Connected { session_id } if *session_id != first)
    });
    let peer = coordinator.accept();
    assert_eq!(
        alice.client.channel_state(),
        &ChannelState::Connected {
            session_id: peer.session_id.clone()
        }
    );
    peer.expect("set_player_name", |m| {
        *m == ClientMessage::SetPlayerName {
            name: "Alice".into(),
        }
    });
    assert!(alice.client.store().player_id().is_none());
    assert_eq!(alice.client.store().screen(), Screen::Home);
}

/// With the coordinator gone for good, the participant stops after the
/// configured number of attempts and parks on the disconnected screen.
#[test]
fn gives_up_after_bounded_retries() {
    let mut coordinator = MockCoordinator::start();
    let mut alice = TestParticipant::connect_with(
        coordinator.addr(),
        "Alice",
        ReconnectPolicy {
            max_attempts: 2,
            initial_delay_ms: 10,
            max_delay_ms: 20,
        },
    );
    let peer = coordinator.accept();
    alice.poll_until("connected", |c| {
        matches!(c.channel_state(), ChannelState::Connected { .. })
    });

    coordinator.stop_listening();
    peer.hang_up();

    alice.poll_until("failure", |c| c.channel_state() == &ChannelState::Failed);
    assert_eq!(alice.client.store().screen(), Screen::Disconnected);

    // Terminal: no further attempts, however long we keep pumping.
    std::thread::sleep(std::time::Duration::from_millis(100));
    alice.pump();
    assert_eq!(alice.client.channel_state(), &ChannelState::Failed);
    assert!(alice.client.start_game(std::time::Instant::now()).is_err());
}
