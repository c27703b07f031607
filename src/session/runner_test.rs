use super::*;
use crate::clock::SystemClock;
use crate::error::ErrorKind;
use crate::scale::{DeckKind, EstimationScale};
use crate::session::observer::RecordingObserver;
use crate::session::snapshot::SessionSnapshot;
use frames::{GameInit, ServerMessage, UserInfo, VoteRecord};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const COORDINATOR_ID: u64 = 1;

/// Loopback authority: answers `initialise_game` with an empty round,
/// echoes votes as broadcasts, and reports every decoded request.
async fn spawn_authority() -> (ClientConfig, mpsc::UnboundedReceiver<ClientMessage>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(socket).await.expect("handshake");
        while let Some(Ok(frame)) = ws.next().await {
            let Message::Text(text) = frame else {
                continue;
            };
            let Ok(request) = frames::decode_client_message(text.as_bytes()) else {
                continue;
            };
            let reply = match request {
                ClientMessage::InitialiseGame => Some(ServerMessage::InitialiseGame(GameInit {
                    users: vec![UserInfo { id: 1, first_name: "Ada".into(), last_name: "Lovelace".into(), email: None }],
                    ..GameInit::default()
                })),
                ClientMessage::Vote { estimate } => {
                    Some(ServerMessage::Vote(VoteRecord { user_id: 1, user: None, estimate }))
                }
                _ => None,
            };
            if let Some(reply) = reply {
                let body = frames::encode_server_message(&reply);
                if ws.send(Message::Text(body.into())).await.is_err() {
                    break;
                }
            }
            if seen_tx.send(request).is_err() {
                break;
            }
        }
    });

    (client_config(&format!("ws://{addr}/")), seen_rx)
}

fn client_config(base: &str) -> ClientConfig {
    ClientConfig { ws_base_url: base.to_owned(), tick: Duration::from_millis(20), command_buffer: 8 }
}

fn session_config() -> SessionConfig {
    SessionConfig {
        session_id: "9".into(),
        ticket_id: "PB-3".into(),
        duration_secs: 60,
        estimation_scale: EstimationScale::from_deck(DeckKind::Fibonacci),
        coordinator_user_id: COORDINATOR_ID,
    }
}

fn identity(user_id: u64) -> Identity {
    Identity { user_id, display_name: "Ada Lovelace".into(), token: "secret".into() }
}

fn start(
    user_id: u64,
    client: &ClientConfig,
) -> (SessionHandle, JoinHandle<Phase>, RecordingObserver) {
    let observer = RecordingObserver::new();
    let (handle, task) = spawn_session(
        session_config(),
        &identity(user_id),
        client,
        Box::new(observer.clone()),
        Arc::new(SystemClock),
    )
    .expect("valid session url");
    (handle, task, observer)
}

async fn wait_for(observer: &RecordingObserver, check: impl Fn(&SessionSnapshot) -> bool) {
    let poll = async {
        loop {
            if observer.last_snapshot().is_some_and(|snapshot| check(&snapshot)) {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
    };
    timeout(Duration::from_secs(2), poll).await.expect("snapshot condition timed out");
}

async fn next_request(seen: &mut mpsc::UnboundedReceiver<ClientMessage>) -> ClientMessage {
    timeout(Duration::from_secs(2), seen.recv())
        .await
        .expect("request timed out")
        .expect("authority stopped")
}

async fn finished(task: JoinHandle<Phase>) -> Phase {
    timeout(Duration::from_secs(2), task).await.expect("session did not finish").expect("session task panicked")
}

#[tokio::test]
async fn joins_votes_and_closes() {
    let (client, mut seen) = spawn_authority().await;
    let (handle, task, observer) = start(COORDINATOR_ID, &client);

    assert_eq!(next_request(&mut seen).await, ClientMessage::InitialiseGame);
    wait_for(&observer, |s| s.phase == Phase::Active).await;

    handle.cast_vote(5).await.unwrap();
    assert_eq!(next_request(&mut seen).await, ClientMessage::Vote { estimate: 5 });
    wait_for(&observer, |s| s.self_vote == Some(5)).await;

    handle.start_countdown().await.unwrap();
    assert_eq!(next_request(&mut seen).await, ClientMessage::StartTimer);

    handle.close().await;
    assert_eq!(finished(task).await, Phase::Terminated);
    assert!(observer.errors().is_empty());

    handle.close().await;
    assert!(observer.errors().is_empty());
    assert!(matches!(handle.cast_vote(3).await, Err(SessionError::ConnectionClosed)));
    assert_eq!(observer.errors(), vec![ErrorKind::ConnectionClosed]);
}

#[tokio::test]
async fn forbidden_action_sends_nothing() {
    let (client, mut seen) = spawn_authority().await;
    let (handle, task, observer) = start(2, &client);

    assert_eq!(next_request(&mut seen).await, ClientMessage::InitialiseGame);
    wait_for(&observer, |s| s.phase == Phase::Active).await;

    assert!(matches!(handle.skip().await, Err(SessionError::Forbidden { action: "skip", .. })));
    assert!(matches!(handle.cast_vote(4).await, Err(SessionError::InvalidEstimate(4))));
    handle.cast_vote(3).await.unwrap();
    assert_eq!(next_request(&mut seen).await, ClientMessage::Vote { estimate: 3 });

    handle.close().await;
    assert_eq!(finished(task).await, Phase::Terminated);
}

#[tokio::test]
async fn request_init_reaches_authority() {
    let (client, mut seen) = spawn_authority().await;
    let (handle, task, observer) = start(COORDINATOR_ID, &client);

    assert_eq!(next_request(&mut seen).await, ClientMessage::InitialiseGame);
    wait_for(&observer, |s| s.phase == Phase::Active).await;

    handle.request_init().await.unwrap();
    assert_eq!(next_request(&mut seen).await, ClientMessage::InitialiseGame);

    drop(handle);
    assert_eq!(finished(task).await, Phase::Terminated);
}

#[tokio::test]
async fn peer_close_terminates_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(socket).await.unwrap();
        let _ = ws.next().await;
        let _ = ws.close(None).await;
    });

    let (handle, task, observer) = start(COORDINATOR_ID, &client_config(&format!("ws://{addr}/")));
    assert_eq!(finished(task).await, Phase::Terminated);
    assert!(matches!(observer.errors().as_slice(), [ErrorKind::TerminalDisconnect(_)]));
    assert!(matches!(handle.cast_vote(5).await, Err(SessionError::ConnectionClosed)));
}

#[tokio::test]
async fn unreachable_authority_terminates_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (handle, task, observer) = start(COORDINATOR_ID, &client_config(&format!("ws://{addr}/")));
    assert_eq!(finished(task).await, Phase::Terminated);
    assert!(matches!(observer.errors().as_slice(), [ErrorKind::TerminalDisconnect(_)]));

    assert!(matches!(handle.cast_vote(5).await, Err(SessionError::ConnectionClosed)));
    assert!(matches!(handle.skip().await, Err(SessionError::ConnectionClosed)));
    assert!(matches!(
        observer.errors().as_slice(),
        [ErrorKind::TerminalDisconnect(_), ErrorKind::ConnectionClosed, ErrorKind::ConnectionClosed]
    ));
}

#[tokio::test]
async fn bad_base_url_is_rejected_before_spawn() {
    let result = spawn_session(
        session_config(),
        &identity(1),
        &client_config("ftp://example.com/"),
        Box::new(RecordingObserver::new()),
        Arc::new(SystemClock),
    );
    assert!(matches!(result, Err(ConfigError::InvalidBaseUrl(_))));
}
