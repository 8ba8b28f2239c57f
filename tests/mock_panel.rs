// MIT License - Copyright (c) 2026 Peter Wright
// Envisalink TPI client

//! End-to-end tests against an in-process mock Envisalink.
//!
//! The mock greets every connection with a login request, answers
//! NetworkLogin according to the password, acknowledges every command and
//! follows a StatusReport with a couple of partition/zone events. Tests can
//! inject arbitrary frames and make the panel hang up.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

use envisalink_tpi::codec::{RawFrame, decode_raw, encode_raw};
use envisalink_tpi::frame::FrameReader;
use envisalink_tpi::{ClientCode, ConnectionState, ServerCode, TpiClient, TpiConfig, TpiError};

const PASSWORD: &str = "user";
const WAIT: Duration = Duration::from_secs(2);

enum PanelCmd {
    Send(Vec<u8>),
    HangUp,
}

struct MockPanel {
    addr: SocketAddr,
    commands: mpsc::UnboundedSender<PanelCmd>,
    received: mpsc::UnboundedReceiver<RawFrame>,
    accepted: Arc<AtomicUsize>,
    // when set, new connections are held open but never greeted
    silent: Arc<AtomicBool>,
}

fn frame(code: u16, data: &str) -> Vec<u8> {
    encode_raw(code, data.as_bytes()).unwrap()
}

fn respond(request: &RawFrame) -> Vec<Vec<u8>> {
    let ack = frame(500, &format!("{:03}", request.code));
    match request.code {
        5 => {
            let result = if request.data == PASSWORD.as_bytes() { "1" } else { "0" };
            vec![ack, frame(505, result)]
        }
        1 => vec![ack, frame(650, "1"), frame(609, "003")],
        _ => vec![ack],
    }
}

impl MockPanel {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        let accepted = Arc::new(AtomicUsize::new(0));
        let accepted_count = accepted.clone();
        let silent = Arc::new(AtomicBool::new(false));
        let stay_silent = silent.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                accepted_count.fetch_add(1, Ordering::SeqCst);
                if stay_silent.load(Ordering::SeqCst) {
                    let mut buf = [0u8; 1024];
                    while matches!(socket.read(&mut buf).await, Ok(n) if n > 0) {}
                    continue;
                }
                if socket.write_all(&frame(505, "3")).await.is_err() {
                    continue;
                }

                let mut frames = FrameReader::new();
                let mut buf = [0u8; 1024];
                loop {
                    tokio::select! {
                        read = socket.read(&mut buf) => {
                            let n = match read {
                                Ok(0) | Err(_) => break,
                                Ok(n) => n,
                            };
                            for f in frames.push(&buf[..n]) {
                                let raw = decode_raw(&f.unwrap()).unwrap();
                                for reply in respond(&raw) {
                                    let _ = socket.write_all(&reply).await;
                                }
                                let _ = seen_tx.send(raw);
                            }
                        }
                        cmd = cmd_rx.recv() => match cmd {
                            Some(PanelCmd::Send(bytes)) => {
                                let _ = socket.write_all(&bytes).await;
                            }
                            Some(PanelCmd::HangUp) => break,
                            None => return,
                        }
                    }
                }
            }
        });

        Self {
            addr,
            commands: cmd_tx,
            received: seen_rx,
            accepted,
            silent,
        }
    }

    fn config(&self) -> TpiConfig {
        TpiConfig::builder()
            .host("127.0.0.1")
            .port(self.addr.port())
            .password(PASSWORD)
            .keepalive_interval(Duration::from_secs(60))
            .auth_timeout(WAIT)
            .reply_timeout(WAIT)
            .build()
    }

    fn send(&self, code: u16, data: &str) {
        let _ = self.commands.send(PanelCmd::Send(frame(code, data)));
    }

    fn hang_up(&self) {
        let _ = self.commands.send(PanelCmd::HangUp);
    }

    /// Next command the panel received with the given code.
    async fn received_code(&mut self, code: u16) -> RawFrame {
        timeout(WAIT, async {
            loop {
                let raw = self.received.recv().await.expect("mock panel stopped");
                if raw.code == code {
                    return raw;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("panel never received code {code:03}"))
    }
}

async fn wait_for_state(client: &TpiClient, pred: impl FnMut(&ConnectionState) -> bool) {
    let mut state_rx = client.subscribe_state();
    timeout(WAIT, state_rx.wait_for(pred))
        .await
        .expect("state change timed out")
        .expect("state channel closed");
}

#[tokio::test]
async fn test_connects_and_logs_in() {
    let mut panel = MockPanel::start().await;
    let client = TpiClient::connect(panel.config()).await.unwrap();

    assert_eq!(client.state(), ConnectionState::Ready);
    let login = panel.received_code(5).await;
    assert_eq!(login.data, PASSWORD.as_bytes());

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_wrong_password_is_fatal() {
    let panel = MockPanel::start().await;
    let mut config = panel.config();
    config.password = "wrong".to_string();

    let err = TpiClient::connect(config).await.err().unwrap();
    assert!(matches!(err, TpiError::Authentication { .. }), "{err}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_send_waits_for_its_ack() {
    let panel = MockPanel::start().await;
    let client = TpiClient::connect(panel.config()).await.unwrap();

    let reply = client
        .send(ClientCode::StatusReport, b"", Some(ServerCode::Ack), WAIT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.code(), ServerCode::Ack);
    assert_eq!(reply.data(), b"001");
}

#[tokio::test]
async fn test_send_without_reply() {
    let mut panel = MockPanel::start().await;
    let client = TpiClient::connect(panel.config()).await.unwrap();

    let reply = client
        .send(ClientCode::DumpZoneTimers, b"", None, WAIT)
        .await
        .unwrap();
    assert!(reply.is_none());
    panel.received_code(8).await;
}

#[tokio::test]
async fn test_reply_correlated_by_code() {
    let mut panel = MockPanel::start().await;
    let client = Arc::new(TpiClient::connect(panel.config()).await.unwrap());

    let sender = Arc::clone(&client);
    let request = tokio::spawn(async move {
        sender
            .send(
                ClientCode::TimeBroadcastControl,
                b"1",
                Some(ServerCode::SystemTime),
                WAIT,
            )
            .await
    });

    panel.received_code(56).await;
    panel.send(550, "1200010126");

    let reply = request.await.unwrap().unwrap().unwrap();
    assert_eq!(reply.code(), ServerCode::SystemTime);
    assert_eq!(reply.data(), b"1200010126");
}

#[tokio::test]
async fn test_listener_receives_events() {
    let panel = MockPanel::start().await;
    let client = TpiClient::connect(panel.config()).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on(ServerCode::PartitionReady, move |msg| {
        let _ = tx.send(msg.data().to_vec());
    });

    client.status_report().await.unwrap();
    let data = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(data, b"1");
}

#[tokio::test]
async fn test_once_listener_fires_once() {
    let panel = MockPanel::start().await;
    let client = TpiClient::connect(panel.config()).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.once(ServerCode::ZoneOpen, move |msg| {
        let _ = tx.send(msg.data().to_vec());
    });
    let (marker_tx, mut marker_rx) = mpsc::unbounded_channel();
    client.on(ServerCode::PartitionReady, move |_| {
        let _ = marker_tx.send(());
    });

    panel.send(609, "001");
    panel.send(609, "002");
    panel.send(650, "1");

    let first = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, b"001");
    // once the marker is in, both zone frames have been dispatched
    timeout(WAIT, marker_rx.recv()).await.unwrap().unwrap();
    // the spent listener is dropped along with its sender
    assert!(rx.recv().await.is_none());

    // the second zone event did not stay behind for a later wait
    let err = client
        .send(
            ClientCode::DumpZoneTimers,
            b"",
            Some(ServerCode::ZoneOpen),
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TpiError::Timeout { .. }), "{err}");
}

#[tokio::test]
async fn test_keepalive_polls_while_ready() {
    let mut panel = MockPanel::start().await;
    let mut config = panel.config();
    config.keepalive_interval = Duration::from_millis(50);
    let client = TpiClient::connect(config).await.unwrap();

    let poll = panel.received_code(0).await;
    assert!(poll.data.is_empty());
    panel.received_code(0).await;

    // poll acks are claimed by the keepalive and do not reach other waiters
    let reply = client
        .send(ClientCode::StatusReport, b"", Some(ServerCode::Ack), WAIT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.data(), b"001");
}

#[tokio::test]
async fn test_panel_hang_up_faults_session() {
    let panel = MockPanel::start().await;
    let client = TpiClient::connect(panel.config()).await.unwrap();

    panel.hang_up();
    wait_for_state(&client, |s| matches!(s, ConnectionState::Faulted(_))).await;

    let err = client
        .send(ClientCode::StatusReport, b"", Some(ServerCode::Ack), WAIT)
        .await
        .unwrap_err();
    assert!(matches!(err, TpiError::ConnectionClosed));
}

#[tokio::test]
async fn test_close_wakes_pending_waiter() {
    let mut panel = MockPanel::start().await;
    let client = Arc::new(TpiClient::connect(panel.config()).await.unwrap());

    let sender = Arc::clone(&client);
    let request = tokio::spawn(async move {
        sender
            .send(
                ClientCode::TimeBroadcastControl,
                b"1",
                Some(ServerCode::SystemTime),
                Duration::from_secs(30),
            )
            .await
    });
    panel.received_code(56).await;

    client.close().await;
    let result = timeout(WAIT, request).await.unwrap().unwrap();
    assert!(matches!(result, Err(TpiError::ConnectionClosed)));
    assert_eq!(client.state(), ConnectionState::Closed);

    // closing twice is harmless
    client.close().await;
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_reconnect_after_fault() {
    let panel = MockPanel::start().await;
    let client = TpiClient::connect(panel.config()).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on(ServerCode::ZoneOpen, move |msg| {
        let _ = tx.send(msg.data().to_vec());
    });

    panel.hang_up();
    wait_for_state(&client, |s| matches!(s, ConnectionState::Faulted(_))).await;

    client.reconnect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Ready);
    assert_eq!(panel.accepted.load(Ordering::SeqCst), 2);

    // listeners survive the reconnect
    client.status_report().await.unwrap();
    let data = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(data, b"003");
}

#[tokio::test]
async fn test_send_by_name() {
    let panel = MockPanel::start().await;
    let client = TpiClient::connect(panel.config()).await.unwrap();

    let reply = client
        .send_by_name("StatusReport", b"", Some("Ack"), WAIT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.data(), b"001");

    let err = client
        .send_by_name("SelfDestruct", b"", None, WAIT)
        .await
        .unwrap_err();
    assert!(matches!(err, TpiError::UnknownCodeName { .. }));
}

#[tokio::test]
async fn test_arm_and_disarm_commands() {
    let mut panel = MockPanel::start().await;
    let client = TpiClient::connect(panel.config()).await.unwrap();

    client.arm_stay(1).await.unwrap();
    assert_eq!(panel.received_code(31).await.data, b"1");

    client.disarm(1, "1234").await.unwrap();
    assert_eq!(panel.received_code(40).await.data, b"11234");

    assert!(matches!(
        client.arm_away(9).await,
        Err(TpiError::InvalidPartition { id: 9 })
    ));
}

#[tokio::test]
async fn test_close_interrupts_login() {
    let panel = MockPanel::start().await;
    let mut config = panel.config();
    config.auth_timeout = Duration::from_secs(30);
    let client = Arc::new(TpiClient::connect(config).await.unwrap());

    panel.silent.store(true, Ordering::SeqCst);
    let reconnecting = Arc::clone(&client);
    let task = tokio::spawn(async move { reconnecting.reconnect().await });

    timeout(WAIT, async {
        while panel.accepted.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("reconnect never reached the panel");

    timeout(WAIT, client.close())
        .await
        .expect("close blocked behind the login");
    let result = timeout(WAIT, task).await.unwrap().unwrap();
    assert!(matches!(result, Err(TpiError::ConnectionClosed)), "{result:?}");
    assert_eq!(client.state(), ConnectionState::Closed);
}
