// MIT License - Copyright (c) 2026 Peter Wright
// Envisalink TPI client

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info};

use crate::codec;
use crate::codes::{ClientCode, Registries, ServerCode};
use crate::config::TpiConfig;
use crate::error::{Result, TpiError};
use crate::event::{ConnectionState, StateReceiver, StateSender, state_channel};
use crate::frame::FrameReader;
use crate::message::ServerMessage;
use crate::status::{LoginResult, PanicTarget};
use crate::transport::connection::Connection;
use crate::transport::dispatcher::{Dispatcher, ListenerId, PendingReply, ReplyFilter};
use crate::transport::keepalive::spawn_keepalive;
use crate::transport::pump::spawn_pump;

/// Background tasks and socket of one logged-in session.
struct Session {
    connection: Arc<Connection>,
    pump: JoinHandle<()>,
    keepalive: Option<JoinHandle<()>>,
}

impl Session {
    async fn shutdown(mut self) {
        self.connection.close().await;
        if let Some(keepalive) = self.keepalive.take() {
            keepalive.abort();
            let _ = keepalive.await;
        }
        self.pump.abort();
        let _ = (&mut self.pump).await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.pump.abort();
        if let Some(keepalive) = &self.keepalive {
            keepalive.abort();
        }
    }
}

/// Client for an Envisalink TPI.
///
/// Created via [`TpiClient::connect()`], which opens the socket and logs in.
/// All methods take `&self`; share the client behind an `Arc` to send from
/// several tasks.
pub struct TpiClient {
    config: TpiConfig,
    registries: Arc<Registries>,
    dispatcher: Arc<Dispatcher>,
    state: Arc<StateSender>,
    session: RwLock<Option<Session>>,
}

impl TpiClient {
    /// Connect to the Envisalink and log in.
    ///
    /// Sequence: TCP connect -> panel greeting -> NetworkLogin -> LoginRes "1".
    /// On success the keepalive is running and the state is `Ready`.
    pub async fn connect(config: TpiConfig) -> Result<Self> {
        let registries = Arc::new(Registries::new()?);
        let dispatcher = Arc::new(Dispatcher::new(config.inbox_capacity));
        let (state, _) = state_channel();

        let client = Self {
            config,
            registries,
            dispatcher,
            state: Arc::new(state),
            session: RwLock::new(None),
        };
        client.start_session().await?;
        Ok(client)
    }

    async fn start_session(&self) -> Result<()> {
        let mut slot = self.session.write().await;
        if let Some(old) = slot.take() {
            old.shutdown().await;
        }
        self.dispatcher.reopen();

        // registered before the pump starts so listeners cannot swallow the greeting
        let greeting = self.dispatcher.expect(ReplyFilter::any())?;
        let (connection, reader) = Connection::open(
            &self.config.host,
            self.config.port,
            self.config.retry_policy(),
            self.state.clone(),
        )
        .await?;

        let pump = spawn_pump(
            reader,
            FrameReader::with_max_frame_len(self.config.max_frame_len),
            self.registries.clone(),
            self.dispatcher.clone(),
            connection.clone(),
        );
        let mut session = Session {
            connection,
            pump,
            keepalive: None,
        };

        let login = match self.authenticate(&session.connection, greeting).await {
            Ok(()) => session.connection.mark_ready(),
            Err(e) => Err(e),
        };
        if let Err(e) = login {
            error!("Login to {} failed: {}", session.connection.peer(), e);
            self.dispatcher.close();
            session.shutdown().await;
            return Err(e);
        }

        session.keepalive = Some(spawn_keepalive(
            session.connection.clone(),
            self.dispatcher.clone(),
            self.config.keepalive_interval,
        ));
        info!("Logged in to TPI at {}", session.connection.peer());
        *slot = Some(session);
        Ok(())
    }

    async fn authenticate(&self, connection: &Connection, greeting: PendingReply) -> Result<()> {
        let limit = self.config.auth_timeout;

        let greeting = greeting
            .wait(limit)
            .await
            .map_err(|e| login_error(e, "no greeting from panel"))?;
        debug!("Panel greeting: {}", greeting);

        let reply = self.dispatcher.expect(ReplyFilter::code(ServerCode::LoginRes))?;
        let frame = codec::encode(ClientCode::NetworkLogin, self.config.password.as_bytes())?;
        debug!("Sending NetworkLogin");
        connection.write(&frame).await?;

        let result = reply
            .wait(limit)
            .await
            .map_err(|e| login_error(e, "no login result"))?;

        match LoginResult::from_data(result.data()) {
            Some(LoginResult::Success) => Ok(()),
            Some(LoginResult::Failure) => Err(TpiError::Authentication {
                reason: "password rejected".to_string(),
            }),
            Some(LoginResult::TimedOut) => Err(TpiError::Authentication {
                reason: "panel timed out waiting for the password".to_string(),
            }),
            Some(LoginResult::Request) | None => Err(TpiError::Authentication {
                reason: format!("unexpected login result {:?}", result.data_str()),
            }),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Observe state transitions, across reconnects.
    pub fn subscribe_state(&self) -> StateReceiver {
        self.state.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    pub fn config(&self) -> &TpiConfig {
        &self.config
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    async fn ready_connection(&self) -> Result<Arc<Connection>> {
        let session = self.session.read().await;
        let state = self.state();
        match session.as_ref() {
            Some(session) if state == ConnectionState::Ready => Ok(session.connection.clone()),
            _ if state.is_terminal() => Err(TpiError::ConnectionClosed),
            _ => Err(TpiError::InvalidState {
                state: state.to_string(),
            }),
        }
    }

    /// Send a command and optionally wait for a reply.
    ///
    /// The reply waiter is registered before the bytes go out, so a fast
    /// reply cannot be missed. Waiting for `Ack` matches the acknowledgement
    /// of this command only. Without `expect_reply` the call returns
    /// `Ok(None)` once the command is written.
    pub async fn send(
        &self,
        code: ClientCode,
        data: &[u8],
        expect_reply: Option<ServerCode>,
        timeout: Duration,
    ) -> Result<Option<ServerMessage>> {
        let filter = expect_reply.map(|reply| match reply {
            ServerCode::Ack => ReplyFilter::ack_of(code),
            other => ReplyFilter::code(other),
        });
        self.send_filtered(code, data, filter, timeout).await
    }

    /// Like [`send()`](Self::send) with an explicit reply filter.
    pub async fn send_filtered(
        &self,
        code: ClientCode,
        data: &[u8],
        filter: Option<ReplyFilter>,
        timeout: Duration,
    ) -> Result<Option<ServerMessage>> {
        let connection = self.ready_connection().await?;
        let frame = codec::encode(code, data)?;
        let pending = filter.map(|f| self.dispatcher.expect(f)).transpose()?;

        // payloads may carry user codes; log the command only
        debug!("Sending {}", code);
        connection.write(&frame).await?;

        match pending {
            Some(reply) => reply.wait(timeout).await.map(Some),
            None => Ok(None),
        }
    }

    /// Send a command named by its code table entry, e.g. `"StatusReport"`.
    pub async fn send_by_name(
        &self,
        name: &str,
        data: &[u8],
        expect_reply: Option<&str>,
        timeout: Duration,
    ) -> Result<Option<ServerMessage>> {
        let code = self
            .registries
            .client
            .by_name(name)
            .ok_or_else(|| TpiError::UnknownCodeName {
                name: name.to_string(),
            })?;
        let reply = expect_reply
            .map(|reply| {
                self.registries
                    .server
                    .by_name(reply)
                    .ok_or_else(|| TpiError::UnknownCodeName {
                        name: reply.to_string(),
                    })
            })
            .transpose()?;
        self.send(code, data, reply, timeout).await
    }

    /// Invoke `callback` for every message with `code`. Survives reconnects.
    ///
    /// Callbacks run on the reader task and must not block.
    pub fn on<F>(&self, code: ServerCode, callback: F) -> ListenerId
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.dispatcher.on(code, callback)
    }

    /// Invoke `callback` for the next message with `code` only.
    pub fn once<F>(&self, code: ServerCode, callback: F) -> ListenerId
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.dispatcher.once(code, callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.dispatcher.remove_listener(id)
    }

    /// Drop the current session and log in again.
    ///
    /// Pending waiters of the old session fail with `ConnectionClosed`;
    /// listeners carry over.
    pub async fn reconnect(&self) -> Result<()> {
        info!("Reconnecting to {}:{}", self.config.host, self.config.port);
        self.dispatcher.close();
        self.start_session().await
    }

    /// Close the session. Idempotent.
    ///
    /// Blocked waiters are woken before the session lock is taken, so a
    /// login still in progress fails with `ConnectionClosed` right away.
    pub async fn close(&self) {
        self.dispatcher.close();
        let session = self.session.write().await.take();
        if let Some(session) = session {
            session.shutdown().await;
        }
    }

    async fn command(&self, code: ClientCode, data: &[u8]) -> Result<()> {
        self.send(code, data, Some(ServerCode::Ack), self.config.reply_timeout)
            .await?;
        Ok(())
    }

    pub async fn poll(&self) -> Result<()> {
        self.command(ClientCode::Poll, b"").await
    }

    /// Ask the panel to replay the state of every partition and zone.
    pub async fn status_report(&self) -> Result<()> {
        self.command(ClientCode::StatusReport, b"").await
    }

    pub async fn dump_zone_timers(&self) -> Result<()> {
        self.command(ClientCode::DumpZoneTimers, b"").await
    }

    pub async fn arm_away(&self, partition: u8) -> Result<()> {
        self.command(ClientCode::PartitionArmAway, &partition_data(partition, "")?)
            .await
    }

    pub async fn arm_stay(&self, partition: u8) -> Result<()> {
        self.command(ClientCode::PartitionArmStay, &partition_data(partition, "")?)
            .await
    }

    pub async fn arm_zero_entry_delay(&self, partition: u8) -> Result<()> {
        self.command(
            ClientCode::PartitionArmZeroEntryDelay,
            &partition_data(partition, "")?,
        )
        .await
    }

    pub async fn arm_with_code(&self, partition: u8, user_code: &str) -> Result<()> {
        self.command(
            ClientCode::PartitionArmWithCode,
            &partition_data(partition, user_code)?,
        )
        .await
    }

    pub async fn disarm(&self, partition: u8, user_code: &str) -> Result<()> {
        self.command(
            ClientCode::PartitionDisarm,
            &partition_data(partition, user_code)?,
        )
        .await
    }

    pub async fn trigger_panic(&self, target: PanicTarget) -> Result<()> {
        self.command(ClientCode::TriggerPanicAlarm, target.as_data())
            .await
    }

    pub async fn send_keystrokes(&self, partition: u8, keys: &str) -> Result<()> {
        self.command(
            ClientCode::SendKeystrokeString,
            &partition_data(partition, keys)?,
        )
        .await
    }
}

fn login_error(e: TpiError, what: &str) -> TpiError {
    match e {
        TpiError::Timeout { after, .. } => TpiError::Authentication {
            reason: format!("{what} within {after:?}"),
        },
        other => other,
    }
}

/// Partition digit followed by an optional suffix.
fn partition_data(partition: u8, suffix: &str) -> Result<Vec<u8>> {
    if !(1..=8).contains(&partition) {
        return Err(TpiError::InvalidPartition { id: partition });
    }
    let mut data = vec![b'0' + partition];
    data.extend_from_slice(suffix.as_bytes());
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_data() {
        assert_eq!(partition_data(1, "").unwrap(), b"1");
        assert_eq!(partition_data(2, "1234").unwrap(), b"21234");
        assert!(matches!(
            partition_data(0, ""),
            Err(TpiError::InvalidPartition { id: 0 })
        ));
        assert!(matches!(
            partition_data(9, ""),
            Err(TpiError::InvalidPartition { id: 9 })
        ));
    }

    #[test]
    fn test_login_error_maps_timeout() {
        let e = login_error(
            TpiError::Timeout {
                expected: "LoginRes".to_string(),
                after: Duration::from_secs(10),
            },
            "no login result",
        );
        assert!(matches!(e, TpiError::Authentication { .. }));

        let e = login_error(TpiError::ConnectionClosed, "no login result");
        assert!(matches!(e, TpiError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_connect_refused_faults() {
        // bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = TpiConfig::builder().host("127.0.0.1").port(port).build();
        let err = TpiClient::connect(config).await.err().unwrap();
        assert!(matches!(err, TpiError::Io(_)));
        assert!(err.is_retryable());
    }
}
