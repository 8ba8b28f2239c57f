// MIT License - Copyright (c) 2026 Peter Wright
// Envisalink TPI client

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::{Result, TpiError};
use crate::event::{ConnectionState, StateReceiver, StateSender};
use crate::transport::{ChunkReader, RetryPolicy};

/// One TCP session with the Envisalink.
///
/// Owns the write half of the socket behind a lock so concurrent senders
/// never interleave bytes. The read half is handed to the message pump.
pub struct Connection {
    peer: String,
    writer: Mutex<Option<OwnedWriteHalf>>,
    state: Arc<StateSender>,
}

impl Connection {
    /// Open the socket and move the session to `Authenticating`.
    ///
    /// The state channel outlives sessions; it is reset to `Disconnected`
    /// before connecting.
    pub async fn open(
        host: &str,
        port: u16,
        retry: RetryPolicy,
        state: Arc<StateSender>,
    ) -> Result<(Arc<Self>, ChunkReader<OwnedReadHalf>)> {
        let peer = format!("{host}:{port}");
        state.send_replace(ConnectionState::Disconnected);

        let connection = Arc::new(Self {
            peer,
            writer: Mutex::new(None),
            state,
        });
        connection.transition(ConnectionState::Connecting);
        info!("Connecting to TPI at {}", connection.peer);

        let stream = match TcpStream::connect(&connection.peer).await {
            Ok(stream) => stream,
            Err(e) => {
                connection.fault(format!("connect failed: {e}"));
                return Err(TpiError::Io(e));
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY: {}", e);
        }
        debug!("TCP socket connected");

        let (reader, writer) = stream.into_split();
        *connection.writer.lock().await = Some(writer);
        connection.transition(ConnectionState::Authenticating);

        Ok((connection, ChunkReader::new(reader, retry)))
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> StateReceiver {
        self.state.subscribe()
    }

    /// Apply a transition if the state machine allows it.
    pub(crate) fn transition(&self, next: ConnectionState) -> bool {
        self.state.send_if_modified(|current| {
            if current.can_transition_to(&next) {
                debug!("Connection state: {} -> {}", current, next);
                *current = next;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn mark_ready(&self) -> Result<()> {
        if self.transition(ConnectionState::Ready) {
            Ok(())
        } else {
            Err(TpiError::InvalidState {
                state: self.state().to_string(),
            })
        }
    }

    /// Write one encoded frame. Writes are serialized.
    pub async fn write(&self, frame: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        if !self.state().is_open() {
            return Err(TpiError::ConnectionClosed);
        }
        let Some(writer) = guard.as_mut() else {
            return Err(TpiError::ConnectionClosed);
        };
        if let Err(e) = writer.write_all(frame).await {
            error!("Failed to write to {}: {}", self.peer, e);
            self.fault(format!("write failed: {e}"));
            return Err(TpiError::Io(e));
        }
        Ok(())
    }

    /// Mark the session faulted. No-op once the session has ended.
    pub fn fault(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.transition(ConnectionState::Faulted(reason.clone())) {
            error!("Connection to {} faulted: {}", self.peer, reason);
        }
    }

    /// Close the session. Idempotent; a faulted session stays `Faulted`.
    pub async fn close(&self) {
        if self.transition(ConnectionState::Closed) {
            info!("Closing connection to {}", self.peer);
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Socket shutdown: {}", e);
            }
        }
    }
}
