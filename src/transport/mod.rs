// MIT License - Copyright (c) 2026 Peter Wright
// Envisalink TPI client

pub mod connection;
pub mod dispatcher;
pub mod keepalive;
pub mod pump;

use std::future::Future;
use std::io;

use tokio::net::tcp::OwnedReadHalf;
use tokio::time::{Duration, sleep};
use tracing::{debug, warn};

use crate::error::{Result, TpiError};

/// Size of a single socket read.
const READ_CHUNK_SIZE: usize = 4096;

/// Non-blocking read half of a byte stream.
///
/// `readable` resolves once the stream is worth trying; `try_read` may still
/// report `WouldBlock`, which the reader treats as a transient failure.
pub trait ChunkRead: Send + Sync {
    fn readable(&self) -> impl Future<Output = io::Result<()>> + Send;

    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize>;
}

impl ChunkRead for OwnedReadHalf {
    async fn readable(&self) -> io::Result<()> {
        OwnedReadHalf::readable(self).await
    }

    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        OwnedReadHalf::try_read(self, buf)
    }
}

/// Linear backoff for transient read failures: failure N waits N x unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            unit,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given (1-based) consecutive failure.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.unit * attempt
    }
}

/// Reads chunks from the socket, absorbing transient failures.
///
/// A successful read resets the failure count. End of stream is a fault.
pub struct ChunkReader<R> {
    inner: R,
    retry: RetryPolicy,
    buf: Vec<u8>,
}

impl<R: ChunkRead> ChunkReader<R> {
    pub fn new(inner: R, retry: RetryPolicy) -> Self {
        Self {
            inner,
            retry,
            buf: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    /// Read the next non-empty chunk.
    pub async fn read_chunk(&mut self) -> Result<Vec<u8>> {
        let mut failures = 0u32;
        loop {
            self.inner.readable().await?;
            match self.inner.try_read(&mut self.buf) {
                Ok(0) => {
                    debug!("Reader: connection closed by panel");
                    return Err(TpiError::ConnectionFault {
                        reason: "connection closed by panel".to_string(),
                    });
                }
                Ok(n) => return Ok(self.buf[..n].to_vec()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    failures += 1;
                    if failures >= self.retry.max_attempts() {
                        warn!("Reader: giving up after {} transient failures", failures);
                        return Err(TpiError::ReadRetryExhausted { attempts: failures });
                    }
                    let delay = self.retry.delay(failures);
                    debug!("Reader: no data (attempt {}), retrying in {:?}", failures, delay);
                    sleep(delay).await;
                }
                Err(e) => return Err(TpiError::Io(e)),
            }
        }
    }
}
