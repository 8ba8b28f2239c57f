// MIT License - Copyright (c) 2026 Peter Wright
// Envisalink TPI client

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::codec;
use crate::codes::{CodeRegistry, Registries, ServerCode};
use crate::frame::FrameReader;
use crate::message::ServerMessage;
use crate::transport::connection::Connection;
use crate::transport::dispatcher::Dispatcher;
use crate::transport::{ChunkRead, ChunkReader};

/// Spawn the task that reads the socket and feeds the dispatcher.
///
/// Undecodable frames are logged and dropped. A read failure faults the
/// connection. Either way the dispatcher is closed when the task ends, so no
/// waiter outlives the session.
pub(crate) fn spawn_pump<R>(
    mut reader: ChunkReader<R>,
    mut frames: FrameReader,
    registries: Arc<Registries>,
    dispatcher: Arc<Dispatcher>,
    connection: Arc<Connection>,
) -> JoinHandle<()>
where
    R: ChunkRead + 'static,
{
    tokio::spawn(async move {
        let mut state_rx = connection.subscribe();

        loop {
            let chunk = tokio::select! {
                result = reader.read_chunk() => result,
                _ = state_rx.wait_for(|s| s.is_terminal()) => {
                    debug!("Pump: session ended, stopping");
                    break;
                }
            };

            match chunk {
                Ok(bytes) => {
                    let messages = decode_chunk(&mut frames, &bytes, &registries.server);
                    if !messages.is_empty() {
                        dispatcher.deliver(messages);
                    }
                }
                Err(e) => {
                    connection.fault(e.to_string());
                    break;
                }
            }
        }

        dispatcher.close();
    })
}

/// Frame and decode one chunk, skipping anything that does not decode.
pub(crate) fn decode_chunk(
    frames: &mut FrameReader,
    chunk: &[u8],
    registry: &CodeRegistry<ServerCode>,
) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    for frame in frames.push(chunk) {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping inbound data: {}", e);
                continue;
            }
        };
        match codec::decode(&frame, registry) {
            Ok(msg) => {
                debug!("Received {}", msg);
                messages.push(msg);
            }
            Err(e) => warn!(
                "Dropping frame {:?}: {}",
                String::from_utf8_lossy(&frame),
                e
            ),
        }
    }
    messages
}
