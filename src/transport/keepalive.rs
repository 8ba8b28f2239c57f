// MIT License - Copyright (c) 2026 Peter Wright
// Envisalink TPI client

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, error, warn};

use crate::codec;
use crate::codes::ClientCode;
use crate::config::MIN_KEEPALIVE_INTERVAL;
use crate::event::ConnectionState;
use crate::transport::connection::Connection;
use crate::transport::dispatcher::{Dispatcher, PendingReply, ReplyFilter};

/// Spawn the keepalive loop: a `Poll` every `period` while the session is Ready.
///
/// The loop never blocks on the panel's reply. Each poll claims its own `Ack`
/// so acknowledgements do not pile up in the inbox; a missing ack is only
/// logged. The task exits as soon as the session leaves `Ready`.
pub(crate) fn spawn_keepalive(
    connection: Arc<Connection>,
    dispatcher: Arc<Dispatcher>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let poll = match codec::encode(ClientCode::Poll, b"") {
            Ok(frame) => frame,
            Err(e) => {
                error!("Keepalive: cannot encode poll: {}", e);
                return;
            }
        };

        let mut state_rx = connection.subscribe();
        // config fields are public, so the builder's clamp can be bypassed
        let mut ticker = interval(period.max(MIN_KEEPALIVE_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        let mut outstanding: Option<PendingReply> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = state_rx.wait_for(|s| *s != ConnectionState::Ready) => {
                    debug!("Keepalive: session no longer ready, stopping");
                    break;
                }
            }

            if let Some(mut previous) = outstanding.take() {
                if previous.try_take().is_none() {
                    warn!("Keepalive: previous poll was not acknowledged");
                }
            }

            outstanding = match dispatcher.expect(ReplyFilter::ack_of(ClientCode::Poll)) {
                Ok(reply) => Some(reply),
                Err(_) => break,
            };

            debug!("Keepalive: sending poll");
            if let Err(e) = connection.write(&poll).await {
                warn!("Keepalive: poll failed: {}", e);
                break;
            }
        }
    })
}
