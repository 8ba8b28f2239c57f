// MIT License - Copyright (c) 2026 Peter Wright
// Envisalink TPI client

//! Routes inbound messages to whoever is waiting for them.
//!
//! Each arriving message is offered once, in arrival order:
//!
//! 1. to the oldest waiter whose filter matches (correlated replies win),
//! 2. otherwise to every listener registered for its code,
//! 3. otherwise it is kept in a FIFO backlog that only later waiters search.
//!
//! The backlog is never offered to listeners, so a listener only sees
//! messages that arrive after it was registered.
//!
//! A one-shot listener is removed once it fires. For the rest of the session
//! its code counts as spent: later messages of that code that nobody takes
//! are discarded instead of kept, however the bytes were chunked.
//!
//! Listener callbacks run on the pump task, outside the inbox lock, in
//! arrival order. They must not block.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::time::{Duration, timeout};
use tracing::{debug, error, trace, warn};

use crate::codes::{ClientCode, Code, ServerCode};
use crate::error::{Result, TpiError};
use crate::message::ServerMessage;

type Callback = Arc<dyn Fn(&ServerMessage) + Send + Sync>;

/// Handle returned by listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Which inbound messages satisfy a reply wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyFilter {
    code: Option<ServerCode>,
    data: Option<Vec<u8>>,
}

impl ReplyFilter {
    /// The next message, whatever it is.
    pub fn any() -> Self {
        Self {
            code: None,
            data: None,
        }
    }

    /// The next message with this code.
    pub fn code(code: ServerCode) -> Self {
        Self {
            code: Some(code),
            data: None,
        }
    }

    /// The `Ack` (500) for a specific command.
    pub fn ack_of(code: ClientCode) -> Self {
        Self {
            code: Some(ServerCode::Ack),
            data: Some(format!("{:03}", code.value()).into_bytes()),
        }
    }

    pub fn matches(&self, msg: &ServerMessage) -> bool {
        self.code.is_none_or(|c| c == msg.code())
            && self.data.as_deref().is_none_or(|d| d == msg.data())
    }
}

impl fmt::Display for ReplyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.data) {
            (None, _) => f.write_str("any message"),
            (Some(code), None) => write!(f, "{code}"),
            (Some(code), Some(data)) => write!(f, "{code}({})", String::from_utf8_lossy(data)),
        }
    }
}

struct Waiter {
    id: u64,
    filter: ReplyFilter,
    tx: oneshot::Sender<ServerMessage>,
}

struct Listener {
    id: ListenerId,
    code: ServerCode,
    once: bool,
    // One-shot listeners are claimed by the first message they match.
    claimed: AtomicBool,
    callback: Callback,
}

impl Listener {
    /// Claim a one-shot listener. False if it already fired.
    fn claim(&self) -> bool {
        !self.once || !self.claimed.swap(true, Ordering::AcqRel)
    }

    fn is_spent(&self) -> bool {
        self.once && self.claimed.load(Ordering::Acquire)
    }

    fn invoke(&self, msg: &ServerMessage) {
        if catch_unwind(AssertUnwindSafe(|| (self.callback)(msg))).is_err() {
            error!("Listener {:?} for {} panicked on {}", self.id, self.code, msg);
        }
    }
}

struct Inbox {
    pending: VecDeque<ServerMessage>,
    waiters: VecDeque<Waiter>,
    listeners: Vec<Arc<Listener>>,
    // codes whose one-shot listener fired this session
    spent: HashSet<ServerCode>,
    closed: bool,
}

impl Inbox {
    /// Offer a message to the waiters. Gives it back if nobody took it.
    fn hand_to_waiter(&mut self, mut msg: ServerMessage) -> Option<ServerMessage> {
        while let Some(pos) = self.waiters.iter().position(|w| w.filter.matches(&msg)) {
            let Some(waiter) = self.waiters.remove(pos) else {
                break;
            };
            match waiter.tx.send(msg) {
                Ok(()) => {
                    trace!("Reply delivered to waiter {}", waiter.id);
                    return None;
                }
                // receiver gave up; try the next one
                Err(returned) => msg = returned,
            }
        }
        Some(msg)
    }

    /// Route newly arrived messages in order, returning listener
    /// invocations to run. Unclaimed messages join the backlog.
    fn dispatch(
        &mut self,
        messages: impl IntoIterator<Item = ServerMessage>,
    ) -> Vec<(Arc<Listener>, ServerMessage)> {
        let mut deliveries = Vec::new();

        for msg in messages {
            let Some(msg) = self.hand_to_waiter(msg) else {
                continue;
            };
            let mut consumed = false;
            for listener in self.listeners.iter().filter(|l| l.code == msg.code()) {
                if listener.claim() {
                    deliveries.push((Arc::clone(listener), msg.clone()));
                    consumed = true;
                }
            }
            for listener in self.listeners.iter().filter(|l| l.is_spent()) {
                self.spent.insert(listener.code);
            }
            self.listeners.retain(|l| !l.is_spent());

            if consumed {
                continue;
            }
            if self.spent.contains(&msg.code()) {
                trace!("Discarding {} for spent one-shot listener", msg);
            } else {
                self.pending.push_back(msg);
            }
        }

        deliveries
    }
}

/// Shared inbox, waiter queue and listener registry.
pub struct Dispatcher {
    inbox: Mutex<Inbox>,
    capacity: usize,
    next_id: AtomicU64,
}

impl Dispatcher {
    /// `capacity` bounds the number of unclaimed messages kept.
    pub fn new(capacity: usize) -> Self {
        Self {
            inbox: Mutex::new(Inbox {
                pending: VecDeque::new(),
                waiters: VecDeque::new(),
                listeners: Vec::new(),
                spent: HashSet::new(),
                closed: false,
            }),
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inbox> {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Append a batch of decoded messages and dispatch the inbox.
    pub fn deliver(&self, messages: impl IntoIterator<Item = ServerMessage>) {
        let deliveries = {
            let mut inbox = self.lock();
            if inbox.closed {
                debug!("Dispatcher closed, dropping inbound batch");
                return;
            }
            let deliveries = inbox.dispatch(messages);
            while inbox.pending.len() > self.capacity {
                if let Some(dropped) = inbox.pending.pop_front() {
                    warn!("Inbox full, dropping unclaimed {}", dropped);
                }
            }
            deliveries
        };

        for (listener, msg) in deliveries {
            listener.invoke(&msg);
        }
    }

    /// Register interest in a reply before the request goes out.
    ///
    /// A matching message already sitting in the inbox satisfies the wait
    /// immediately.
    pub fn expect(self: &Arc<Self>, filter: ReplyFilter) -> Result<PendingReply> {
        let mut inbox = self.lock();
        if inbox.closed {
            return Err(TpiError::ConnectionClosed);
        }

        if let Some(pos) = inbox.pending.iter().position(|m| filter.matches(m)) {
            if let Some(msg) = inbox.pending.remove(pos) {
                return Ok(PendingReply {
                    dispatcher: Arc::clone(self),
                    id: 0,
                    filter,
                    state: Some(ReplyState::Ready(msg)),
                });
            }
        }

        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        inbox.waiters.push_back(Waiter {
            id,
            filter: filter.clone(),
            tx,
        });
        trace!("Waiter {} registered for {}", id, filter);

        Ok(PendingReply {
            dispatcher: Arc::clone(self),
            id,
            filter,
            state: Some(ReplyState::Waiting(rx)),
        })
    }

    fn remove_waiter(&self, id: u64) {
        self.lock().waiters.retain(|w| w.id != id);
    }

    /// Invoke `callback` for every message with `code` until removed.
    pub fn on<F>(&self, code: ServerCode, callback: F) -> ListenerId
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.add_listener(code, false, Arc::new(callback))
    }

    /// Invoke `callback` for the next message with `code`, then forget it.
    pub fn once<F>(&self, code: ServerCode, callback: F) -> ListenerId
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.add_listener(code, true, Arc::new(callback))
    }

    fn add_listener(&self, code: ServerCode, once: bool, callback: Callback) -> ListenerId {
        let id = ListenerId(self.next_id());
        self.lock().listeners.push(Arc::new(Listener {
            id,
            code,
            once,
            claimed: AtomicBool::new(false),
            callback,
        }));
        debug!("Listener {:?} registered for {} (once: {})", id, code, once);
        id
    }

    /// Returns false if the listener was already gone.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut inbox = self.lock();
        let before = inbox.listeners.len();
        inbox.listeners.retain(|l| l.id != id);
        inbox.listeners.len() != before
    }

    /// End the session: wake every waiter with `ConnectionClosed` and drop
    /// unclaimed messages. Listeners are kept for the next session.
    pub fn close(&self) {
        let mut inbox = self.lock();
        if inbox.closed {
            return;
        }
        inbox.closed = true;
        debug!(
            "Dispatcher closing: {} waiters woken, {} unclaimed messages dropped",
            inbox.waiters.len(),
            inbox.pending.len()
        );
        inbox.waiters.clear();
        inbox.pending.clear();
    }

    /// Accept messages again for a new session.
    pub fn reopen(&self) {
        let mut inbox = self.lock();
        inbox.closed = false;
        inbox.pending.clear();
        inbox.waiters.clear();
        inbox.spent.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn waiter_count(&self) -> usize {
        self.lock().waiters.len()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }
}

enum ReplyState {
    Ready(ServerMessage),
    Waiting(oneshot::Receiver<ServerMessage>),
}

/// A registered reply wait. Dropping it deregisters the waiter.
pub struct PendingReply {
    dispatcher: Arc<Dispatcher>,
    id: u64,
    filter: ReplyFilter,
    state: Option<ReplyState>,
}

impl PendingReply {
    /// Wait up to `limit` for the reply.
    ///
    /// A timeout removes only this waiter. Closing the dispatcher ends the
    /// wait with `ConnectionClosed`.
    pub async fn wait(mut self, limit: Duration) -> Result<ServerMessage> {
        match self.state.take() {
            Some(ReplyState::Ready(msg)) => Ok(msg),
            Some(ReplyState::Waiting(mut rx)) => match timeout(limit, &mut rx).await {
                Ok(Ok(msg)) => Ok(msg),
                Ok(Err(_)) => Err(TpiError::ConnectionClosed),
                Err(_) => {
                    self.dispatcher.remove_waiter(self.id);
                    // a reply that raced the deadline is still honoured
                    match rx.try_recv() {
                        Ok(msg) => Ok(msg),
                        Err(_) => Err(TpiError::Timeout {
                            expected: self.filter.to_string(),
                            after: limit,
                        }),
                    }
                }
            },
            None => Err(TpiError::ConnectionClosed),
        }
    }

    /// Take the reply if it has already arrived.
    pub fn try_take(&mut self) -> Option<ServerMessage> {
        match self.state.take()? {
            ReplyState::Ready(msg) => Some(msg),
            ReplyState::Waiting(mut rx) => match rx.try_recv() {
                Ok(msg) => Some(msg),
                Err(TryRecvError::Empty) => {
                    self.state = Some(ReplyState::Waiting(rx));
                    None
                }
                Err(TryRecvError::Closed) => None,
            },
        }
    }

    pub fn filter(&self) -> &ReplyFilter {
        &self.filter
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if self.id != 0 {
            self.dispatcher.remove_waiter(self.id);
        }
    }
}
