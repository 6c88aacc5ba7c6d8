use tokio::sync::{oneshot, Mutex};

use crate::codec::packet::Packet;
use crate::error::{GextError, Result};

/// One of the three payload shapes a synchronous helper call waits for
/// (spec §3 "Pending request slot").
#[derive(Debug)]
pub enum BrokerResponse {
    Flags(Vec<String>),
    PacketText { text: String, expression: String },
    Packet(Packet),
}

/// Correlates a synchronous helper request with its response message.
/// The request mutex serializes helper calls one at a time: a caller
/// takes the lock, sends its request, awaits the oneshot the dispatcher
/// fires when the matching response arrives, and releases the lock on
/// the way out. Closing the connection while a call is outstanding drops
/// the oneshot sender, which turns `await` into a [`GextError::State`]
/// for the waiting caller instead of hanging forever.
pub struct RequestBroker {
    request_lock: Mutex<()>,
    pending: Mutex<Option<oneshot::Sender<BrokerResponse>>>,
}

impl Default for RequestBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBroker {
    pub fn new() -> Self {
        RequestBroker {
            request_lock: Mutex::new(()),
            pending: Mutex::new(None),
        }
    }

    /// Registers interest in the next response and returns a receiver to
    /// await it. Must be called while holding the guard from
    /// [`RequestBroker::acquire`].
    pub async fn register(&self) -> oneshot::Receiver<BrokerResponse> {
        let (tx, rx) = oneshot::channel();
        *self.pending.lock().await = Some(tx);
        rx
    }

    /// Acquires the request mutex for the duration of one synchronous
    /// helper call. Held across send + register + await so only one
    /// request is ever outstanding.
    pub async fn acquire(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.request_lock.lock().await
    }

    /// Called by the dispatcher when a response message arrives. A
    /// response with nobody waiting is dropped (can happen if the
    /// connection was torn down mid-call and the caller already bailed).
    pub async fn resolve(&self, response: BrokerResponse) {
        if let Some(tx) = self.pending.lock().await.take() {
            let _ = tx.send(response);
        }
    }

    pub async fn fail_pending(&self) {
        self.pending.lock().await.take();
    }

    pub async fn wait(&self, rx: oneshot::Receiver<BrokerResponse>) -> Result<BrokerResponse> {
        rx.await
            .map_err(|_| GextError::State("connection closed while awaiting response".into()))
    }
}
