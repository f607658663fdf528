//! Scoped subscription handles
//!
//! Every subscribe call yields a handle; releasing the handle is the only
//! way to stop receiving callbacks. Release happens on drop and via the
//! explicit `unsubscribe`, which is idempotent and safe to call after the
//! underlying connection closed. Each dashboard or session tracks the full
//! set of handles it owns in a [`SubscriptionSet`] and releases them all
//! when its context ends; an unreleased handle keeps consuming callbacks
//! indefinitely.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::Document;

/// Removes one registered listener from its backend. Idempotent.
#[derive(Clone)]
pub(crate) struct Canceller {
    cancelled: Arc<AtomicBool>,
    cancel: Arc<dyn Fn() + Send + Sync>,
}

impl Canceller {
    pub(crate) fn new(cancel: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(cancel),
        }
    }

    pub(crate) fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            (self.cancel)();
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Canceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canceller")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Raw snapshot stream handed out by a [`DocumentStore`](crate::DocumentStore)
/// backend. Consumed by the typed layer, which turns it into decoded
/// callbacks; also usable directly in tests. Dropping the stream without
/// unsubscribing is tolerated: backends prune listeners whose receiving
/// side is gone on their next push.
#[derive(Debug)]
pub struct RawSubscription {
    receiver: mpsc::UnboundedReceiver<Vec<Document>>,
    canceller: Canceller,
}

impl RawSubscription {
    /// Build a subscription from a snapshot channel and the closure that
    /// deregisters the backend listener
    pub fn new(
        receiver: mpsc::UnboundedReceiver<Vec<Document>>,
        cancel: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            receiver,
            canceller: Canceller::new(cancel),
        }
    }

    /// Next pushed snapshot; `None` once unsubscribed or the backend closed
    pub async fn recv(&mut self) -> Option<Vec<Document>> {
        if self.canceller.is_cancelled() {
            return None;
        }
        self.receiver.recv().await
    }

    /// Stop receiving snapshots. Idempotent.
    pub fn unsubscribe(&self) {
        self.canceller.cancel();
    }

    pub(crate) fn into_parts(self) -> (mpsc::UnboundedReceiver<Vec<Document>>, Canceller) {
        (self.receiver, self.canceller)
    }
}

/// Spawn the dispatch task that feeds pushed snapshots to a callback,
/// returning the handle that owns both the task and the backend listener
pub(crate) fn spawn_dispatch<F>(raw: RawSubscription, mut deliver: F) -> SubscriptionHandle
where
    F: FnMut(Vec<Document>) + Send + 'static,
{
    let (mut receiver, canceller) = raw.into_parts();
    let flag = canceller.clone();

    let task = tokio::spawn(async move {
        while let Some(snapshot) = receiver.recv().await {
            if flag.is_cancelled() {
                break;
            }
            deliver(snapshot);
        }
    });

    SubscriptionHandle { canceller, task }
}

/// Owns one live subscription: the backend listener registration and the
/// task invoking the subscriber's callback
#[derive(Debug)]
pub struct SubscriptionHandle {
    canceller: Canceller,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Stop receiving callbacks. Safe to call any number of times, from any
    /// task, before or after the underlying connection closed. Snapshots
    /// already queued but not yet delivered are discarded.
    pub fn unsubscribe(&self) {
        self.canceller.cancel();
        self.task.abort();
    }

    /// Whether callbacks can still be delivered through this handle
    pub fn is_active(&self) -> bool {
        !self.canceller.is_cancelled() && !self.task.is_finished()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Tracks every live subscription owned by one dashboard or session
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    handles: Vec<SubscriptionHandle>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a handle for the lifetime of this context
    pub fn insert(&mut self, handle: SubscriptionHandle) {
        self.handles.push(handle);
    }

    /// Release every tracked subscription
    pub fn release_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.unsubscribe();
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.release_all();
    }
}

// ============================================================================
// TESTS
// ============================================================================
