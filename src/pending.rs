//! The in-flight request registry.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use crate::ids::RequestId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;

/// How a pending request's wait eventually ended.
///
/// Deadline expiry and caller cancellation are not represented here: the
/// task that wins that race reports the outcome straight to its own caller
/// without going through this channel (see
/// [`Multiplexer::finish_raced_out`](crate::multiplexer::Multiplexer)).
/// This only carries outcomes a *different* task can deliver.
pub(crate) enum Resolution<Resp, E> {
    /// A matching response arrived.
    Delivered(Resp),
    /// The multiplexer is shutting down.
    Shutdown,
    /// The transport failed; `Arc` so one failure can be broadcast to every
    /// entry still pending without requiring `E: Clone`.
    TransportFailed(Arc<E>),
}

/// The sending half of a pending request's single-assignment completion slot,
/// plus the deadline it was armed with.
pub(crate) struct PendingEntry<Resp, E> {
    slot: oneshot::Sender<Resolution<Resp, E>>,
    pub(crate) deadline_at: Instant,
}

/// The in-flight request registry shared by every caller of
/// [`send`](crate::Multiplexer::send), the read pump, and the shutdown path.
///
/// Guarantees "resolve once, remove once": the only way to resolve an entry
/// is to [`take`](Self::take) it out of the table first, so whichever
/// resolver wins the race to remove an identifier is the one whose outcome
/// sticks.
pub(crate) struct PendingTable<Resp, E> {
    entries: RwLock<HashMap<RequestId, PendingEntry<Resp, E>>>,
    /// Pinged whenever an entry is removed, so `stop`'s graceful drain wait
    /// can avoid busy-polling `is_empty`.
    drained: Notify,
}

impl<Resp, E> Default for PendingTable<Resp, E> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            drained: Notify::new(),
        }
    }
}

impl<Resp, E> PendingTable<Resp, E> {
    /// Register a fresh completion slot for `id`. Returns `None` if `id` was
    /// already pending (the caller must not enqueue a request in that case).
    pub(crate) fn insert(
        &self,
        id: RequestId,
        deadline_at: Instant,
    ) -> Option<oneshot::Receiver<Resolution<Resp, E>>> {
        let (tx, rx) = oneshot::channel();
        let mut entries = self.entries.write();
        if entries.contains_key(&id) {
            return None;
        }
        entries.insert(
            id,
            PendingEntry {
                slot: tx,
                deadline_at,
            },
        );
        Some(rx)
    }

    /// Atomically remove and return the entry for `id`, if still present.
    pub(crate) fn take(&self, id: RequestId) -> Option<PendingEntry<Resp, E>> {
        let taken = self.entries.write().remove(&id);
        if taken.is_some() {
            self.drained.notify_waiters();
        }
        taken
    }

    /// Resolve `id` with `resolution` if it is still pending. Returns whether
    /// this call was the one to resolve it.
    pub(crate) fn resolve(&self, id: RequestId, resolution: Resolution<Resp, E>) -> bool {
        match self.take(id) {
            Some(entry) => {
                // The receiver may have already been dropped (caller gave up
                // without taking the entry itself, e.g. it raced a timeout
                // against `drop`); that is not an error here.
                let _ = entry.slot.send(resolution);
                true
            }
            None => false,
        }
    }

    /// Resolve every currently-pending entry with `resolution`, cloning the
    /// `Arc` cause (if any) per recipient. Used for channel-fatal transport
    /// failures and forced shutdown.
    pub(crate) fn resolve_all(&self, make_resolution: impl Fn() -> Resolution<Resp, E>) {
        let removed: Vec<_> = self.entries.write().drain().collect();
        if !removed.is_empty() {
            self.drained.notify_waiters();
        }
        for (_, entry) in removed {
            let _ = entry.slot.send(make_resolution());
        }
    }

    /// Wait until the table is empty, or return immediately if it already is.
    ///
    /// Uses the "subscribe before checking" idiom to avoid the lost-wakeup
    /// race between observing a non-empty table and registering interest in
    /// the next removal.
    pub(crate) async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Number of requests currently pending.
    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no requests are currently pending.
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// The deadline of the soonest-expiring pending request, if any.
    /// Diagnostic only; expiry itself is enforced by each `send` call racing
    /// its own deadline, not by scanning this table.
    pub(crate) fn earliest_deadline(&self) -> Option<Instant> {
        self.entries.read().values().map(|e| e.deadline_at).min()
    }
}
