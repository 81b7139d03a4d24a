//! The single-consumer response router.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use crate::dupe::Dupe;
use crate::ids::Identified;
use crate::pending::{PendingTable, Resolution};
use crate::transport::{ReadError, Transport};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// Repeatedly reads responses from the transport and routes each one to its
/// matching entry in the pending table.
///
/// A transport read failure is channel-fatal: the whole demultiplexing state
/// is irrecoverable once reads stop, so every pending entry is failed and the
/// pump signals shutdown to the write side before exiting.
pub(crate) struct ReadPump<T: Transport> {
    transport: Arc<T>,
    pending: Arc<PendingTable<T::Response, T::Error>>,
    shutdown: CancellationToken,
    ready: Option<oneshot::Sender<()>>,
}

impl<T: Transport> ReadPump<T> {
    pub(crate) fn new(
        transport: Arc<T>,
        pending: Arc<PendingTable<T::Response, T::Error>>,
        shutdown: CancellationToken,
        ready: oneshot::Sender<()>,
    ) -> Self {
        Self {
            transport,
            pending,
            shutdown,
            ready: Some(ready),
        }
    }

    #[tracing::instrument(skip_all, name = "read_pump")]
    pub(crate) async fn run(mut self) {
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(());
        }
        loop {
            match self.transport.read(&self.shutdown).await {
                Ok(response) => self.route(response),
                Err(ReadError::Cancelled) => {
                    if self.pending.is_empty() {
                        debug!("read pump stopping: drained and shutdown signaled");
                    } else {
                        debug!("read pump stopping: shutdown signaled with requests still pending, failing them");
                        self.pending.resolve_all(|| Resolution::Shutdown);
                    }
                    break;
                }
                Err(ReadError::Transport(cause)) => {
                    let cause = Arc::new(cause);
                    error!(%cause, "transport read failed, failing all pending requests");
                    self.pending
                        .resolve_all(|| Resolution::TransportFailed(cause.dupe()));
                    self.shutdown.cancel();
                    break;
                }
            }
        }
        trace!("read pump exited");
    }

    fn route(&self, response: T::Response) {
        let id = response.request_id();
        if self.pending.resolve(id, Resolution::Delivered(response)) {
            trace!(%id, "response delivered");
        } else {
            warn!(%id, "response for unknown or already-resolved request, discarding");
        }
    }
}
