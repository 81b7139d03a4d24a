//! The single-consumer submission-queue drainer.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use crate::ids::Identified;
use crate::pending::{PendingTable, Resolution};
use crate::transport::{Transport, WriteError};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Drains the submission queue and writes each request to the transport in
/// order.
///
/// A write failure for one request resolves only that request's pending
/// entry; the pump itself keeps running (the bulkhead rule). Only the
/// shutdown token or the queue's own closure ends the loop.
pub(crate) struct WritePump<T: Transport> {
    transport: Arc<T>,
    queue: mpsc::Receiver<T::Request>,
    pending: Arc<PendingTable<T::Response, T::Error>>,
    shutdown: CancellationToken,
    ready: Option<oneshot::Sender<()>>,
}

impl<T: Transport> WritePump<T> {
    pub(crate) fn new(
        transport: Arc<T>,
        queue: mpsc::Receiver<T::Request>,
        pending: Arc<PendingTable<T::Response, T::Error>>,
        shutdown: CancellationToken,
        ready: oneshot::Sender<()>,
    ) -> Self {
        Self {
            transport,
            queue,
            pending,
            shutdown,
            ready: Some(ready),
        }
    }

    #[tracing::instrument(skip_all, name = "write_pump")]
    pub(crate) async fn run(mut self) {
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(());
        }
        loop {
            let request = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    debug!("write pump stopping: shutdown signaled");
                    break;
                }
                request = self.queue.recv() => match request {
                    Some(request) => request,
                    None => {
                        debug!("write pump stopping: submission queue closed");
                        break;
                    }
                },
            };
            self.write_one(request).await;
        }
        trace!("write pump exited");
    }

    async fn write_one(&self, request: T::Request) {
        let id = request.request_id();
        match self.transport.write(&request, &self.shutdown).await {
            Ok(()) => {
                trace!(%id, "request written");
            }
            Err(WriteError::Cancelled) => {
                debug!(%id, "write cancelled by shutdown");
            }
            Err(WriteError::Transport(cause)) => {
                warn!(%id, %cause, "write failed, failing this request only");
                self.pending
                    .resolve(id, Resolution::TransportFailed(Arc::new(cause)));
            }
        }
    }
}
