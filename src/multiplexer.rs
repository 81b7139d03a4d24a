//! The public facade.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use crate::config::Config;
use crate::dupe::Dupe;
use crate::error::Error;
use crate::ids::{Identified, RequestId};
use crate::pending::{PendingTable, Resolution};
use crate::read_pump::ReadPump;
use crate::transport::Transport;
use crate::write_pump::WritePump;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of a [`Multiplexer`]. Transitions are monotonic: `Created` ->
/// `Running` -> `Stopping` -> `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed but `start` has not yet completed.
    Created,
    /// Accepting `send` calls.
    Running,
    /// `stop` has been called; draining in-flight work.
    Stopping,
    /// Fully stopped; no further operations are accepted.
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

struct Pumps {
    write: JoinHandle<()>,
    read: JoinHandle<()>,
}

/// A concurrent, thread-safe, cancellable request/response multiplexer
/// layered over a single [`Transport`].
///
/// Many tasks may call [`send`](Self::send) concurrently. Internally, a
/// single write pump serializes requests onto the transport in submission
/// order and a single read pump demultiplexes arriving responses back to
/// their callers; see the crate documentation for the full design.
pub struct Multiplexer<T: Transport> {
    transport: Arc<T>,
    config: Config,
    pending: Arc<PendingTable<T::Response, T::Error>>,
    submission: RwLock<Option<mpsc::Sender<T::Request>>>,
    submission_rx: RwLock<Option<mpsc::Receiver<T::Request>>>,
    shutdown: CancellationToken,
    pumps: RwLock<Option<Pumps>>,
    state: RwLock<LifecycleState>,
    /// Pinged once `state` reaches `Stopped`, so a second concurrent `stop`
    /// call (observing `Stopping` and no pumps left to own) can wait for the
    /// in-progress one instead of racing it.
    stopped: Notify,
}

impl<T: Transport> fmt::Debug for Multiplexer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("state", &self.state())
            .field("pending_len", &self.pending_len())
            .finish()
    }
}

impl<T: Transport> Multiplexer<T> {
    /// Construct a new multiplexer over `transport`.
    ///
    /// Fails with [`Error::InvalidArgument`] if `config.request_timeout` is
    /// zero or `config.submission_capacity` is zero; no tasks are spawned in
    /// that case.
    pub fn new(transport: T, config: Config) -> Result<Self, Error<T::Error>> {
        config.validate::<T::Error>()?;
        let (tx, rx) = mpsc::channel(config.submission_capacity);
        Ok(Self {
            transport: Arc::new(transport),
            config,
            pending: Arc::new(PendingTable::default()),
            submission: RwLock::new(Some(tx)),
            submission_rx: RwLock::new(Some(rx)),
            shutdown: CancellationToken::new(),
            pumps: RwLock::new(None),
            state: RwLock::new(LifecycleState::Created),
            stopped: Notify::new(),
        })
    }

    /// The multiplexer's current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// Number of requests currently awaiting a response.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// The deadline of the soonest-expiring pending request, if any are
    /// outstanding. Diagnostic only.
    #[must_use]
    pub fn earliest_deadline(&self) -> Option<Instant> {
        self.pending.earliest_deadline()
    }

    /// Spawn the write and read pumps and wait for both to be armed.
    ///
    /// Fails with [`Error::InvalidLifecycle`] unless the multiplexer is
    /// [`LifecycleState::Created`]. Fails with [`Error::Cancelled`] if
    /// `cancel` fires before both pumps signal readiness; in that case the
    /// spawned tasks are aborted, a fresh submission channel replaces the one
    /// handed to the now-aborted write pump, and the multiplexer remains
    /// `Created` with no observable side effects.
    #[tracing::instrument(skip_all)]
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), Error<T::Error>> {
        {
            let state = self.state.read();
            if *state != LifecycleState::Created {
                return Err(Error::InvalidLifecycle("start requires Created"));
            }
        }
        let submission_rx = self
            .submission_rx
            .write()
            .take()
            .expect("submission receiver present while Created");

        let (write_ready_tx, write_ready_rx) = oneshot::channel();
        let (read_ready_tx, read_ready_rx) = oneshot::channel();

        let write_pump = WritePump::new(
            self.transport.dupe(),
            submission_rx,
            self.pending.dupe(),
            self.shutdown.dupe(),
            write_ready_tx,
        );
        let read_pump = ReadPump::new(
            self.transport.dupe(),
            self.pending.dupe(),
            self.shutdown.dupe(),
            read_ready_tx,
        );

        let write_handle = tokio::spawn(write_pump.run());
        let read_handle = tokio::spawn(read_pump.run());

        let ready = async {
            let _ = write_ready_rx.await;
            let _ = read_ready_rx.await;
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!("start cancelled before pumps became ready, aborting");
                write_handle.abort();
                read_handle.abort();
                // The submission receiver was already moved into the
                // now-aborted write pump and is gone for good; mint a fresh
                // channel so a subsequent `start` has something to take.
                let (tx, rx) = mpsc::channel(self.config.submission_capacity);
                *self.submission.write() = Some(tx);
                *self.submission_rx.write() = Some(rx);
                return Err(Error::Cancelled(None));
            }
            () = ready => {}
        }

        *self.pumps.write() = Some(Pumps {
            write: write_handle,
            read: read_handle,
        });
        *self.state.write() = LifecycleState::Running;
        info!("multiplexer started");
        Ok(())
    }

    /// Submit `request` and await its matching response.
    ///
    /// Fails with [`Error::InvalidLifecycle`] unless the multiplexer is
    /// [`LifecycleState::Running`], with [`Error::DuplicateRequestId`] if
    /// `request.request_id()` is already pending, with
    /// [`Error::TimedOut`]/[`Error::Cancelled`] if the deadline or `cancel`
    /// fires first, and with [`Error::Shutdown`]/[`Error::Transport`] if the
    /// multiplexer stops or the transport fails before a response arrives.
    #[tracing::instrument(skip_all, fields(id))]
    pub async fn send(
        &self,
        request: T::Request,
        cancel: CancellationToken,
    ) -> Result<T::Response, Error<T::Error>> {
        let id = request.request_id();
        tracing::Span::current().record("id", tracing::field::display(&id));

        if *self.state.read() != LifecycleState::Running {
            return Err(Error::InvalidLifecycle("send requires Running"));
        }

        let deadline_at = Instant::now() + self.config.request_timeout;
        let Some(mut rx) = self.pending.insert(id, deadline_at) else {
            return Err(Error::DuplicateRequestId(id));
        };

        let sender = self.submission.read().clone();
        let Some(sender) = sender else {
            self.pending.take(id);
            return Err(Error::Shutdown);
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return self.finish_raced_out(id, rx, Error::Cancelled(Some(id))).await;
            }
            () = tokio::time::sleep_until(deadline_at) => {
                return self.finish_raced_out(id, rx, Error::TimedOut(id)).await;
            }
            sent = sender.send(request) => {
                if sent.is_err() {
                    return self.finish_raced_out(id, rx, Error::Shutdown).await;
                }
            }
        }

        // The request is on the wire (or about to be); the deadline and the
        // caller's own cancellation still race the response itself.
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                self.finish_raced_out(id, rx, Error::Cancelled(Some(id))).await
            }
            () = tokio::time::sleep_until(deadline_at) => {
                self.finish_raced_out(id, rx, Error::TimedOut(id)).await
            }
            resolution = &mut rx => Self::map_resolution(resolution),
        }
    }

    /// Having lost the submission or response race to cancellation, timeout,
    /// or a closed queue: try to claim the resolution ourselves; if someone
    /// else already claimed it first, fall back to whatever they actually
    /// produced.
    async fn finish_raced_out(
        &self,
        id: RequestId,
        rx: oneshot::Receiver<Resolution<T::Response, T::Error>>,
        ours: Error<T::Error>,
    ) -> Result<T::Response, Error<T::Error>> {
        if self.pending.take(id).is_some() {
            Err(ours)
        } else {
            self.await_resolution(rx).await
        }
    }

    async fn await_resolution(
        &self,
        rx: oneshot::Receiver<Resolution<T::Response, T::Error>>,
    ) -> Result<T::Response, Error<T::Error>> {
        Self::map_resolution(rx.await)
    }

    fn map_resolution(
        resolution: std::result::Result<Resolution<T::Response, T::Error>, oneshot::error::RecvError>,
    ) -> Result<T::Response, Error<T::Error>> {
        match resolution {
            Ok(Resolution::Delivered(response)) => Ok(response),
            Ok(Resolution::Shutdown) => Err(Error::Shutdown),
            Ok(Resolution::TransportFailed(cause)) => Err(Error::Transport(cause)),
            // The sender was dropped without resolving: only happens if the
            // entry was taken and then abandoned, which no path in this
            // module does; treat it the same as an explicit shutdown.
            Err(_) => Err(Error::Shutdown),
        }
    }

    /// Stop accepting new requests and drain in-flight work.
    ///
    /// On an already-`Running` instance, transitions to `Stopping` and
    /// closes the submission queue, then waits for the write pump to finish
    /// writing everything already enqueued and for the read pump to collect
    /// every outstanding response. If `cancel` fires first (or is already
    /// fired when `stop` is called), every request still pending is failed
    /// with [`Error::Shutdown`] immediately and `stop` itself returns
    /// [`Error::Cancelled`]. Calling `stop` again once `Stopped` fails with
    /// [`Error::InvalidLifecycle`]; calling it while already `Stopping`
    /// simply continues the existing drain.
    #[tracing::instrument(skip_all)]
    pub async fn stop(&self, cancel: CancellationToken) -> Result<(), Error<T::Error>> {
        {
            let mut state = self.state.write();
            match *state {
                LifecycleState::Created => {
                    return Err(Error::InvalidLifecycle("stop requires a started multiplexer"))
                }
                LifecycleState::Stopped => {
                    return Err(Error::InvalidLifecycle("already stopped"))
                }
                LifecycleState::Running => *state = LifecycleState::Stopping,
                LifecycleState::Stopping => {}
            }
        }

        // Close the submission queue: subsequent `send` calls observe `None`
        // and fail with `Shutdown`; in-flight clones already holding a
        // `Sender` can still deliver their one request.
        self.submission.write().take();

        let Some(Pumps { write, read }) = self.pumps.write().take() else {
            // Another `stop` call is already driving the drain; ride along.
            return self.join_in_progress_stop(cancel).await;
        };

        if cancel.is_cancelled() {
            debug!("stop: cancel already fired, skipping the write pump drain");
            write.abort();
        } else {
            debug!("stop: waiting for write pump to drain the submission queue");
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    write.abort();
                }
                res = write => { let _ = res; }
            }
        }

        if !cancel.is_cancelled() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = self.pending.wait_drained() => {}
            }
        }

        let forced = cancel.is_cancelled();
        if forced {
            self.force_shutdown();
        }

        self.shutdown.cancel();
        let _ = read.await;

        *self.state.write() = LifecycleState::Stopped;
        self.stopped.notify_waiters();
        info!("multiplexer stopped");

        if forced {
            Err(Error::Cancelled(None))
        } else {
            Ok(())
        }
    }

    /// Wait for an already-in-progress `stop` (called from a different task)
    /// to finish, optionally forcing it along if our own `cancel` fires
    /// first.
    async fn join_in_progress_stop(&self, cancel: CancellationToken) -> Result<(), Error<T::Error>> {
        let mut forced_here = false;
        loop {
            let notified = self.stopped.notified();
            if *self.state.read() == LifecycleState::Stopped {
                return if forced_here {
                    Err(Error::Cancelled(None))
                } else {
                    Ok(())
                };
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    forced_here = true;
                    self.force_shutdown();
                    self.shutdown.cancel();
                }
                () = notified => {}
            }
        }
    }

    fn force_shutdown(&self) {
        warn!("stop cancelled, failing all still-pending requests with Shutdown");
        self.pending.resolve_all(|| Resolution::Shutdown);
    }
}
