//! A mock [`Transport`] used by the integration tests: an in-memory echo
//! channel with configurable per-call delays and an injectable failure mode.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use async_trait::async_trait;
use reqres_mux::{Identified, ReadError, RequestId, Transport, WriteError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

#[ctor::ctor]
fn init_test_logging() {
    let _ = tracing_subscriber::fmt::try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Msg(pub u128);

impl Identified for Msg {
    fn request_id(&self) -> RequestId {
        RequestId::from_raw(self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error("mock transport failure")]
    Failed,
}

/// Echoes every written request back as a response, after independently
/// configurable write/read delays. `fail_reads` can be flipped at runtime to
/// simulate a dead channel.
pub struct MockTransport {
    write_delay: Duration,
    read_delay: Duration,
    inbox: Mutex<VecDeque<u128>>,
    arrived: Notify,
    fail_reads: AtomicBool,
}

impl MockTransport {
    pub fn new(write_delay: Duration, read_delay: Duration) -> Self {
        Self {
            write_delay,
            read_delay,
            inbox: Mutex::new(VecDeque::new()),
            arrived: Notify::new(),
            fail_reads: AtomicBool::new(false),
        }
    }

    pub fn fail_reads_from_now_on(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
        self.arrived.notify_waiters();
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Request = Msg;
    type Response = Msg;
    type Error = MockError;

    async fn read(&self, cancel: &CancellationToken) -> Result<Msg, ReadError<MockError>> {
        loop {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(ReadError::Transport(MockError::Failed));
            }
            let notified = self.arrived.notified();
            let popped = self.inbox.lock().await.pop_front();
            if let Some(id) = popped {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(ReadError::Cancelled),
                    () = tokio::time::sleep(self.read_delay) => {}
                }
                return Ok(Msg(id));
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ReadError::Cancelled),
                () = notified => {}
            }
        }
    }

    async fn write(
        &self,
        request: &Msg,
        cancel: &CancellationToken,
    ) -> Result<(), WriteError<MockError>> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(WriteError::Cancelled),
            () = tokio::time::sleep(self.write_delay) => {}
        }
        self.inbox.lock().await.push_back(request.0);
        self.arrived.notify_waiters();
        Ok(())
    }
}
