//! A concurrent request/response multiplexer over a single full-duplex
//! transport.
//!
//! Application code submits requests identified by a unique
//! [`RequestId`] through [`Multiplexer::send`] from as many concurrent
//! tasks as it likes; a single write pump serializes requests onto the
//! transport in submission order while a single read pump demultiplexes
//! arriving responses back to whichever caller is waiting for that
//! identifier. Per-request timeouts, caller-driven cancellation, and an
//! orderly [`start`](Multiplexer::start)/[`stop`](Multiplexer::stop)
//! protocol are built in; everything about the wire itself — framing,
//! reconnection, authentication — is left to the [`Transport`]
//! implementation supplied at construction.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
#![warn(missing_docs, missing_debug_implementations)]
#![forbid(unsafe_code)]

mod config;
mod dupe;
mod error;
mod ids;
mod multiplexer;
mod pending;
mod read_pump;
mod transport;
mod write_pump;

pub use config::{Config, DEFAULT_SUBMISSION_CAPACITY};
pub use error::{Error, Result};
pub use ids::{Identified, RequestId};
pub use multiplexer::{LifecycleState, Multiplexer};
pub use transport::{ReadError, Transport, WriteError};

#[cfg(feature = "deadlock-detection")]
/// Spawn a background thread that periodically checks for `parking_lot`
/// deadlocks and logs any it finds. Intended for use in test harnesses and
/// diagnostics builds, not in production services.
pub fn spawn_deadlock_detection() {
    use std::thread;
    use std::time::Duration;
    use tracing::error;

    thread::spawn(move || loop {
        thread::sleep(Duration::from_secs(10));
        let deadlocks = parking_lot::deadlock::check_deadlock();
        if deadlocks.is_empty() {
            continue;
        }
        error!("{} deadlocks detected", deadlocks.len());
        for (i, threads) in deadlocks.iter().enumerate() {
            error!("deadlock #{i}");
            for t in threads {
                error!("thread id {:#?}", t.thread_id());
                error!("{:#?}", t.backtrace());
            }
        }
    });
}
