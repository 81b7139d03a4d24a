//! Construction-time configuration.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use std::time::Duration;

/// Default bounded size of the submission queue feeding the write pump.
pub const DEFAULT_SUBMISSION_CAPACITY: usize = 64;

/// Options fixed for the lifetime of a [`Multiplexer`](crate::Multiplexer).
///
/// The option set is small enough that a builder would only add ceremony;
/// construct it as a plain struct, or start from [`Config::default`] and
/// override individual fields.
#[derive(Debug, Clone)]
pub struct Config {
    /// Total deadline for a single request, measured from the moment
    /// [`send`](crate::Multiplexer::send) is called, not from when the
    /// request is actually written to the transport.
    pub request_timeout: Duration,
    /// Bounded capacity of the submission queue. Submitting beyond this
    /// capacity backpressures the caller until the queue drains, the
    /// caller's cancellation fires, or the request's own deadline elapses.
    pub submission_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            submission_capacity: DEFAULT_SUBMISSION_CAPACITY,
        }
    }
}

impl Config {
    pub(crate) fn validate<E>(&self) -> Result<(), crate::Error<E>>
    where
        E: std::error::Error + 'static,
    {
        if self.request_timeout.is_zero() {
            return Err(crate::Error::InvalidArgument(
                "request_timeout must be strictly positive",
            ));
        }
        if self.submission_capacity == 0 {
            return Err(crate::Error::InvalidArgument(
                "submission_capacity must be at least 1",
            ));
        }
        Ok(())
    }
}
