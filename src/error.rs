//! Errors.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use crate::ids::RequestId;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by [`Multiplexer`](crate::Multiplexer) operations.
#[derive(Debug, Error)]
pub enum Error<E: std::error::Error + 'static> {
    /// The request's deadline elapsed before a response arrived.
    #[error("request {0} timed out")]
    TimedOut(RequestId),
    /// A cancellation signal fired: `Some(id)` for a single in-flight
    /// request's own `send` call, `None` for a `start`/`stop` operation
    /// cancelled as a whole.
    #[error("cancelled{}", .0.map(|id| format!(" (request {id})")).unwrap_or_default())]
    Cancelled(Option<RequestId>),
    /// The multiplexer is stopping or has stopped, or the read side died
    /// before a response could be delivered.
    #[error("multiplexer is shutting down")]
    Shutdown,
    /// A request with this identifier was already pending.
    #[error("request id {0} is already pending")]
    DuplicateRequestId(RequestId),
    /// The transport failed while handling this request, or globally.
    #[error("transport failed: {0}")]
    Transport(#[source] Arc<E>),
    /// The operation is not valid for the multiplexer's current lifecycle state.
    #[error("invalid operation for current state: {0}")]
    InvalidLifecycle(&'static str),
    /// A constructor argument was invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Result alias for fallible [`Multiplexer`](crate::Multiplexer) operations.
pub type Result<T, E> = std::result::Result<T, Error<E>>;

impl<E: std::error::Error + 'static> Error<E> {
    /// The identifier of the request this error pertains to, if any.
    ///
    /// `Shutdown`, `Transport` (global, read-side), `InvalidLifecycle`, and
    /// `InvalidArgument` are not tied to a single request and return `None`.
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::TimedOut(id) | Self::DuplicateRequestId(id) => Some(*id),
            Self::Cancelled(id) => *id,
            Self::Shutdown
            | Self::Transport(_)
            | Self::InvalidLifecycle(_)
            | Self::InvalidArgument(_) => None,
        }
    }
}
