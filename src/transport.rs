//! The transport collaborator.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Outcome of a single [`Transport::read`] call.
#[derive(Debug)]
pub enum ReadError<E> {
    /// The supplied cancellation token fired before a response arrived.
    Cancelled,
    /// The transport itself failed.
    Transport(E),
}

/// Outcome of a single [`Transport::write`] call.
#[derive(Debug)]
pub enum WriteError<E> {
    /// The supplied cancellation token fired before the write completed.
    Cancelled,
    /// The transport itself failed.
    Transport(E),
}

/// The full-duplex byte channel a [`Multiplexer`](crate::Multiplexer) is
/// layered over.
///
/// Implementations may run `read` and `write` concurrently with each other,
/// but the multiplexer never calls either method again before the previous
/// call to that same method has returned: at most one `read` and at most one
/// `write` is outstanding at a time. This is the adapter's only contract;
/// framing, reconnection, and authentication are entirely up to the
/// implementation.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The request type written to the transport.
    type Request: crate::ids::Identified + Send + 'static;
    /// The response type read from the transport.
    type Response: crate::ids::Identified + Send + 'static;
    /// The transport's own error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the next response, or stop early if `cancel` fires.
    async fn read(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Self::Response, ReadError<Self::Error>>;

    /// Write one request, or stop early if `cancel` fires.
    async fn write(
        &self,
        request: &Self::Request,
        cancel: &CancellationToken,
    ) -> Result<(), WriteError<Self::Error>>;
}
