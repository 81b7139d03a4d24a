//! Request identifiers.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use std::fmt;

/// A caller-chosen identifier correlating a request with its response.
///
/// Uniqueness among concurrently in-flight requests on a single
/// [`Multiplexer`](crate::Multiplexer) is a precondition the caller must
/// uphold; see [`crate::Error::DuplicateRequestId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u128);

impl RequestId {
    /// Wrap a raw value as a `RequestId`.
    #[inline]
    #[must_use]
    pub const fn from_raw(value: u128) -> Self {
        Self(value)
    }

    /// The wrapped raw value.
    #[inline]
    #[must_use]
    pub const fn into_raw(self) -> u128 {
        self.0
    }

    /// Generate a fresh, randomly-chosen identifier.
    ///
    /// Convenience for callers that have no natural id source of their own;
    /// collisions are astronomically unlikely but, as with any random id,
    /// not impossible, so callers with a correctness requirement should
    /// supply their own scheme instead.
    #[must_use]
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl From<u128> for RequestId {
    #[inline]
    fn from(value: u128) -> Self {
        Self(value)
    }
}

/// A message that can be correlated by [`RequestId`].
///
/// Implemented by both the request and response types a
/// [`Multiplexer`](crate::Multiplexer) is instantiated over; the core never
/// needs to know anything else about their shape.
pub trait Identified {
    /// The identifier this message carries.
    fn request_id(&self) -> RequestId;
}
