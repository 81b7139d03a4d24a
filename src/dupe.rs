//! Cheap, explicit cloning for `Arc`-backed handles.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use std::sync::Arc;

/// Marks a type whose `clone` is always O(1) (an `Arc` bump, typically).
/// Spelled `dupe` so call sites read differently from a potentially
/// expensive `Clone::clone`.
pub trait Dupe {
    fn dupe(&self) -> Self;
}

impl<T: ?Sized> Dupe for Arc<T> {
    #[inline]
    fn dupe(&self) -> Self {
        Arc::clone(self)
    }
}

impl Dupe for tokio_util::sync::CancellationToken {
    #[inline]
    fn dupe(&self) -> Self {
        self.clone()
    }
}
