//! Native subscription backend seam.
//!
//! The registry never talks to an OS API directly; it goes through
//! [`NativeBackend`], which creates and cancels one non-recursive
//! subscription per watched directory. Notifications produced by a backend
//! are delivered out of band (usually through a channel) as
//! [`RawEvent`](sift_core::RawEvent)s.

use sift_core::{BackendFamily, MonitorError, WatchPath};
use std::fmt::Debug;

/// A source of per-directory change subscriptions.
pub trait NativeBackend {
    /// Token returned by [`subscribe`](Self::subscribe) and consumed by
    /// [`cancel`](Self::cancel).
    type Handle: Debug;

    /// Which notification subsystem serves the subscriptions.
    fn family(&self) -> BackendFamily;

    /// Start delivering notifications for the direct children of `path`.
    fn subscribe(&mut self, path: &WatchPath) -> Result<Self::Handle, MonitorError>;

    /// Stop a subscription. Failures are logged by the implementation.
    fn cancel(&mut self, handle: Self::Handle);
}
