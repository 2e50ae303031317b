//! Cooperative tasks ("fibers").
//!
//! A fiber is a tokio task tagged with a [`FiberId`]. Code running inside a
//! fiber may [`park`] itself: it receives a [`Resumer`] to hand to whoever
//! will produce the value, and a [`Parked`] future that completes once
//! [`Resumer::resume`] is called. Parking never blocks the runtime thread;
//! the event loop keeps servicing socket input and other fibers meanwhile.
//!
//! # Primitives
//!
//! | Function | Role |
//! |----------|------|
//! | [`spawn`] | Start a new fiber on the runtime |
//! | [`run`] | Run a future as a fiber on the current task |
//! | [`current`] | Handle of the running fiber |
//! | [`park`] | Suspend the running fiber until resumed |
//! | [`Resumer::resume`] | Reactivate a parked fiber with a value |
//!
//! # Example
//!
//! ```ignore
//! use method_channel::fiber;
//!
//! let handle = fiber::spawn(async move {
//!     let (resumer, parked) = fiber::park::<u32>()?;
//!     tokio::spawn(async move { resumer.resume(7) });
//!     parked.await
//! });
//! assert_eq!(handle.await??, 7);
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Callback-to-suspension bridge.
pub mod bridge;

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::FiberId;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::{Continuation, suspend};

// ============================================================================
// Task-local State
// ============================================================================

tokio::task_local! {
    static CURRENT_FIBER: FiberId;
}

// ============================================================================
// Start
// ============================================================================

/// Starts `future` as a new fiber on the tokio runtime.
///
/// # Panics
///
/// Panics if called outside a tokio runtime, like [`tokio::spawn`].
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let fiber = FiberId::next();
    trace!(%fiber, "Fiber started");
    tokio::spawn(CURRENT_FIBER.scope(fiber, future))
}

/// Runs `future` as a fiber on the current task and returns its output.
///
/// Useful from `main` or a test body that is not itself a fiber.
pub async fn run<F: Future>(future: F) -> F::Output {
    let fiber = FiberId::next();
    trace!(%fiber, "Fiber entered");
    CURRENT_FIBER.scope(fiber, future).await
}

/// Returns the id of the running fiber.
///
/// # Errors
///
/// Returns [`Error::NotInFiber`] outside of [`spawn`] or [`run`].
pub fn current() -> Result<FiberId> {
    CURRENT_FIBER.try_with(|fiber| *fiber).map_err(|_| Error::NotInFiber)
}

/// Returns `true` if called from inside a fiber.
#[inline]
#[must_use]
pub fn in_fiber() -> bool {
    current().is_ok()
}

// ============================================================================
// Suspend / Resume
// ============================================================================

/// Captures the running fiber so it can be suspended.
///
/// Await the returned [`Parked`] to suspend; hand the [`Resumer`] to the
/// code that will eventually produce the value.
///
/// # Errors
///
/// Returns [`Error::NotInFiber`] outside of a fiber. The check happens here,
/// before any work that would need to be undone.
pub fn park<T>() -> Result<(Resumer<T>, Parked<T>)> {
    let fiber = current()?;
    let (tx, rx) = oneshot::channel();
    Ok((Resumer { fiber, tx }, Parked { fiber, rx }))
}

/// Handle that reactivates one parked fiber exactly once.
#[derive(Debug)]
pub struct Resumer<T> {
    fiber: FiberId,
    tx: oneshot::Sender<T>,
}

impl<T> Resumer<T> {
    /// Returns the fiber this handle resumes.
    #[inline]
    #[must_use]
    pub fn fiber(&self) -> FiberId {
        self.fiber
    }

    /// Resumes the parked fiber with `value`.
    ///
    /// A no-op if the fiber has already gone away.
    pub fn resume(self, value: T) {
        if self.tx.send(value).is_err() {
            trace!(fiber = %self.fiber, "Fiber gone before resume");
        } else {
            trace!(fiber = %self.fiber, "Fiber resumed");
        }
    }
}

/// Future that completes when the matching [`Resumer`] fires.
///
/// Resolves to [`Error::Abandoned`] if the resumer is dropped unused.
#[derive(Debug)]
pub struct Parked<T> {
    fiber: FiberId,
    rx: oneshot::Receiver<T>,
}

impl<T> Parked<T> {
    /// Returns the parked fiber.
    #[inline]
    #[must_use]
    pub fn fiber(&self) -> FiberId {
        self.fiber
    }
}

impl<T> Future for Parked<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map_err(Error::from)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_outside_fiber() {
        assert!(matches!(current(), Err(Error::NotInFiber)));
        assert!(!in_fiber());
    }

    #[test]
    fn test_park_outside_fiber() {
        assert!(matches!(park::<u32>(), Err(Error::NotInFiber)));
    }

    #[tokio::test]
    async fn test_run_provides_fiber() {
        let inside = run(async { current() }).await;
        assert!(inside.is_ok());
        assert!(!in_fiber());
    }

    #[tokio::test]
    async fn test_spawned_fibers_are_distinct() {
        let a = spawn(async { current() }).await.expect("join").expect("fiber");
        let b = spawn(async { current() }).await.expect("join").expect("fiber");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_plain_task_is_not_a_fiber() {
        let inside = run(async { tokio::spawn(async { in_fiber() }).await }).await;
        assert!(!inside.expect("join"));
    }

    #[tokio::test]
    async fn test_park_and_resume() {
        let value = spawn(async {
            let (resumer, parked) = park::<u32>()?;
            assert_eq!(resumer.fiber(), parked.fiber());
            tokio::spawn(async move { resumer.resume(7) });
            parked.await
        })
        .await
        .expect("join")
        .expect("resumed");

        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_dropped_resumer_abandons() {
        let outcome = run(async {
            let (resumer, parked) = park::<u32>()?;
            drop(resumer);
            parked.await
        })
        .await;

        assert!(matches!(outcome, Err(Error::Abandoned(_))));
    }
}
