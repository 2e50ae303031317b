//! Callback-to-suspension bridge.
//!
//! Every call-style operation is written once against a [`Continuation`].
//! The callback form passes the caller's closure straight through; the
//! awaiting form goes through [`suspend`], which parks the running fiber and
//! installs a continuation that resumes it. Request construction and
//! correlation are therefore identical in both modes.
//!
//! ```text
//! suspend(start)
//!   1. park()            capture the running fiber
//!   2. start(resume)     send the request, register `resume` as handler
//!   3. parked.await      yield to the scheduler
//!   4. Ok(v) / Err(e)    returned / raised to the caller
//! ```

// ============================================================================
// Imports
// ============================================================================

use tracing::trace;

use crate::error::Result;

use super::park;

// ============================================================================
// Types
// ============================================================================

/// One-shot handler invoked with the eventual outcome of an operation.
pub type Continuation<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

// ============================================================================
// suspend
// ============================================================================

/// Runs `start` with a continuation that resumes the current fiber, then
/// suspends until that continuation fires.
///
/// `start` must register the continuation before returning `Ok`. If `start`
/// fails, its error is returned immediately and the fiber is not suspended.
///
/// # Errors
///
/// - [`Error::NotInFiber`](crate::Error::NotInFiber) if not running inside a fiber
/// - the error returned by `start`
/// - the error delivered to the continuation
/// - [`Error::Abandoned`](crate::Error::Abandoned) if the continuation is dropped uninvoked
pub async fn suspend<T, F>(start: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(Continuation<T>) -> Result<()>,
{
    let (resumer, parked) = park::<Result<T>>()?;
    let fiber = resumer.fiber();

    start(Box::new(move |outcome| resumer.resume(outcome)))?;

    trace!(%fiber, "Fiber suspended");
    parked.await?
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::error::Error;
    use crate::fiber;

    #[tokio::test]
    async fn test_suspend_outside_fiber() {
        let started = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&started);

        let outcome = suspend::<u32, _>(move |_resume| {
            *flag.lock() = true;
            Ok(())
        })
        .await;

        assert!(matches!(outcome, Err(Error::NotInFiber)));
        assert!(!*started.lock(), "start must not run outside a fiber");
    }

    #[tokio::test]
    async fn test_suspend_returns_value() {
        let outcome = fiber::run(suspend(|resume| {
            tokio::spawn(async move { resume(Ok("done")) });
            Ok(())
        }))
        .await;

        assert_eq!(outcome.expect("value"), "done");
    }

    #[tokio::test]
    async fn test_suspend_raises_delivered_error() {
        let outcome = fiber::run(suspend::<(), _>(|resume| {
            resume(Err(Error::remote("boom")));
            Ok(())
        }))
        .await;

        let err = outcome.expect_err("delivered error");
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_suspend_start_error_is_immediate() {
        let outcome = fiber::run(suspend::<(), _>(|_resume| Err(Error::NotAuthenticated))).await;
        assert!(matches!(outcome, Err(Error::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_suspend_dropped_continuation() {
        let outcome = fiber::run(suspend::<(), _>(|resume| {
            drop(resume);
            Ok(())
        }))
        .await;

        assert!(matches!(outcome, Err(Error::Abandoned(_))));
    }
}
