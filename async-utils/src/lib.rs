//! Async utilities for bounded and cancellation-aware waits.
//!
//! `OrCancelExt` races a future against a tokio `CancellationToken`;
//! `WithinExt` races it against a deadline. Neither cancels the work the
//! future is waiting *on* when it is spawned elsewhere: dropping a
//! `JoinHandle` detaches the task, it does not abort it.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Error returned when a future is cancelled.
#[derive(Debug, PartialEq, Eq)]
pub enum CancelErr {
    Cancelled,
}

/// Error returned when a bounded wait gives up.
#[derive(Debug, PartialEq, Eq)]
pub enum WaitErr {
    /// The deadline passed before the future completed.
    Elapsed(Duration),
}

/// Extension trait for making futures cancellable.
///
/// Returns `Err(CancelErr::Cancelled)` if the token is cancelled before
/// the future completes.
#[async_trait]
pub trait OrCancelExt: Sized {
    type Output;

    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, CancelErr>;
}

#[async_trait]
impl<F> OrCancelExt for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, CancelErr> {
        tokio::select! {
            _ = token.cancelled() => Err(CancelErr::Cancelled),
            res = self => Ok(res),
        }
    }
}

/// Extension trait for waiting on a future for at most `budget`.
///
/// Only the wait is abandoned at the deadline. A zero budget still polls
/// the future once, so already-complete work is observed.
#[async_trait]
pub trait WithinExt: Sized {
    type Output;

    async fn within(self, budget: Duration) -> Result<Self::Output, WaitErr>;
}

#[async_trait]
impl<F> WithinExt for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn within(self, budget: Duration) -> Result<Self::Output, WaitErr> {
        tokio::time::timeout(budget, self)
            .await
            .map_err(|_| WaitErr::Elapsed(budget))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;
    use tokio::task;
    use tokio::time::sleep;

    #[tokio::test]
    async fn returns_ok_when_future_completes_first() {
        let token = CancellationToken::new();
        let value = async { 42 };

        let result = value.or_cancel(&token).await;

        assert_eq!(Ok(42), result);
    }

    #[tokio::test]
    async fn returns_err_when_token_cancelled_first() {
        let token = CancellationToken::new();
        let token_clone = token.clone();

        let cancel_handle = task::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            token_clone.cancel();
        });

        let result = async {
            sleep(Duration::from_millis(100)).await;
            7
        }
        .or_cancel(&token)
        .await;

        cancel_handle.await.expect("cancel task panicked");
        assert_eq!(Err(CancelErr::Cancelled), result);
    }

    #[tokio::test]
    async fn within_returns_value_before_deadline() {
        let result = async {
            sleep(Duration::from_millis(5)).await;
            "done"
        }
        .within(Duration::from_secs(1))
        .await;

        assert_eq!(Ok("done"), result);
    }

    #[tokio::test]
    async fn within_gives_up_at_deadline() {
        let budget = Duration::from_millis(20);
        let result = sleep(Duration::from_secs(5)).within(budget).await;

        assert_eq!(Err(WaitErr::Elapsed(budget)), result);
    }

    #[tokio::test]
    async fn abandoned_wait_leaves_spawned_task_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let handle = task::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        });

        let waited = handle.within(Duration::from_millis(5)).await;
        assert!(waited.is_err());

        sleep(Duration::from_millis(200)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn zero_budget_still_sees_ready_future() {
        let result = async { 3 }.within(Duration::ZERO).await;

        assert_eq!(Ok(3), result);
    }
}
