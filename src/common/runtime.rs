use std::{future::Future, time::Duration};

pub(crate) async fn sleep(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await
    }
}

/// Runs `f` to completion unless `limit` elapses first, in which case `f` is dropped.
pub(crate) async fn with_timeout<F>(limit: Duration, f: F) -> Option<F::Output>
where
    F: Future,
{
    tokio::time::timeout(limit, f).await.ok()
}
