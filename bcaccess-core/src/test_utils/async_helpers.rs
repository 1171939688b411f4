//! Async test helpers

use std::future::Future;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout, Duration, Instant};

/// Helper for receiving from a oneshot channel with a timeout
pub async fn recv_oneshot_timeout<T>(
    rx: oneshot::Receiver<T>,
    duration: Duration,
) -> Result<T, RecvTimeoutError> {
    timeout(duration, rx)
        .await
        .map_err(|_| RecvTimeoutError::Timeout)?
        .map_err(|_| RecvTimeoutError::Closed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeoutError {
    Timeout,
    Closed,
}

impl std::fmt::Display for RecvTimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecvTimeoutError::Timeout => write!(f, "receive operation timed out"),
            RecvTimeoutError::Closed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for RecvTimeoutError {}

/// Helper to assert a future completes within duration
pub async fn assert_completes_within<F, T>(duration: Duration, future: F) -> T
where
    F: Future<Output = T>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => panic!("Future did not complete within {:?}", duration),
    }
}

/// Helper to assert a future does NOT complete within duration
pub async fn assert_times_out<F, T>(duration: Duration, future: F)
where
    F: Future<Output = T>,
{
    if timeout(duration, future).await.is_ok() {
        panic!("Expected future to timeout, but it completed within {:?}", duration);
    }
}

/// Poll `condition` every few milliseconds until it holds or `duration` passes
pub async fn wait_until<F>(duration: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + duration;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(5)).await;
    }
}
