//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap broker calls with a deadline
//! - Report which operation expired and after how long
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - An expired operation is dropped (cancelled), never awaited further

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// An operation did not finish before its deadline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} timed out after {elapsed:?}")]
pub struct TimedOut {
    pub operation: &'static str,
    pub elapsed: Duration,
}

/// Run `fut` with a deadline.
pub async fn within<F, T>(operation: &'static str, limit: Duration, fut: F) -> Result<T, TimedOut>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, fut).await.map_err(|_| TimedOut {
        operation,
        elapsed: limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_within_deadline() {
        let value = within("noop", Duration::from_millis(100), async { 7 }).await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test]
    async fn test_expired() {
        let result = within("sleep", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.operation, "sleep");
        assert!(err.to_string().contains("sleep timed out"));
    }
}
