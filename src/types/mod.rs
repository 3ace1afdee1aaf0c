//! Shared types for Agora

pub mod error;

use std::future::Future;
use std::time::Duration;

pub use error::{AgoraError, Result};

/// Run a store operation under an explicit deadline.
///
/// Expiry surfaces as [`AgoraError::Timeout`]; nothing is retried here.
pub async fn with_deadline<T, F>(deadline: Duration, op: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(op, deadline_ms = deadline.as_millis() as u64, "Store operation timed out");
            Err(AgoraError::Timeout(format!("{} exceeded {}ms", op, deadline.as_millis())))
        }
    }
}
