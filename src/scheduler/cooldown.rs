//! Inter-chunk pause policy.

use std::time::Duration;

use async_trait::async_trait;

/// Default pause between chunks.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(2000);

/// Pause inserted between consecutive chunks.
///
/// Called once after every chunk except the last.
#[async_trait]
pub trait Cooldown: Send + Sync {
    /// Pause after chunk `completed_chunk` (0-based) finished.
    async fn pause(&self, completed_chunk: usize, interval: Duration);
}

/// Sleeps for the configured interval every time, regardless of how the
/// previous chunk went.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedCooldown;

#[async_trait]
impl Cooldown for FixedCooldown {
    async fn pause(&self, completed_chunk: usize, interval: Duration) {
        tracing::debug!(completed_chunk, ?interval, "cooling down");
        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }
}
