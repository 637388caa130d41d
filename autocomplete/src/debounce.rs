use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Coalesces bursts of completion triggers. Every trigger takes a fresh
/// id and sleeps; when the timer fires, only the most recent trigger is
/// allowed through.
#[derive(Default)]
pub struct Debouncer {
    latest: AtomicU64,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when this trigger was superseded while sleeping
    /// (debounced); the latest trigger sees `false` and proceeds.
    pub async fn delay(&self, duration: Duration) -> bool {
        let id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(duration).await;
        self.latest.load(Ordering::SeqCst) != id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn single_trigger_proceeds() {
        let debouncer = Debouncer::new();
        assert!(!debouncer.delay(Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn burst_lets_only_the_latest_through() {
        let debouncer = Arc::new(Debouncer::new());
        let mut handles = Vec::new();
        for _ in 0..5 {
            let debouncer = debouncer.clone();
            handles.push(tokio::spawn(async move {
                debouncer.delay(Duration::from_millis(30)).await
            }));
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert_eq!(results.iter().filter(|debounced| !**debounced).count(), 1);
        assert!(!results[4], "the last trigger must proceed");
    }
}
