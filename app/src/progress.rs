// ==============================================================================
// progress.rs - Per-File Progress Counter
// ==============================================================================
// Description: Shared, throttled progress counter flushed to the file record
// Version: 1.0.0
// ==============================================================================
// Invariants:
//   - done never exceeds total
//   - running percentage is capped at 99; 100 is written once, by complete()
//   - flushes happen under the counter lock, so concurrent advances never
//     write out of order or repeat a percentage
// ==============================================================================

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::models::FileId;
use crate::services::FileRecords;

#[derive(Debug, Default)]
struct ProgressState {
    total: u64,
    done: u64,
    latency: u64,
    last_flushed: Option<u8>,
    completed: bool,
}

impl ProgressState {
    fn running_percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let percent = (self.done.saturating_mul(100) / self.total).min(99);
        percent as u8
    }
}

/// Progress counter shared by the ingestion loop and aggregation workers
pub struct ProgressCounter {
    file_id: FileId,
    records: Arc<dyn FileRecords>,
    state: Mutex<ProgressState>,
}

impl ProgressCounter {
    pub fn new(file_id: FileId, records: Arc<dyn FileRecords>) -> Self {
        Self {
            file_id,
            records,
            state: Mutex::new(ProgressState {
                latency: 1,
                ..ProgressState::default()
            }),
        }
    }

    /// Declare the total number of units and the flush interval
    pub async fn set_total(&self, total: u64, latency: u64) {
        let mut state = self.state.lock().await;
        state.total = total;
        state.done = 0;
        state.latency = latency.max(1);
    }

    /// Change the flush interval without touching the count
    pub async fn set_latency(&self, latency: u64) {
        self.state.lock().await.latency = latency.max(1);
    }

    /// Count one unit of work
    pub async fn advance(&self) {
        let mut state = self.state.lock().await;
        if state.completed || state.done >= state.total {
            return;
        }
        state.done += 1;

        if state.done % state.latency == 0 || state.done == state.total {
            let percent = state.running_percent();
            self.flush(&mut state, percent).await;
        }
    }

    /// Jump forward to an explicit percentage (capped at 99 until `complete`)
    ///
    /// The count is raised to match, so later advances continue from there.
    /// Never moves backwards.
    pub async fn advance_to(&self, percent: u8) {
        let mut state = self.state.lock().await;
        if state.completed {
            return;
        }
        let percent = percent.min(99);
        if state.last_flushed.is_some_and(|last| last >= percent) {
            return;
        }

        let target = (state.total.saturating_mul(u64::from(percent)) + 99) / 100;
        state.done = state.done.max(target.min(state.total));
        self.flush(&mut state, percent).await;
    }

    /// Mark the run finished; writes 100% exactly once
    pub async fn complete(&self) {
        let mut state = self.state.lock().await;
        if state.completed {
            return;
        }
        state.completed = true;
        state.done = state.total;
        self.flush(&mut state, 100).await;
    }

    pub async fn snapshot(&self) -> (u64, u64) {
        let state = self.state.lock().await;
        (state.done, state.total)
    }

    async fn flush(&self, state: &mut ProgressState, percent: u8) {
        if state.last_flushed == Some(percent) {
            return;
        }
        match self.records.set_progress(self.file_id, percent).await {
            Ok(()) => state.last_flushed = Some(percent),
            Err(e) => warn!("Failed to flush progress {}% for file {}: {}", percent, self.file_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::models::FileRecord;
    use uuid::Uuid;

    async fn counter() -> (Arc<InMemoryStore>, Arc<ProgressCounter>, FileId) {
        let store = Arc::new(InMemoryStore::new());
        let file_id = Uuid::new_v4();
        store.insert_file(FileRecord::new(file_id, "user@example.com", "genome.txt")).await;
        let counter = Arc::new(ProgressCounter::new(file_id, store.clone()));
        (store, counter, file_id)
    }

    #[tokio::test]
    async fn test_never_exceeds_total() {
        let (_, counter, _) = counter().await;
        counter.set_total(3, 1).await;
        for _ in 0..10 {
            counter.advance().await;
        }
        assert_eq!(counter.snapshot().await, (3, 3));
    }

    #[tokio::test]
    async fn test_running_percent_capped_until_complete() {
        let (store, counter, file_id) = counter().await;
        counter.set_total(4, 1).await;
        for _ in 0..4 {
            counter.advance().await;
        }
        assert_eq!(store.get_file(file_id).await.unwrap().progress, 99);

        counter.complete().await;
        counter.complete().await;
        assert_eq!(store.get_file(file_id).await.unwrap().progress, 100);
        assert_eq!(store.progress_history(file_id).await.iter().filter(|p| **p == 100).count(), 1);
    }

    #[tokio::test]
    async fn test_advance_to_only_moves_forward() {
        let (store, counter, file_id) = counter().await;
        counter.set_total(10, 1).await;
        for _ in 0..5 {
            counter.advance().await;
        }

        counter.advance_to(30).await;
        counter.advance_to(70).await;
        assert_eq!(counter.snapshot().await, (7, 10));

        counter.advance().await;
        counter.advance_to(150).await;
        counter.complete().await;

        assert_eq!(
            store.progress_history(file_id).await,
            vec![10, 20, 30, 40, 50, 70, 80, 99, 100]
        );
    }

    #[tokio::test]
    async fn test_latency_throttles_flushes() {
        let (store, counter, file_id) = counter().await;
        counter.set_total(1000, 100).await;
        for _ in 0..250 {
            counter.advance().await;
        }
        assert_eq!(store.progress_history(file_id).await, vec![10, 20]);
    }

    #[tokio::test]
    async fn test_concurrent_advances_are_counted_once() {
        let (store, counter, file_id) = counter().await;
        counter.set_total(800, 7).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    counter.advance().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(counter.snapshot().await, (800, 800));
        let history = store.progress_history(file_id).await;
        assert!(history.windows(2).all(|w| w[0] < w[1]), "out of order: {:?}", history);
        assert_eq!(history.last(), Some(&99));
    }
}
