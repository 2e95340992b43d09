use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use story_markdown::Content;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::backend::DraftBackend;
use crate::clock::{Clock, SystemClock};
use crate::error::{StoreError, StoreResult};
use crate::record::{draft_key, HistoryRecord};

/// Quiet period a scheduled save waits for before writing.
pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_secs(3);

type PendingSave = JoinHandle<StoreResult<HistoryRecord>>;

/// Draft persistence with a single debounce timer per store.
///
/// Dropping the store does not cancel a save that is already scheduled; it still
/// fires once its delay has elapsed as long as the runtime is alive.
pub struct DraftStore {
    backend: Arc<dyn DraftBackend>,
    clock: Arc<dyn Clock>,
    delay: Duration,
    pending: Mutex<Option<PendingSave>>,
}

impl DraftStore {
    pub fn new(backend: Arc<dyn DraftBackend>) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            delay: DEFAULT_SAVE_DELAY,
            pending: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Insert or update the draft for (`story_num`, `language`).
    ///
    /// A new draft gets `created_at == last_edited`; an existing one keeps its
    /// `created_at`. On failure the previously stored version is left as it was.
    pub async fn save(
        &self,
        story_num: &str,
        language: &str,
        content: Content,
    ) -> StoreResult<HistoryRecord> {
        upsert(
            self.backend.as_ref(),
            self.clock.as_ref(),
            story_num,
            language,
            content,
        )
        .await
    }

    /// Arm the debounce timer to [`save`](Self::save) `content` after the delay.
    ///
    /// Any earlier scheduled save that has not fired yet is cancelled, so a burst
    /// of calls results in one write of the last call's content. A save whose
    /// delay already elapsed is not interrupted.
    ///
    /// Storage errors of the deferred write cannot be returned here. They are
    /// logged, and [`settle`](Self::settle) hands them to the caller.
    pub fn schedule_save(&self, story_num: &str, language: &str, content: Content) -> StoreResult<()> {
        let runtime = Handle::try_current().map_err(|_| StoreError::NoRuntime)?;

        let backend = Arc::clone(&self.backend);
        let clock = Arc::clone(&self.clock);
        let delay = self.delay;
        let key = draft_key(story_num, language);
        let story_num = story_num.to_string();
        let language = language.to_string();

        let mut pending = self.lock_pending();
        if let Some(previous) = pending.take() {
            if !previous.is_finished() {
                debug!(key = %key, "superseding pending draft save");
            }
            previous.abort();
        }

        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        debug!(key = %key, delay_ms, "draft save scheduled");
        *pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            // Detached from the timer: aborting the timer from here on leaves the write running.
            let write = tokio::spawn(async move {
                let result =
                    upsert(backend.as_ref(), clock.as_ref(), &story_num, &language, content).await;
                if let Err(err) = &result {
                    error!(key = %key, error = %err, "scheduled draft save failed");
                }
                result
            });

            write
                .await
                .map_err(|err| StoreError::Task(err.to_string()))?
        }));

        Ok(())
    }

    /// True while a scheduled save has not finished writing.
    pub fn has_pending(&self) -> bool {
        self.lock_pending()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait for the most recently scheduled save and return its outcome.
    ///
    /// Returns `None` when nothing was scheduled since the last settle.
    pub async fn settle(&self) -> Option<StoreResult<HistoryRecord>> {
        let handle = self.lock_pending().take()?;
        Some(match handle.await {
            Ok(result) => result,
            Err(err) => Err(StoreError::Task(err.to_string())),
        })
    }

    /// The draft for (`story_num`, `language`), or `None` if there is none.
    pub async fn get(&self, story_num: &str, language: &str) -> StoreResult<Option<HistoryRecord>> {
        self.backend.get(&draft_key(story_num, language)).await
    }

    pub async fn get_all(&self) -> StoreResult<Vec<HistoryRecord>> {
        self.backend.all().await
    }

    /// Delete every stored draft. A save that is still scheduled is not affected.
    pub async fn clear_all(&self) -> StoreResult<()> {
        self.backend.clear().await?;
        debug!("all drafts cleared");
        Ok(())
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<PendingSave>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn upsert(
    backend: &dyn DraftBackend,
    clock: &dyn Clock,
    story_num: &str,
    language: &str,
    content: Content,
) -> StoreResult<HistoryRecord> {
    let key = draft_key(story_num, language);
    let now = clock.now();

    let record = match backend.get(&key).await? {
        Some(mut existing) => {
            existing.revise(content, now);
            existing
        }
        None => HistoryRecord::new(story_num, language, content, now),
    };

    backend.put(&record).await?;
    debug!(key = %record.key, "draft written");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use story_markdown::Section;

    #[derive(Default)]
    struct CountingBackend {
        inner: MemoryBackend,
        puts: AtomicUsize,
    }

    impl CountingBackend {
        fn puts(&self) -> usize {
            self.puts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DraftBackend for CountingBackend {
        async fn get(&self, key: &str) -> StoreResult<Option<HistoryRecord>> {
            self.inner.get(key).await
        }

        async fn put(&self, record: &HistoryRecord) -> StoreResult<()> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put(record).await
        }

        async fn all(&self) -> StoreResult<Vec<HistoryRecord>> {
            self.inner.all().await
        }

        async fn clear(&self) -> StoreResult<()> {
            self.inner.clear().await
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl DraftBackend for FailingBackend {
        async fn get(&self, _key: &str) -> StoreResult<Option<HistoryRecord>> {
            Ok(None)
        }

        async fn put(&self, _record: &HistoryRecord) -> StoreResult<()> {
            Err(StoreError::Unavailable("quota exceeded".into()))
        }

        async fn all(&self) -> StoreResult<Vec<HistoryRecord>> {
            Err(StoreError::Unavailable("quota exceeded".into()))
        }

        async fn clear(&self) -> StoreResult<()> {
            Err(StoreError::Unavailable("quota exceeded".into()))
        }
    }

    fn content(text: &str) -> Content {
        Content {
            title: "Title".into(),
            sections: vec![Section::text(1, text)],
            footnotes: String::new(),
        }
    }

    fn counting_store() -> (Arc<CountingBackend>, DraftStore) {
        let backend = Arc::new(CountingBackend::default());
        let store = DraftStore::new(backend.clone());
        (backend, store)
    }

    #[tokio::test]
    async fn first_save_sets_both_timestamps() {
        let (_, store) = counting_store();
        let x = content("x");

        store.save("05", "en", x.clone()).await.unwrap();
        let record = store.get("05", "en").await.unwrap().unwrap();

        assert_eq!(record.content, x);
        assert_eq!(record.created_at, record.last_edited);
        assert_eq!(record.key, "en_05");
    }

    #[tokio::test]
    async fn second_save_updates_content_and_last_edited_only() {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let (backend, store) = counting_store();
        let store = store.with_clock(clock.clone());

        let first = store.save("05", "en", content("x")).await.unwrap();
        clock.advance(chrono::Duration::seconds(10));
        store.save("05", "en", content("y")).await.unwrap();

        let record = store.get("05", "en").await.unwrap().unwrap();
        assert_eq!(record.created_at, first.created_at);
        assert!(record.last_edited > first.last_edited);
        assert_eq!(record.content, content("y"));
        assert_eq!(store.get_all().await.unwrap().len(), 1);
        assert_eq!(backend.puts(), 2);
    }

    #[tokio::test]
    async fn missing_draft_is_none() {
        let (_, store) = counting_store();
        assert_eq!(store.get("01", "bn").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_schedules_writes_once_with_last_content() {
        let (backend, store) = counting_store();

        store.schedule_save("05", "en", content("one")).unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        store.schedule_save("05", "en", content("two")).unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        store.schedule_save("05", "en", content("three")).unwrap();

        tokio::time::advance(Duration::from_millis(2_900)).await;
        assert_eq!(backend.puts(), 0);
        assert!(store.has_pending());

        let record = store.settle().await.unwrap().unwrap();
        assert_eq!(record.content, content("three"));
        assert_eq!(backend.puts(), 1);
        assert!(!store.has_pending());
        assert!(store.settle().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn fired_save_is_not_cancelled_by_next_schedule() {
        let (backend, store) = counting_store();

        store.schedule_save("05", "en", content("one")).unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(backend.puts(), 1);

        store.schedule_save("05", "en", content("two")).unwrap();
        store.settle().await.unwrap().unwrap();
        assert_eq!(backend.puts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stores_keep_independent_timers() {
        let shared = Arc::new(MemoryBackend::new());
        let first = DraftStore::new(shared.clone());
        let second = DraftStore::new(shared.clone());

        first.schedule_save("01", "en", content("a")).unwrap();
        second.schedule_save("02", "en", content("b")).unwrap();

        first.settle().await.unwrap().unwrap();
        second.settle().await.unwrap().unwrap();
        assert_eq!(shared.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_failure_is_reported_by_settle() {
        let store = DraftStore::new(Arc::new(FailingBackend));

        store.schedule_save("05", "en", content("lost")).unwrap();
        let outcome = store.settle().await.unwrap();

        assert!(matches!(outcome, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn storage_faults_propagate_to_caller() {
        let store = DraftStore::new(Arc::new(FailingBackend));

        assert!(matches!(
            store.save("05", "en", content("x")).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.get_all().await.is_err());
        assert!(store.clear_all().await.is_err());
    }

    #[tokio::test]
    async fn clear_all_removes_everything() {
        let (_, store) = counting_store();
        store.save("01", "en", content("a")).await.unwrap();
        store.save("01", "hi", content("b")).await.unwrap();

        store.clear_all().await.unwrap();

        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[test]
    fn scheduling_needs_a_runtime() {
        let store = DraftStore::new(Arc::new(MemoryBackend::new()));
        assert!(matches!(
            store.schedule_save("05", "en", Content::default()),
            Err(StoreError::NoRuntime)
        ));
        assert!(!store.has_pending());
    }
}
