//! Entry points a front end drives: initial load, submissions, scrolling and
//! reuse of past records.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::pagination::{PageLoad, PaginationController, RefreshOutcome, SharedReconciler};
use crate::poll::PollScheduler;
use crate::reconcile::ListReconciler;
use crate::record::{JobRequest, RecordId};
use crate::sink::RenderSink;
use crate::source::{JobSubmitter, RecordDetails, SnapshotFetcher};
use crate::viewport::{ScrollMetrics, ScrollSource, ViewportTrigger};

/// Everything a backend has to offer the history view.
pub trait Backend: SnapshotFetcher + RecordDetails + JobSubmitter + 'static {}

impl<T> Backend for T where T: SnapshotFetcher + RecordDetails + JobSubmitter + 'static {}

pub struct History<B, S> {
    backend: Arc<B>,
    controller: Arc<PaginationController<Arc<B>, S>>,
    scheduler: PollScheduler,
    trigger: ViewportTrigger,
}

impl<B, S> History<B, S>
where
    B: Backend,
    S: RenderSink + 'static,
{
    pub fn new(backend: Arc<B>, sink: S, config: &ClientConfig) -> Self {
        let reconciler = Arc::new(Mutex::new(ListReconciler::new(sink)));
        let controller = Arc::new(PaginationController::new(
            Arc::clone(&backend),
            reconciler,
            config.page_size,
        ));

        Self {
            backend,
            controller,
            scheduler: PollScheduler::new(config.poll_interval()),
            trigger: ViewportTrigger::new(config.scroll_threshold),
        }
    }

    pub fn controller(&self) -> &PaginationController<Arc<B>, S> {
        &self.controller
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    pub fn reconciler(&self) -> &SharedReconciler<S> {
        self.controller.reconciler()
    }

    /// Render the first page and keep polling while anything on it is pending.
    pub async fn initial_load(&self) -> RefreshOutcome {
        let outcome = self.controller.refresh_first_page().await;
        if let RefreshOutcome::Refreshed { pending, .. } = &outcome {
            if *pending > 0 {
                self.start_polling();
            }
        }
        outcome
    }

    /// Refresh once and pick polling back up if the refresh turned up pending
    /// work, e.g. a job submitted by another client. Returns whether polling
    /// is running afterwards.
    pub async fn resume_if_pending(&self) -> bool {
        if self.scheduler.is_running() {
            return true;
        }
        match self.controller.refresh_first_page().await {
            RefreshOutcome::Refreshed { pending, .. } if pending > 0 => {
                info!("{} pending jobs appeared, resuming polling", pending);
                self.start_polling();
                true
            }
            _ => false,
        }
    }

    /// Returns false when polling was already running.
    pub fn start_polling(&self) -> bool {
        self.scheduler.start(Arc::clone(&self.controller))
    }

    /// Submit a job, show it straight away and make sure it gets polled.
    /// A rejected submission leaves the rendered list untouched.
    pub async fn submit(&self, request: JobRequest) -> Result<RecordId> {
        let id = self.backend.submit_job(request).await?;
        info!("Submitted job {}", id);

        self.controller.refresh_first_page().await;
        self.start_polling();
        Ok(id)
    }

    /// Feed a scroll event from either scroll position. Returns `None` when the
    /// viewport is not close enough to the end of the list.
    pub async fn on_scroll(&self, source: ScrollSource, metrics: ScrollMetrics) -> Option<PageLoad> {
        if !self.trigger.should_load(metrics) {
            return None;
        }
        debug!(
            "{} scroll near the end ({} remaining), loading next page",
            source,
            metrics.remaining()
        );
        Some(self.controller.load_next_page().await)
    }

    /// Prompt of a rendered record, for reuse in a new request.
    pub async fn prompt_of(&self, id: &RecordId) -> Option<String> {
        self.reconciler()
            .lock()
            .await
            .record(id)
            .map(|record| record.prompt.clone())
    }

    /// Source image of any record the backend knows, if it was submitted with
    /// one.
    pub async fn source_image_of(&self, id: &RecordId) -> Result<Option<Vec<u8>>> {
        let record = self.backend.fetch_record(id).await?;
        if !record.has_source_image {
            return Ok(None);
        }
        let image = self.backend.fetch_source_image(id).await?;
        Ok(Some(image))
    }

    pub fn shutdown(&self) {
        self.scheduler.stop();
        info!("History shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordStatus;
    use crate::sink::CardList;
    use crate::store::RecordStore;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> ClientConfig {
        ClientConfig {
            store_dir: dir.path().to_path_buf(),
            page_size: 3,
            poll_interval_ms: 1000,
            scroll_threshold: 2,
        }
    }

    fn history(dir: &TempDir) -> (Arc<RecordStore>, History<RecordStore, CardList>) {
        let config = test_config(dir);
        let store = Arc::new(RecordStore::open(&config.store_dir).unwrap());
        let history = History::new(Arc::clone(&store), CardList::new(), &config);
        (store, history)
    }

    #[tokio::test]
    async fn test_initial_load_without_pending_does_not_poll() {
        let temp_dir = TempDir::new().unwrap();
        let (store, history) = history(&temp_dir);
        let id = store.submit_job(JobRequest::new("done already")).await.unwrap();
        store.resolve(&id, RecordStatus::Done, None, None).unwrap();

        history.initial_load().await;

        assert!(!history.scheduler().is_running());
        assert_eq!(history.reconciler().lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_renders_and_starts_polling() {
        let temp_dir = TempDir::new().unwrap();
        let (_store, history) = history(&temp_dir);

        let id = history.submit(JobRequest::new("a lighthouse at dusk")).await.unwrap();

        assert!(history.scheduler().is_running());
        assert_eq!(history.reconciler().lock().await.rendered_ids(), &[id.clone()]);
        assert_eq!(history.prompt_of(&id).await.as_deref(), Some("a lighthouse at dusk"));
        history.shutdown();
        assert!(!history.scheduler().is_running());
    }

    #[tokio::test]
    async fn test_rejected_submission_changes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let (_store, history) = history(&temp_dir);

        let mut request = JobRequest::new("too long");
        request.duration = 60;
        assert!(history.submit(request).await.is_err());
        assert!(!history.scheduler().is_running());
        assert!(history.reconciler().lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_scroll_far_from_the_end_loads_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let (_store, history) = history(&temp_dir);

        let far = ScrollMetrics::new(0, 10, 100);
        assert!(history.on_scroll(ScrollSource::Panel, far).await.is_none());
    }

    #[tokio::test]
    async fn test_source_image_only_when_submitted_with_one() {
        let temp_dir = TempDir::new().unwrap();
        let (store, history) = history(&temp_dir);

        let mut request = JobRequest::new("with image");
        request.image = Some(vec![1, 2, 3]);
        let with_image = store.submit_job(request).await.unwrap();
        let without_image = store.submit_job(JobRequest::new("without")).await.unwrap();

        assert_eq!(
            history.source_image_of(&with_image).await.unwrap(),
            Some(vec![1, 2, 3])
        );
        assert_eq!(history.source_image_of(&without_image).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resume_picks_up_jobs_from_another_client() {
        let temp_dir = TempDir::new().unwrap();
        let (store, history) = history(&temp_dir);
        let id = store.submit_job(JobRequest::new("finished")).await.unwrap();
        store.resolve(&id, RecordStatus::Done, None, None).unwrap();
        history.initial_load().await;
        assert!(!history.scheduler().is_running());
        assert!(!history.resume_if_pending().await);

        let other = RecordStore::open(temp_dir.path()).unwrap();
        let new_id = other.submit_job(JobRequest::new("from elsewhere")).await.unwrap();

        assert!(history.resume_if_pending().await);
        assert!(history.scheduler().is_running());
        assert_eq!(history.controller().total_count(), 2);
        assert_eq!(history.reconciler().lock().await.rendered_ids()[0], new_id);
        history.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_stops_once_the_job_resolves() {
        let temp_dir = TempDir::new().unwrap();
        let (store, history) = history(&temp_dir);

        let id = history.submit(JobRequest::new("slow job")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(history.scheduler().is_running());

        store.resolve(&id, RecordStatus::Done, Some("clip.mp4".into()), None).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(!history.scheduler().is_running());
        let reconciler = history.reconciler().lock().await;
        let card = reconciler.sink().get(&id).unwrap();
        assert_eq!(card.status, RecordStatus::Done);
    }
}
