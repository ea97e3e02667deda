use genq_history::pagination::{PageLoad, PaginationController, RefreshOutcome, SkipReason};
use genq_history::reconcile::{ListReconciler, Operation, Reconciliation};
use genq_history::record::{AspectRatio, Record, RecordId, RecordStatus, Resolution};
use genq_history::sink::CardList;
use genq_history::source::{Snapshot, SnapshotFetcher};
use genq_history::{HistoryError, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn record(id: &str, status: RecordStatus) -> Record {
    Record {
        id: RecordId::from(id),
        status,
        prompt: format!("prompt {}", id),
        duration: 15,
        aspect_ratio: AspectRatio::Auto,
        resolution: Resolution::Hd720,
        video_ref: None,
        error_message: None,
        has_source_image: false,
        created_at: None,
    }
}

/// A backend whose history can be edited between fetches. Every fetch yields
/// once before answering so concurrent callers interleave.
struct FakeBackend {
    records: Mutex<Vec<Record>>,
    fetches: AtomicUsize,
    failing: AtomicBool,
    /// Submitted to the backend right after the next fetch reads its page.
    insert_after_fetch: Mutex<Option<Record>>,
}

impl FakeBackend {
    fn new(records: Vec<Record>) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(records),
            fetches: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            insert_after_fetch: Mutex::new(None),
        })
    }

    fn set_status(&self, id: &str, status: RecordStatus) {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.iter_mut().find(|r| r.id.as_str() == id) {
            record.status = status;
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl SnapshotFetcher for FakeBackend {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Snapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if self.failing.load(Ordering::SeqCst) {
            return Err(HistoryError::Transport("connection reset".to_string()));
        }
        let mut records = self.records.lock().unwrap();
        let items = records.iter().skip(offset).take(limit).cloned().collect();
        let total = records.len();
        if let Some(record) = self.insert_after_fetch.lock().unwrap().take() {
            records.insert(0, record);
        }
        Ok(Snapshot::new(items, total))
    }
}

fn controller(
    backend: &Arc<FakeBackend>,
    page_size: usize,
) -> PaginationController<Arc<FakeBackend>, CardList> {
    let reconciler = Arc::new(tokio::sync::Mutex::new(ListReconciler::new(CardList::new())));
    PaginationController::new(Arc::clone(backend), reconciler, page_size)
}

async fn shown(controller: &PaginationController<Arc<FakeBackend>, CardList>) -> Vec<String> {
    let reconciler = controller.reconciler().lock().await;
    reconciler
        .rendered_ids()
        .iter()
        .map(|id| id.as_str().to_string())
        .collect()
}

fn five_records() -> Vec<Record> {
    vec![
        record("A", RecordStatus::Pending),
        record("B", RecordStatus::Done),
        record("C", RecordStatus::Failed),
        record("D", RecordStatus::Pending),
        record("E", RecordStatus::Pending),
    ]
}

#[tokio::test]
async fn test_poll_then_page_load_walkthrough() {
    let backend = FakeBackend::new(five_records());
    let controller = controller(&backend, 3);

    controller.refresh_first_page().await;
    {
        let reconciler = controller.reconciler().lock().await;
        let ids: Vec<&str> = reconciler.rendered_ids().iter().map(RecordId::as_str).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }
    assert_eq!(controller.total_count(), 5);

    backend.set_status("A", RecordStatus::Done);
    let outcome = controller.refresh_first_page().await;
    let RefreshOutcome::Refreshed {
        reconciliation: Reconciliation::Patched(patch),
        pending,
    } = outcome
    else {
        panic!("expected a patch, got {:?}", outcome);
    };
    assert_eq!(pending, 0);
    assert_eq!(patch.moved(), 0);
    assert_eq!(patch.operations.len(), 3);
    assert!(matches!(&patch.operations[0], Operation::UpdateContent { record } if record.id.as_str() == "A"));
    assert!(matches!(&patch.operations[1], Operation::Keep { id } if id.as_str() == "B"));
    assert!(matches!(&patch.operations[2], Operation::Keep { id } if id.as_str() == "C"));

    // Only two records remain past the window.
    let load = controller.load_next_page().await;
    assert!(matches!(load, PageLoad::Loaded { returned: 2, appended: 2 }));
    assert_eq!(controller.loaded_count(), 5);
    assert!(!controller.has_more());

    let reconciler = controller.reconciler().lock().await;
    let ids: Vec<&str> = reconciler.rendered_ids().iter().map(RecordId::as_str).collect();
    assert_eq!(ids, vec!["A", "B", "C", "D", "E"]);
    assert_eq!(reconciler.sink().stats().created, 5);
}

#[tokio::test]
async fn test_concurrent_page_loads_fetch_once() {
    let backend = FakeBackend::new(five_records());
    let controller = controller(&backend, 2);
    controller.refresh_first_page().await;
    let before = backend.fetches();

    let (first, second) = tokio::join!(controller.load_next_page(), controller.load_next_page());

    assert_eq!(backend.fetches(), before + 1);
    let skipped = [&first, &second]
        .iter()
        .filter(|load| matches!(load, PageLoad::Skipped(SkipReason::InFlight)))
        .count();
    assert_eq!(skipped, 1);
    assert_eq!(controller.loaded_count(), 4);
    assert!(!controller.is_loading());
}

#[tokio::test]
async fn test_failed_load_leaves_counters_and_allows_retry() {
    let backend = FakeBackend::new(five_records());
    let controller = controller(&backend, 2);
    controller.refresh_first_page().await;

    backend.failing.store(true, Ordering::SeqCst);
    let load = controller.load_next_page().await;
    assert!(matches!(load, PageLoad::Failed(HistoryError::Transport(_))));
    assert_eq!(controller.loaded_count(), 2);
    assert_eq!(controller.total_count(), 5);
    assert!(!controller.is_loading());

    let refresh = controller.refresh_first_page().await;
    assert!(matches!(refresh, RefreshOutcome::Failed(_)));
    assert_eq!(controller.reconciler().lock().await.len(), 2);

    backend.failing.store(false, Ordering::SeqCst);
    let retry = controller.load_next_page().await;
    assert!(matches!(retry, PageLoad::Loaded { returned: 2, .. }));
    assert_eq!(controller.loaded_count(), 4);
}

#[tokio::test]
async fn test_new_submission_grows_total_without_shrinking_window() {
    let backend = FakeBackend::new(five_records());
    let controller = controller(&backend, 2);
    controller.refresh_first_page().await;
    controller.load_next_page().await;
    assert_eq!(controller.loaded_count(), 4);

    backend
        .records
        .lock()
        .unwrap()
        .insert(0, record("F", RecordStatus::Pending));
    controller.refresh_first_page().await;

    assert_eq!(controller.total_count(), 6);
    assert_eq!(controller.loaded_count(), 4);
    let reconciler = controller.reconciler().lock().await;
    let ids: Vec<&str> = reconciler.rendered_ids().iter().map(RecordId::as_str).collect();
    // D is pushed out of the refreshed window and dropped from it.
    assert_eq!(ids, vec!["F", "A", "B", "C"]);
}

#[tokio::test]
async fn test_empty_history_shows_placeholder() {
    let backend = FakeBackend::new(Vec::new());
    let controller = controller(&backend, 2);

    let outcome = controller.refresh_first_page().await;

    assert!(matches!(
        outcome,
        RefreshOutcome::Refreshed {
            reconciliation: Reconciliation::Empty,
            pending: 0
        }
    ));
    assert!(controller.reconciler().lock().await.sink().placeholder_visible());
}

#[tokio::test]
async fn test_refresh_and_page_load_interleave() {
    let backend = FakeBackend::new(five_records());
    let controller = controller(&backend, 2);
    controller.refresh_first_page().await;
    backend.set_status("A", RecordStatus::Done);

    let (refresh, load) = tokio::join!(
        controller.refresh_first_page(),
        controller.load_next_page()
    );

    assert!(matches!(refresh, RefreshOutcome::Refreshed { .. }));
    assert!(matches!(load, PageLoad::Loaded { returned: 2, appended: 2 }));
    assert_eq!(shown(&controller).await, vec!["A", "B", "C", "D"]);
    assert_eq!(controller.loaded_count(), 4);
    assert_eq!(controller.total_count(), 5);
    assert!(!controller.is_loading());

    let reconciler = controller.reconciler().lock().await;
    assert_eq!(
        reconciler.sink().get(&RecordId::from("A")).unwrap().status,
        RecordStatus::Done
    );
}

#[tokio::test]
async fn test_submission_between_interleaved_fetches() {
    let backend = FakeBackend::new(five_records());
    let controller = controller(&backend, 2);
    controller.refresh_first_page().await;
    *backend.insert_after_fetch.lock().unwrap() = Some(record("F", RecordStatus::Pending));

    tokio::join!(controller.refresh_first_page(), controller.load_next_page());

    let ids = shown(&controller).await;
    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), ids.len(), "duplicate cards in {:?}", ids);
    assert_eq!(controller.total_count(), 6);

    // The next poll and enough scrolling converge on the full history.
    controller.refresh_first_page().await;
    while let PageLoad::Loaded { .. } = controller.load_next_page().await {}

    assert_eq!(shown(&controller).await, vec!["F", "A", "B", "C", "D", "E"]);
    assert_eq!(controller.loaded_count(), 6);
    assert_eq!(controller.total_count(), 6);
}
