use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::error::{HistoryError, Result};
use crate::poll::PollTarget;
use crate::reconcile::{ListReconciler, Reconciliation};
use crate::sink::RenderSink;
use crate::source::{Snapshot, SnapshotFetcher};

/// The rendered set, shared between the controller and whoever draws it.
/// The lock is only held for the synchronous reconcile section.
pub type SharedReconciler<S> = Arc<Mutex<ListReconciler<S>>>;

#[derive(Debug)]
pub enum RefreshOutcome {
    Refreshed {
        reconciliation: Reconciliation,
        /// Pending records visible after the refresh.
        pending: usize,
    },
    Failed(HistoryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another page load is already running.
    InFlight,
    /// Everything the backend reported is already loaded.
    Exhausted,
}

#[derive(Debug)]
pub enum PageLoad {
    Loaded {
        /// Records the backend returned; `loaded_count` advanced by this much.
        returned: usize,
        /// Records that were new to the rendered set.
        appended: usize,
    },
    Skipped(SkipReason),
    Failed(HistoryError),
}

/// Tracks how much of the backend's history is loaded and fetches more of it.
///
/// `loaded_count` and `total_count` are written only here. Every successful
/// fetch replaces `total_count` with the backend's figure; failed fetches
/// leave both counters alone so the next poll tick or scroll event can retry.
pub struct PaginationController<F, S> {
    fetcher: F,
    reconciler: SharedReconciler<S>,
    page_size: usize,
    loaded: AtomicUsize,
    total: AtomicUsize,
    /// One permit; a page load holds it for the whole fetch and append.
    loading: Semaphore,
}

impl<F, S> PaginationController<F, S>
where
    F: SnapshotFetcher,
    S: RenderSink,
{
    pub fn new(fetcher: F, reconciler: SharedReconciler<S>, page_size: usize) -> Self {
        Self {
            fetcher,
            reconciler,
            page_size: page_size.max(1),
            loaded: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            loading: Semaphore::new(1),
        }
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn total_count(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn is_loading(&self) -> bool {
        self.loading.available_permits() == 0
    }

    pub fn has_more(&self) -> bool {
        self.loaded_count() < self.total_count()
    }

    pub fn reconciler(&self) -> &SharedReconciler<S> {
        &self.reconciler
    }

    /// Re-fetch the window the user has already scrolled through.
    ///
    /// The window is sized to `loaded_count` rather than one page, so a poll
    /// re-validates everything on screen. With nothing loaded yet it fetches a
    /// single page, which makes this the initial load as well.
    pub async fn refresh_first_page(&self) -> RefreshOutcome {
        let loaded = self.loaded_count();
        let limit = if loaded == 0 { self.page_size } else { loaded };

        let snapshot = match self.fetch(0, limit).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to refresh history (limit {}): {}", limit, e);
                return RefreshOutcome::Failed(e);
            }
        };

        self.total.store(snapshot.total, Ordering::Release);

        let mut reconciler = self.reconciler.lock().await;
        let scope = limit.min(reconciler.len());
        let reconciliation = reconciler.reconcile_window(&snapshot.items, scope, snapshot.total);
        let pending = reconciler.pending_count();
        drop(reconciler);

        // A routine refresh never shrinks the window.
        self.loaded.fetch_max(snapshot.items.len(), Ordering::AcqRel);

        debug!(
            "Refreshed {} records (total {}, pending {})",
            snapshot.items.len(),
            snapshot.total,
            pending
        );
        RefreshOutcome::Refreshed {
            reconciliation,
            pending,
        }
    }

    /// Fetch the page after the loaded window and append it.
    ///
    /// A call made while another load is running, or once everything is
    /// loaded, returns immediately without fetching.
    pub async fn load_next_page(&self) -> PageLoad {
        if !self.has_more() {
            return PageLoad::Skipped(SkipReason::Exhausted);
        }

        let Ok(_permit) = self.loading.try_acquire() else {
            debug!("Page load already in flight, ignoring request");
            return PageLoad::Skipped(SkipReason::InFlight);
        };

        let offset = self.loaded_count();
        let snapshot = match self.fetch(offset, self.page_size).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to load history page at offset {}: {}", offset, e);
                return PageLoad::Failed(e);
            }
        };

        self.total.store(snapshot.total, Ordering::Release);

        let patch = self.reconciler.lock().await.append(&snapshot.items);
        let returned = snapshot.items.len();
        self.loaded.fetch_add(returned, Ordering::AcqRel);

        info!(
            "Loaded {} records at offset {} ({}/{} loaded)",
            returned,
            offset,
            self.loaded_count(),
            self.total_count()
        );
        PageLoad::Loaded {
            returned,
            appended: patch.created(),
        }
    }

    async fn fetch(&self, offset: usize, limit: usize) -> Result<Snapshot> {
        let snapshot = self.fetcher.fetch_page(offset, limit).await?;
        snapshot.validate(limit)?;
        Ok(snapshot)
    }
}

impl<F, S> PollTarget for PaginationController<F, S>
where
    F: SnapshotFetcher + 'static,
    S: RenderSink + 'static,
{
    async fn poll_once(&self) -> usize {
        self.refresh_first_page().await;
        self.reconciler.lock().await.pending_count()
    }
}
