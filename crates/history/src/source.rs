//! Seams to the backend: page fetches, detail lookups and job submission.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use crate::error::{HistoryError, Result};
use crate::record::{JobRequest, Record, RecordId};

/// One page of records plus the backend's total count at the time of the
/// fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub items: Vec<Record>,
    pub total: usize,
}

impl Snapshot {
    pub fn new(items: Vec<Record>, total: usize) -> Self {
        Self { items, total }
    }

    /// Reject pages that could not have come from a well-behaved backend.
    pub fn validate(&self, limit: usize) -> Result<()> {
        if self.items.len() > limit {
            return Err(HistoryError::MalformedResponse(format!(
                "page holds {} records but only {} were requested",
                self.items.len(),
                limit
            )));
        }

        let mut seen = HashSet::with_capacity(self.items.len());
        for record in &self.items {
            if !seen.insert(&record.id) {
                return Err(HistoryError::MalformedResponse(format!(
                    "record {} appears twice in one page",
                    record.id
                )));
            }
        }

        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.items.iter().filter(|r| r.is_pending()).count()
    }
}

/// Given a window, return a page of records, newest first.
pub trait SnapshotFetcher: Send + Sync {
    fn fetch_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Snapshot>> + Send;
}

/// On-demand lookups used when a past record is reused; never on the
/// reconciliation path.
pub trait RecordDetails: Send + Sync {
    fn fetch_record(&self, id: &RecordId) -> impl Future<Output = Result<Record>> + Send;

    fn fetch_source_image(&self, id: &RecordId) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

pub trait JobSubmitter: Send + Sync {
    fn submit_job(&self, request: JobRequest) -> impl Future<Output = Result<RecordId>> + Send;
}

impl<T: SnapshotFetcher> SnapshotFetcher for Arc<T> {
    fn fetch_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Snapshot>> + Send {
        (**self).fetch_page(offset, limit)
    }
}

impl<T: RecordDetails> RecordDetails for Arc<T> {
    fn fetch_record(&self, id: &RecordId) -> impl Future<Output = Result<Record>> + Send {
        (**self).fetch_record(id)
    }

    fn fetch_source_image(&self, id: &RecordId) -> impl Future<Output = Result<Vec<u8>>> + Send {
        (**self).fetch_source_image(id)
    }
}

impl<T: JobSubmitter> JobSubmitter for Arc<T> {
    fn submit_job(&self, request: JobRequest) -> impl Future<Output = Result<RecordId>> + Send {
        (**self).submit_job(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AspectRatio, RecordStatus, Resolution};

    fn record(id: u64) -> Record {
        Record {
            id: RecordId::from(id),
            status: RecordStatus::Pending,
            prompt: format!("prompt {}", id),
            duration: 5,
            aspect_ratio: AspectRatio::Auto,
            resolution: Resolution::Hd720,
            video_ref: None,
            error_message: None,
            has_source_image: false,
            created_at: None,
        }
    }

    #[test]
    fn test_validate_accepts_short_page() {
        let snapshot = Snapshot::new(vec![record(3), record(2)], 3);
        assert!(snapshot.validate(5).is_ok());
        assert_eq!(snapshot.pending_count(), 2);
    }

    #[test]
    fn test_validate_rejects_oversized_page() {
        let snapshot = Snapshot::new(vec![record(3), record(2), record(1)], 3);
        let err = snapshot.validate(2).unwrap_err();
        assert!(matches!(err, HistoryError::MalformedResponse(_)));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let snapshot = Snapshot::new(vec![record(3), record(3)], 2);
        let err = snapshot.validate(10).unwrap_err();
        assert!(err.to_string().contains("appears twice"));
    }

    #[test]
    fn test_snapshot_requires_total() {
        let json = r#"{"items": []}"#;
        assert!(serde_json::from_str::<Snapshot>(json).is_err());
    }
}
