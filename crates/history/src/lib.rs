// Core history library modules

pub mod card;
pub mod config;
pub mod error;
pub mod history;
pub mod pagination;
pub mod poll;
pub mod reconcile;
pub mod record;
pub mod sink;
pub mod source;
pub mod store;
pub mod viewport;

// Re-export commonly used types
pub use config::{load_config, ClientConfig};
pub use error::{HistoryError, Result};
pub use history::{Backend, History};
pub use pagination::{PageLoad, PaginationController, RefreshOutcome, SkipReason};
pub use poll::PollScheduler;
pub use reconcile::{ListReconciler, Patch, Reconciliation};
pub use record::{AspectRatio, JobRequest, Record, RecordId, RecordStatus, Resolution};
pub use sink::{Card, CardList, RenderSink};
pub use source::{JobSubmitter, RecordDetails, Snapshot, SnapshotFetcher};
pub use store::RecordStore;
pub use viewport::{ScrollMetrics, ScrollSource};
