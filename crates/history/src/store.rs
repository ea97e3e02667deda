//! Directory-backed record store.
//!
//! Every job lives in `<id>.json` next to an optional `<id>.image` holding the
//! source image bytes. Writes go through a uniquely named temporary file and a
//! rename so readers never observe a half-written record, and several
//! processes can share one directory.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{HistoryError, Result};
use crate::record::{JobRequest, Record, RecordId, RecordStatus};
use crate::source::{JobSubmitter, RecordDetails, Snapshot, SnapshotFetcher};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredJob {
    /// Token identifying the job to the generation backend.
    pub request_id: String,
    #[serde(flatten)]
    pub record: Record,
}

#[derive(Debug)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &RecordId) -> Result<PathBuf> {
        Ok(self.dir.join(format!("{}.json", file_stem(id)?)))
    }

    fn image_path(&self, id: &RecordId) -> Result<PathBuf> {
        Ok(self.dir.join(format!("{}.image", file_stem(id)?)))
    }

    pub fn save(&self, job: &StoredJob) -> Result<()> {
        let target = self.record_path(&job.record.id)?;
        let json = serde_json::to_string_pretty(job)?;
        write_temp(&self.dir, json.as_bytes())?
            .persist(&target)
            .map_err(|e| HistoryError::Io(e.error))?;
        Ok(())
    }

    /// All readable records, newest first. Files that cannot be read or
    /// parsed are skipped.
    pub fn load_all(&self) -> Result<Vec<StoredJob>> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }

        let mut jobs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            match fs::read_to_string(&path) {
                Ok(contents) => match serde_json::from_str::<StoredJob>(&contents) {
                    Ok(job) => jobs.push(job),
                    Err(e) => warn!("Failed to parse record file {:?}: {}", path, e),
                },
                Err(e) => warn!("Failed to read record file {:?}: {}", path, e),
            }
        }

        jobs.sort_by(|a, b| {
            b.record
                .id
                .as_u64()
                .cmp(&a.record.id.as_u64())
                .then_with(|| b.record.created_at.cmp(&a.record.created_at))
                .then_with(|| b.record.id.cmp(&a.record.id))
        });
        Ok(jobs)
    }

    pub fn load(&self, id: &RecordId) -> Result<StoredJob> {
        let path = self.record_path(id)?;
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(HistoryError::NotFound(id.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&contents)?)
    }

    /// Move a pending record to `status`. Reporting the current status again
    /// is a no-op; leaving a terminal status is refused.
    pub fn resolve(
        &self,
        id: &RecordId,
        status: RecordStatus,
        video_ref: Option<String>,
        error_message: Option<String>,
    ) -> Result<Record> {
        let mut job = self.load(id)?;
        let from = job.record.status;

        if !from.can_transition_to(status) {
            return Err(HistoryError::InvalidTransition {
                id: id.clone(),
                from,
                to: status,
            });
        }
        if from == status {
            return Ok(job.record);
        }

        let record = &mut job.record;
        record.status = status;
        match status {
            RecordStatus::Done => {
                record.video_ref =
                    Some(video_ref.unwrap_or_else(|| format!("{}.mp4", job.request_id)));
                record.error_message = None;
            }
            RecordStatus::Failed => {
                record.video_ref = None;
                record.error_message =
                    Some(error_message.unwrap_or_else(|| "Generation failed".to_string()));
            }
            RecordStatus::Expired => {
                record.video_ref = None;
                record.error_message =
                    Some(error_message.unwrap_or_else(|| "Request expired".to_string()));
            }
            RecordStatus::Rejected | RecordStatus::Pending => {
                record.video_ref = None;
                record.error_message = None;
            }
        }

        self.save(&job)?;
        info!("Record {} moved from {} to {}", id, from, status);
        Ok(job.record)
    }

    /// One past the highest numeric id with a record file, readable or not.
    fn next_id(&self) -> Result<u64> {
        let mut max = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            if let Some(n) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok())
            {
                max = max.max(n);
            }
        }
        Ok(max + 1)
    }

    /// Write `job` under the first free id at or above `next_id`. Losing a race
    /// for an id to another writer moves on to the next one.
    fn claim(&self, job: &mut StoredJob) -> Result<RecordId> {
        let mut candidate = self.next_id()?;
        loop {
            let id = RecordId::from(candidate);
            job.record.id = id.clone();
            let json = serde_json::to_string_pretty(job)?;
            let temp = write_temp(&self.dir, json.as_bytes())?;

            match temp.persist_noclobber(self.record_path(&id)?) {
                Ok(_) => return Ok(id),
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                    debug!("Record id {} already taken, trying the next one", id);
                    candidate = (candidate + 1).max(self.next_id()?);
                }
                Err(e) => return Err(HistoryError::Io(e.error)),
            }
        }
    }
}

/// Ids name files inside the store, so anything that could resolve outside
/// it is treated as unknown.
fn file_stem(id: &RecordId) -> Result<&str> {
    let stem = id.as_str();
    if stem.is_empty() || stem == "." || stem == ".." || stem.contains(['/', '\\', '\0']) {
        return Err(HistoryError::NotFound(id.clone()));
    }
    Ok(stem)
}

fn write_temp(dir: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    Ok(file)
}

impl SnapshotFetcher for RecordStore {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Snapshot> {
        let jobs = self.load_all()?;
        let total = jobs.len();
        let items = jobs
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|job| job.record)
            .collect();
        Ok(Snapshot::new(items, total))
    }
}

impl RecordDetails for RecordStore {
    async fn fetch_record(&self, id: &RecordId) -> Result<Record> {
        Ok(self.load(id)?.record)
    }

    async fn fetch_source_image(&self, id: &RecordId) -> Result<Vec<u8>> {
        match fs::read(self.image_path(id)?) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(HistoryError::NotFound(id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl JobSubmitter for RecordStore {
    async fn submit_job(&self, request: JobRequest) -> Result<RecordId> {
        request.validate()?;

        let mut job = StoredJob {
            request_id: Uuid::new_v4().to_string(),
            record: Record {
                id: RecordId::from(0u64),
                status: RecordStatus::Pending,
                prompt: request.prompt.trim().to_string(),
                duration: request.duration,
                aspect_ratio: request.aspect_ratio,
                resolution: request.resolution,
                video_ref: None,
                error_message: None,
                has_source_image: request.image.is_some(),
                created_at: Some(Utc::now()),
            },
        };
        let id = self.claim(&mut job)?;

        // The record is visible before its image; a lookup in between sees
        // NotFound and can be retried.
        if let Some(image) = &request.image {
            write_temp(&self.dir, image)?
                .persist(self.image_path(&id)?)
                .map_err(|e| HistoryError::Io(e.error))?;
        }

        info!(
            "Stored job {} (request {}, has_image={})",
            id,
            job.request_id,
            job.record.has_source_image
        );
        Ok(id)
    }
}
