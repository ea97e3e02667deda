use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{HistoryError, Result};

/// Longest clip the backend accepts, in seconds.
pub const MAX_DURATION_SECS: u32 = 15;

/// Opaque, stable record identifier.
///
/// The backend may send integers or strings; both are kept as text so that
/// ids from either form compare and hash the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value for ids that were issued as integers.
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        RecordId(value.to_string())
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        RecordId(value)
    }
}

impl FromStr for RecordId {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(HistoryError::InvalidRequest("record id cannot be empty".into()));
        }
        Ok(RecordId(trimmed.to_string()))
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.as_u64() {
            Some(n) => serializer.serialize_u64(n),
            None => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Int(u64),
            Text(String),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Int(n) => Ok(RecordId::from(n)),
            RawId::Text(s) if s.is_empty() => Err(serde::de::Error::custom("empty record id")),
            RawId::Text(s) => Ok(RecordId(s)),
        }
    }
}

/// Job lifecycle. `Pending` is the only non-terminal state and every
/// terminal state is a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Done,
    Rejected,
    Failed,
    Expired,
}

impl RecordStatus {
    pub const ALL: [RecordStatus; 5] = [
        RecordStatus::Pending,
        RecordStatus::Done,
        RecordStatus::Rejected,
        RecordStatus::Failed,
        RecordStatus::Expired,
    ];

    pub fn is_terminal(self) -> bool {
        !matches!(self, RecordStatus::Pending)
    }

    /// Whether moving from `self` to `next` is a valid lifecycle step.
    /// Reporting the same status again is always allowed.
    pub fn can_transition_to(self, next: RecordStatus) -> bool {
        self == next || self == RecordStatus::Pending
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Done => "done",
            RecordStatus::Rejected => "rejected",
            RecordStatus::Failed => "failed",
            RecordStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        RecordStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown status '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "9:16")]
    Tall,
    #[serde(rename = "4:3")]
    Classic,
    #[serde(rename = "3:4")]
    ClassicPortrait,
    #[serde(rename = "3:2")]
    Photo,
    #[serde(rename = "2:3")]
    PhotoPortrait,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 8] = [
        AspectRatio::Auto,
        AspectRatio::Square,
        AspectRatio::Wide,
        AspectRatio::Tall,
        AspectRatio::Classic,
        AspectRatio::ClassicPortrait,
        AspectRatio::Photo,
        AspectRatio::PhotoPortrait,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Auto => "auto",
            AspectRatio::Square => "1:1",
            AspectRatio::Wide => "16:9",
            AspectRatio::Tall => "9:16",
            AspectRatio::Classic => "4:3",
            AspectRatio::ClassicPortrait => "3:4",
            AspectRatio::Photo => "3:2",
            AspectRatio::PhotoPortrait => "2:3",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        AspectRatio::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == s.trim())
            .ok_or_else(|| format!("unknown aspect ratio '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "480p")]
    Sd480,
    #[default]
    #[serde(rename = "720p")]
    Hd720,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Sd480 => "480p",
            Resolution::Hd720 => "720p",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "480p" | "480" => Ok(Resolution::Sd480),
            "720p" | "720" => Ok(Resolution::Hd720),
            other => Err(format!("unknown resolution '{}'", other)),
        }
    }
}

/// One history entry as the backend reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub status: RecordStatus,
    pub prompt: String,

    // Request parameters, fixed at submission
    pub duration: u32,
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,

    // Outcome
    #[serde(default, alias = "video_filename", skip_serializing_if = "Option::is_none")]
    pub video_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// The image itself is fetched by id so pages stay small.
    #[serde(default)]
    pub has_source_image: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn is_pending(&self) -> bool {
        self.status == RecordStatus::Pending
    }
}

/// A new generation job as entered by the user.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub prompt: String,
    pub image: Option<Vec<u8>>,
    pub duration: u32,
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,
}

impl JobRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            duration: MAX_DURATION_SECS,
            aspect_ratio: AspectRatio::default(),
            resolution: Resolution::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(HistoryError::InvalidRequest("prompt cannot be empty".into()));
        }
        if self.duration == 0 || self.duration > MAX_DURATION_SECS {
            return Err(HistoryError::InvalidRequest(format!(
                "duration must be between 1 and {} seconds, got {}",
                MAX_DURATION_SECS, self.duration
            )));
        }
        if matches!(&self.image, Some(bytes) if bytes.is_empty()) {
            return Err(HistoryError::InvalidRequest("source image is empty".into()));
        }
        Ok(())
    }
}
