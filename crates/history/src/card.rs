use crate::record::{Record, RecordStatus};

/// Main area of a history card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardBody {
    Generating,
    Video { video_ref: String },
    Rejected,
    Error { message: String },
    /// Finished, but the backend has not attached the video yet.
    Unavailable,
}

/// Everything a front end needs to draw one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardContent {
    pub body: CardBody,
    pub prompt: String,
    pub meta: String,
    pub thumbnail: bool,
}

impl CardContent {
    pub fn from_record(record: &Record) -> Self {
        let body = match record.status {
            RecordStatus::Pending => CardBody::Generating,
            RecordStatus::Done => match &record.video_ref {
                Some(video_ref) => CardBody::Video {
                    video_ref: video_ref.clone(),
                },
                None => CardBody::Unavailable,
            },
            RecordStatus::Rejected => CardBody::Rejected,
            RecordStatus::Failed | RecordStatus::Expired => CardBody::Error {
                message: record
                    .error_message
                    .clone()
                    .unwrap_or_else(|| record.status.to_string()),
            },
        };

        Self {
            body,
            prompt: record.prompt.clone(),
            meta: meta_line(record),
            thumbnail: record.has_source_image,
        }
    }

    /// One-line summary of the body, used by list views.
    pub fn headline(&self) -> String {
        match &self.body {
            CardBody::Generating => "Generating video...".to_string(),
            CardBody::Video { video_ref } => format!("Video: {}", video_ref),
            CardBody::Rejected => "Rejected by content moderation".to_string(),
            CardBody::Error { message } => message.clone(),
            CardBody::Unavailable => "Video unavailable".to_string(),
        }
    }
}

impl From<&Record> for CardContent {
    fn from(record: &Record) -> Self {
        CardContent::from_record(record)
    }
}

pub fn meta_line(record: &Record) -> String {
    format!(
        "{}s \u{b7} {} \u{b7} {}",
        record.duration, record.aspect_ratio, record.resolution
    )
}
