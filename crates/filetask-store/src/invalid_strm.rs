//! Records of generated `.strm` files that failed a validity check.
//!
//! One row per file history entry: re-detecting the same file refreshes the
//! detection fields but keeps the review status an operator assigned.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::query::{PageRequest, normalized};

/// Enum stored as a lowercase text column.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $label:literal { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = StoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(StoreError::InvalidData(format!(
                        "unknown {} '{}'",
                        $label, other
                    ))),
                }
            }
        }
    };
}

text_enum! {
    /// Why a `.strm` file was judged invalid.
    InvalidReason, "invalid reason" {
        /// The media file the pointer refers to is gone.
        FileNotFound => "file_not_found",
        /// The generated `.strm` file itself is gone.
        StrmFileNotFound => "strm_file_not_found",
        /// The pointer body is empty, relative or not a parseable URL.
        UrlInvalid => "url_invalid",
        /// The `.strm` file exists but cannot be read.
        AccessDenied => "access_denied",
    }
}

text_enum! {
    /// Review state of a detection.
    InvalidStatus, "invalid status" {
        /// Detected, not yet reviewed.
        Pending => "pending",
        Confirmed => "confirmed",
        Ignored => "ignored",
        /// Being repaired.
        Processing => "processing",
    }
}

text_enum! {
    /// How a detection was triggered.
    DetectionType, "detection type" {
        Auto => "auto",
        Manual => "manual",
    }
}

/// A `.strm` file that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidStrmFile {
    pub id: i64,
    /// The file history row this detection is about. Unique.
    pub file_history_id: i64,
    pub detection_time: DateTime<Utc>,
    pub detection_type: DetectionType,
    pub reason: InvalidReason,
    pub error_message: Option<String>,
    pub status: InvalidStatus,
    pub file_name: String,
    pub source_path: String,
    pub target_file_path: String,
    pub file_size: i64,
    /// Body read from the `.strm` file, when it could be read.
    pub strm_url: Option<String>,
    /// When the status was last changed by an operator.
    pub processed_at: Option<DateTime<Utc>>,
    pub process_result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for recording a detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvalidStrmFile {
    pub file_history_id: i64,
    pub detection_time: DateTime<Utc>,
    pub detection_type: DetectionType,
    pub reason: InvalidReason,
    pub error_message: Option<String>,
    pub file_name: String,
    pub source_path: String,
    pub target_file_path: String,
    pub file_size: i64,
    pub strm_url: Option<String>,
}

impl NewInvalidStrmFile {
    /// Build into a fresh pending row.
    pub(crate) fn into_record(self, id: i64, now: DateTime<Utc>) -> InvalidStrmFile {
        InvalidStrmFile {
            id,
            file_history_id: self.file_history_id,
            detection_time: self.detection_time,
            detection_type: self.detection_type,
            reason: self.reason,
            error_message: self.error_message,
            status: InvalidStatus::Pending,
            file_name: self.file_name,
            source_path: self.source_path,
            target_file_path: self.target_file_path,
            file_size: self.file_size,
            strm_url: self.strm_url,
            processed_at: None,
            process_result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the detection fields of an existing row, keeping its
    /// review state.
    pub(crate) fn refresh(self, record: &mut InvalidStrmFile, now: DateTime<Utc>) {
        record.detection_time = self.detection_time;
        record.detection_type = self.detection_type;
        record.reason = self.reason;
        record.error_message = self.error_message;
        record.file_name = self.file_name;
        record.source_path = self.source_path;
        record.target_file_path = self.target_file_path;
        record.file_size = self.file_size;
        record.strm_url = self.strm_url;
        record.updated_at = now;
    }
}

/// Filter for invalid-file listings. Results are newest detection first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidStrmQuery {
    /// Matches file name, source path or target path.
    pub keyword: Option<String>,
    pub status: Option<InvalidStatus>,
    pub reason: Option<InvalidReason>,
    pub detection_type: Option<DetectionType>,
    /// Inclusive bounds on `detection_time`.
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub page: PageRequest,
}

impl InvalidStrmQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn status(mut self, status: InvalidStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn reason(mut self, reason: InvalidReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn detection_type(mut self, detection_type: DetectionType) -> Self {
        self.detection_type = Some(detection_type);
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.start_time = from;
        self.end_time = to;
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }

    pub fn matches(&self, record: &InvalidStrmFile) -> bool {
        if let Some(keyword) = normalized(&self.keyword) {
            let hit = [&record.file_name, &record.source_path, &record.target_file_path]
                .iter()
                .any(|field| field.to_lowercase().contains(&keyword));
            if !hit {
                return false;
            }
        }
        self.status.is_none_or(|s| s == record.status)
            && self.reason.is_none_or(|r| r == record.reason)
            && self.detection_type.is_none_or(|d| d == record.detection_type)
            && self.start_time.is_none_or(|from| record.detection_time >= from)
            && self.end_time.is_none_or(|to| record.detection_time <= to)
    }
}

/// Counts of detections by review status and by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidStrmStats {
    pub total: u64,
    pub pending: u64,
    pub confirmed: u64,
    pub ignored: u64,
    pub processing: u64,
    pub by_reason: BTreeMap<InvalidReason, u64>,
}

impl InvalidStrmStats {
    pub fn record(&mut self, status: InvalidStatus, reason: InvalidReason, count: u64) {
        self.total += count;
        match status {
            InvalidStatus::Pending => self.pending += count,
            InvalidStatus::Confirmed => self.confirmed += count,
            InvalidStatus::Ignored => self.ignored += count,
            InvalidStatus::Processing => self.processing += count,
        }
        *self.by_reason.entry(reason).or_default() += count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_text_forms() {
        for reason in InvalidReason::ALL {
            assert_eq!(reason.as_str().parse::<InvalidReason>().unwrap(), *reason);
        }
        assert_eq!(
            " Strm_File_Not_Found ".parse::<InvalidReason>().unwrap(),
            InvalidReason::StrmFileNotFound
        );
        assert_eq!(format!("{:<10}|", InvalidStatus::Ignored), "ignored   |");
        let err = "lost".parse::<InvalidStatus>().unwrap_err();
        assert!(err.to_string().contains("unknown invalid status 'lost'"));
        assert_eq!(
            serde_json::to_value(DetectionType::Manual).unwrap(),
            serde_json::json!("manual")
        );
    }

    #[test]
    fn test_stats_fold_by_status_and_reason() {
        let mut stats = InvalidStrmStats::default();
        stats.record(InvalidStatus::Pending, InvalidReason::FileNotFound, 3);
        stats.record(InvalidStatus::Ignored, InvalidReason::FileNotFound, 1);
        stats.record(InvalidStatus::Pending, InvalidReason::UrlInvalid, 2);

        assert_eq!(stats.total, 6);
        assert_eq!(stats.pending, 5);
        assert_eq!(stats.ignored, 1);
        assert_eq!(stats.by_reason[&InvalidReason::FileNotFound], 4);
        assert_eq!(stats.by_reason.get(&InvalidReason::AccessDenied), None);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["byReason"]["url_invalid"], 2);
    }

    #[test]
    fn test_refresh_keeps_review_state() {
        let now = Utc::now();
        let new = NewInvalidStrmFile {
            file_history_id: 4,
            detection_time: now,
            detection_type: DetectionType::Auto,
            reason: InvalidReason::FileNotFound,
            error_message: None,
            file_name: "a.mkv".into(),
            source_path: "/mnt/a.mkv".into(),
            target_file_path: "/srv/a.strm".into(),
            file_size: 1,
            strm_url: Some("/mnt/a.mkv".into()),
        };
        let mut record = new.clone().into_record(1, now);
        record.status = InvalidStatus::Ignored;

        let again = NewInvalidStrmFile {
            reason: InvalidReason::UrlInvalid,
            detection_type: DetectionType::Manual,
            ..new
        };
        again.refresh(&mut record, now);
        assert_eq!(record.status, InvalidStatus::Ignored);
        assert_eq!(record.reason, InvalidReason::UrlInvalid);
        assert_eq!(record.detection_type, DetectionType::Manual);
    }

    #[test]
    fn test_query_matches() {
        let now = Utc::now();
        let record = NewInvalidStrmFile {
            file_history_id: 1,
            detection_time: now,
            detection_type: DetectionType::Auto,
            reason: InvalidReason::StrmFileNotFound,
            error_message: None,
            file_name: "Movie.mkv".into(),
            source_path: "/mnt/Movie.mkv".into(),
            target_file_path: "/srv/Movie.strm".into(),
            file_size: 1,
            strm_url: None,
        }
        .into_record(1, now);

        assert!(InvalidStrmQuery::new().keyword("movie").matches(&record));
        assert!(!InvalidStrmQuery::new().keyword("show").matches(&record));
        assert!(InvalidStrmQuery::new()
            .status(InvalidStatus::Pending)
            .reason(InvalidReason::StrmFileNotFound)
            .matches(&record));
        assert!(!InvalidStrmQuery::new()
            .detection_type(DetectionType::Manual)
            .matches(&record));
        assert!(!InvalidStrmQuery::new()
            .between(Some(now + chrono::Duration::seconds(1)), None)
            .matches(&record));
    }
}
