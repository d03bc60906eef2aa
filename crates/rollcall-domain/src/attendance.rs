//! Attendance status types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Day-level attendance status of a student for a subject.
///
/// Wire format: lowercase string (`"present"`, `"late"`, `"absent"`, `"excused"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
    Excused,
}

impl AttendanceStatus {
    /// Status for a scan accepted at `accepted_at` for a class starting at `class_start`.
    ///
    /// Checking in strictly after the official start is `Late`; the session's expiry
    /// plays no part here.
    pub fn derive(accepted_at: DateTime<Utc>, class_start: DateTime<Utc>) -> Self {
        if accepted_at > class_start {
            Self::Late
        } else {
            Self::Present
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Late => "late",
            Self::Absent => "absent",
            Self::Excused => "excused",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown attendance status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for AttendanceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(Self::Present),
            "late" => Ok(Self::Late),
            "absent" => Ok(Self::Absent),
            "excused" => Ok(Self::Excused),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}
