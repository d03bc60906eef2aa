//! User domain types.

use serde::{Deserialize, Serialize};

/// Campus role of the caller.
///
/// Wire format: `u8` (0 = Student, 1 = Teacher, 2 = Admin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Student = 0,
    Teacher = 1,
    Admin = 2,
}

impl UserRole {
    /// Convert from `u8` wire value. Returns `None` for unknown values.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Student),
            1 => Some(Self::Teacher),
            2 => Some(Self::Admin),
            _ => None,
        }
    }

    /// Convert to `u8` wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Teachers and admins may issue and manage sessions.
    pub fn can_manage_sessions(self) -> bool {
        matches!(self, Self::Teacher | Self::Admin)
    }
}
