//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Classroom identifiers and boundary validation."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Rejection raised when an external value cannot name a classroom.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// Zero or negative identifiers.
    #[error("classroom id must be positive, got {0}")]
    NotPositive(i64),
    /// Values beyond the 32-bit id space.
    #[error("classroom id {0} is out of range")]
    OutOfRange(i64),
    /// Input that is not an integer at all.
    #[error("classroom id must be an integer, got '{0}'")]
    NotAnInteger(String),
}

/// Positive integer identifying a classroom / sensor channel.
///
/// The building has 30 classrooms, but nothing downstream depends on that bound;
/// any positive id is accepted so generators and the bus stay generic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct ClassroomId(u32);

impl ClassroomId {
    /// Construct an id, rejecting zero.
    pub fn new(raw: u32) -> Result<Self, IdError> {
        if raw == 0 {
            return Err(IdError::NotPositive(0));
        }
        Ok(Self(raw))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Id as a seed component for the pseudo-random generator.
    pub fn as_f64(self) -> f64 {
        f64::from(self.0)
    }
}

impl fmt::Display for ClassroomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for ClassroomId {
    type Error = IdError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value <= 0 {
            return Err(IdError::NotPositive(value));
        }
        let raw = u32::try_from(value).map_err(|_| IdError::OutOfRange(value))?;
        Ok(Self(raw))
    }
}

impl TryFrom<u32> for ClassroomId {
    type Error = IdError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClassroomId> for u32 {
    fn from(id: ClassroomId) -> Self {
        id.0
    }
}

impl FromStr for ClassroomId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value = trimmed
            .parse::<i64>()
            .map_err(|_| IdError::NotAnInteger(trimmed.to_owned()))?;
        Self::try_from(value)
    }
}
