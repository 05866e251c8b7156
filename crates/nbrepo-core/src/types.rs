//! Identifiers and small value types shared by every layer.
//!
//! All ids are database-assigned `i64` sequences wrapped in newtypes so a
//! share id can never be handed to an operation expecting an invite id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::names::{Username, ValueError};

// ============================================================================
// ID Types
// ============================================================================

macro_rules! sequence_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Returns the raw sequence value.
            #[must_use]
            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

sequence_id!(
    /// Identifier of a publication in the public library.
    PublicationId
);
sequence_id!(
    /// Identifier of a share record.
    ShareId
);
sequence_id!(
    /// Identifier of one invitation inside a share record.
    InviteId
);
sequence_id!(
    /// Identifier of a tag row.
    TagId
);

// ============================================================================
// Quality
// ============================================================================

/// Maturity level a publisher declares for a notebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Quality {
    Development,
    Beta,
    Release,
}

impl Quality {
    /// All levels, lowest first.
    pub const ALL: [Quality; 3] = [Quality::Development, Quality::Beta, Quality::Release];

    /// Canonical spelling, as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "Development",
            Self::Beta => "Beta",
            Self::Release => "Release",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|q| q.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ValueError::InvalidQuality(s.to_string()))
    }
}

impl TryFrom<String> for Quality {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ============================================================================
// Identity
// ============================================================================

/// The authenticated caller of a request.
///
/// `admin` is resolved by the server on every request, never trusted from a
/// token alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub username: Username,
    pub admin: bool,
}

impl Identity {
    pub fn new(username: Username, admin: bool) -> Self {
        Self { username, admin }
    }

    /// True when this caller is the given user.
    pub fn is(&self, user: &Username) -> bool {
        &self.username == user
    }
}

// ============================================================================
// Tests
// ============================================================================
