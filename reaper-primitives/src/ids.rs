//! Identifier types.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

fn validate_label(kind: &'static str, value: String) -> Result<String, Error> {
    if value.trim().is_empty() {
        return Err(Error::InvalidId {
            kind,
            value,
            reason: "must not be empty",
        });
    }
    if value.chars().any(char::is_control) {
        return Err(Error::InvalidId {
            kind,
            value,
            reason: "must not contain control characters",
        });
    }
    Ok(value)
}

/// Identifier of a single agent run (or session key standing in for one).
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(String);

impl RunId {
    /// Creates a run identifier, rejecting empty or control-bearing strings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] when validation fails.
    pub fn new(value: impl Into<String>) -> Result<Self, Error> {
        validate_label("run id", value.into()).map(Self)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RunId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RunId> for String {
    fn from(value: RunId) -> Self {
        value.0
    }
}

impl FromStr for RunId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Identifier shared by every run descended from the same session lineage.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LineageId(String);

impl LineageId {
    /// Creates a lineage identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] when the value is empty or contains control
    /// characters.
    pub fn new(value: impl Into<String>) -> Result<Self, Error> {
        validate_label("lineage id", value.into()).map(Self)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LineageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LineageId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LineageId> for String {
    fn from(value: LineageId) -> Self {
        value.0
    }
}

/// Handle for a destructive action parked until an operator confirms it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationId(Uuid);

impl ConfirmationId {
    /// Generates a random confirmation identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Display for ConfirmationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for ConfirmationId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for ConfirmationId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::parse_str(s).map_err(Error::from)?;
        Ok(Self(uuid))
    }
}
