use std::fmt;

use rkyv::Archive;
use serde::{Deserialize, Serialize};

pub const PIECE_ID_MAX_LEN: usize = 64;

/// Connection id assigned by the relay; doubles as the participant identity.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl From<u64> for ParticipantId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct PieceId(String);

impl PieceId {
    pub fn new(value: impl Into<String>) -> Result<Self, PieceIdError> {
        let id = Self(value.into());
        id.check()?;
        Ok(id)
    }

    pub(crate) fn indexed(prefix: &str, index: usize) -> Self {
        Self(format!("{prefix}-{index}"))
    }

    pub(crate) fn named(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Ids arriving over the wire skip `new`, so decoders call this.
    pub fn check(&self) -> Result<(), PieceIdError> {
        if self.0.trim().is_empty() {
            return Err(PieceIdError::Empty);
        }
        if self.0.len() > PIECE_ID_MAX_LEN {
            return Err(PieceIdError::TooLong {
                max: PIECE_ID_MAX_LEN,
                found: self.0.len(),
            });
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for PieceId {
    type Err = PieceIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::new(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PieceIdError {
    #[error("piece id is empty")]
    Empty,
    #[error("piece id must be at most {max} bytes, got {found}")]
    TooLong { max: usize, found: usize },
}
