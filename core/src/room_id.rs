use std::fmt;

pub const ROOM_ID_LEN: usize = 10;
pub const ROOM_ID_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
pub const DEFAULT_ROOM_PATH_PREFIX: &str = "/ws/";

pub fn is_valid_room_id(value: &str) -> bool {
    RoomId::parse(value).is_ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

impl RoomId {
    pub fn parse(value: &str) -> Result<Self, RoomIdError> {
        let found = value.chars().count();
        if found != ROOM_ID_LEN {
            return Err(RoomIdError::InvalidLength {
                expected: ROOM_ID_LEN,
                found,
            });
        }
        if let Some((index, ch)) = value
            .chars()
            .enumerate()
            .find(|(_, ch)| !ROOM_ID_ALPHABET.contains(*ch))
        {
            return Err(RoomIdError::InvalidCharacter { ch, index });
        }
        Ok(Self(value.to_string()))
    }

    /// Room id from a request path such as `/ws/AbCdEfGh12`.
    pub fn from_path(path: &str, prefix: &str) -> Result<Self, RoomIdError> {
        let rest = path.strip_prefix(prefix).ok_or(RoomIdError::MissingPrefix)?;
        let rest = rest.split(['?', '#']).next().unwrap_or_default();
        if rest.contains('/') {
            return Err(RoomIdError::NestedPath);
        }
        Self::parse(rest)
    }

    pub fn join_path(&self, prefix: &str) -> String {
        format!("{}{}", normalize_path_prefix(prefix), self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Forces a leading and trailing slash; blank input falls back to `/ws/`.
pub fn normalize_path_prefix(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_ROOM_PATH_PREFIX.to_string();
    }
    let mut value = trimmed.to_string();
    if !value.starts_with('/') {
        value.insert(0, '/');
    }
    if !value.ends_with('/') {
        value.push('/');
    }
    value
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for RoomId {
    type Err = RoomIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomIdError {
    InvalidLength { expected: usize, found: usize },
    InvalidCharacter { ch: char, index: usize },
    MissingPrefix,
    NestedPath,
}

impl fmt::Display for RoomIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomIdError::InvalidLength { expected, found } => {
                write!(f, "room id must be {expected} chars, got {found}")
            }
            RoomIdError::InvalidCharacter { ch, index } => {
                write!(f, "invalid character '{ch}' at position {index}")
            }
            RoomIdError::MissingPrefix => write!(f, "path does not start with the room prefix"),
            RoomIdError::NestedPath => write!(f, "room path must not contain further segments"),
        }
    }
}

impl std::error::Error for RoomIdError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_room_from_request_path() {
        let room = RoomId::from_path("/ws/AbCdEfGh12?format=json", "/ws/").unwrap();
        assert_eq!(room.as_str(), "AbCdEfGh12");
        assert_eq!(room.join_path("ws"), "/ws/AbCdEfGh12");
        assert_eq!(
            RoomId::from_path("/rooms/AbCdEfGh12", "/ws/"),
            Err(RoomIdError::MissingPrefix)
        );
        assert_eq!(
            RoomId::from_path("/ws/AbCdEfGh12/x", "/ws/"),
            Err(RoomIdError::NestedPath)
        );
    }

    #[test]
    fn rejects_bad_length_and_alphabet() {
        assert!(matches!(
            RoomId::parse("short"),
            Err(RoomIdError::InvalidLength { found: 5, .. })
        ));
        assert_eq!(
            RoomId::parse("AbCdEfGh1-"),
            Err(RoomIdError::InvalidCharacter { ch: '-', index: 9 })
        );
        assert!(is_valid_room_id("0123456789"));
    }

    #[test]
    fn normalizes_prefixes() {
        assert_eq!(normalize_path_prefix(""), "/ws/");
        assert_eq!(normalize_path_prefix("rooms"), "/rooms/");
        assert_eq!(normalize_path_prefix("/rooms/"), "/rooms/");
    }
}
