//! Identifier newtypes shared by chat entities.
//!
//! The backend serializes identifiers inconsistently (numbers on some
//! endpoints, numeric strings on others), so every id is accepted in either
//! form and kept in its canonical string form.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

pub const TEMP_ID_PREFIX: &str = "temp-";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(String);

/// Message identifier: either assigned by the server or synthesized locally
/// for an optimistic send that has not been confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageId {
    Server(String),
    Temp(String),
}

impl UserId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

#[cfg(test)]
impl ConversationId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl MessageId {
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with(TEMP_ID_PREFIX) {
            Self::Temp(raw.to_owned())
        } else {
            Self::Server(raw.to_owned())
        }
    }

    #[cfg(test)]
    pub fn server(raw: impl fmt::Display) -> Self {
        Self::Server(raw.to_string())
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, Self::Temp(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Server(raw) | Self::Temp(raw) => raw,
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

impl RawId {
    fn into_string<E: de::Error>(self) -> Result<String, E> {
        let raw = match self {
            Self::Number(value) => value.to_string(),
            Self::Text(value) => value.trim().to_owned(),
        };

        if raw.is_empty() {
            return Err(E::custom("identifier must not be empty"));
        }

        Ok(raw)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawId::deserialize(deserializer)?.into_string().map(Self)
    }
}

impl<'de> Deserialize<'de> for ConversationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawId::deserialize(deserializer)?.into_string().map(Self)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawId::deserialize(deserializer)?.into_string::<D::Error>()?;
        Ok(Self::parse(&raw))
    }
}

impl Serialize for UserId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_canonical(&self.0, serializer)
    }
}

impl Serialize for ConversationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_canonical(&self.0, serializer)
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Server(raw) => serialize_canonical(raw, serializer),
            Self::Temp(raw) => serializer.serialize_str(raw),
        }
    }
}

/// All-digit ids go back on the wire as numbers, anything else as strings.
fn serialize_canonical<S: Serializer>(raw: &str, serializer: S) -> Result<S::Ok, S::Error> {
    match raw.parse::<u64>() {
        Ok(number) => serializer.serialize_u64(number),
        Err(_) => serializer.serialize_str(raw),
    }
}
