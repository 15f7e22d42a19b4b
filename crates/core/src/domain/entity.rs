use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider-independent identity of a decision subject.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Position {
    Qb,
    Rb,
    Wr,
    Te,
    K,
    Def,
}

impl Position {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "QB" => Some(Self::Qb),
            "RB" => Some(Self::Rb),
            "WR" => Some(Self::Wr),
            "TE" => Some(Self::Te),
            "K" => Some(Self::K),
            "DEF" | "DST" | "D/ST" => Some(Self::Def),
            _ => None,
        }
    }
}

/// A provider-specific identifier for an entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Alias {
    pub provider: ProviderId,
    pub raw_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub key: CanonicalKey,
    pub display_name: String,
    pub team: Option<String>,
    pub position: Option<Position>,
    /// Append-only.
    pub aliases: Vec<Alias>,
}

impl Entity {
    pub fn placeholder(key: CanonicalKey) -> Self {
        Self {
            display_name: key.to_string(),
            key,
            team: None,
            position: None,
            aliases: Vec::new(),
        }
    }
}
