use crate::domain::entity::{CanonicalKey, ProviderId};
use crate::domain::observation::Field;
use thiserror::Error;

/// Failure of a single provider call. Absorbed into the degradation report, never raised to the
/// caller of `recommend`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("timed out")]
    Timeout,
    #[error("unauthorized")]
    Unauthorized,
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("cancelled by request deadline")]
    Cancelled,
}

impl ProviderError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Unauthorized => "unauthorized",
            Self::Malformed(_) => "malformed",
            Self::Transport(_) => "transport",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoreError {
    #[error(
        "ambiguous entity '{raw_name}' (provider={provider}, id={raw_id}): candidates {candidates:?}"
    )]
    AmbiguousEntity {
        provider: ProviderId,
        raw_id: String,
        raw_name: String,
        candidates: Vec<CanonicalKey>,
    },

    #[error(
        "alias conflict: {provider}/{raw_id} is mapped to {existing} and cannot be re-mapped to {requested} without an override"
    )]
    AliasConflict {
        provider: ProviderId,
        raw_id: String,
        existing: CanonicalKey,
        requested: CanonicalKey,
    },

    #[error(
        "insufficient data: every required field is missing for {} entities (fields={fields:?}, providers tried={providers_tried:?}); retry later or proceed with manual estimates",
        entities.len()
    )]
    InsufficientData {
        entities: Vec<CanonicalKey>,
        fields: Vec<Field>,
        providers_tried: Vec<ProviderId>,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AmbiguousEntity { .. } => "ambiguous_entity",
            Self::AliasConflict { .. } => "alias_conflict",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Configuration(_) => "configuration",
        }
    }
}
