use crate::domain::entity::{CanonicalKey, ProviderId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider calls are dispatched per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    Usage,
    Matchup,
    Health,
    GameScript,
    Depth,
    Market,
    Projection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    SnapShare,
    TargetShare,
    RouteParticipation,
    /// Fantasy points the opponent allows to the position, relative to league average.
    MatchupDelta,
    Opponent,
    HealthStatus,
    /// Positive when the entity's team is favored.
    PointSpread,
    GameTotal,
    Pace,
    DepthChartRank,
    StarterAheadOut,
    /// Week number the entity's team is idle.
    ByeWeek,
    OwnershipPct,
    OwnershipTrend,
    ProjectedPoints,
    ProjectedFloor,
    ProjectedCeiling,
    RestOfSeasonPoints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Flag,
    Health,
    Text,
}

impl Field {
    pub const ALL: [Field; 18] = [
        Field::SnapShare,
        Field::TargetShare,
        Field::RouteParticipation,
        Field::MatchupDelta,
        Field::Opponent,
        Field::HealthStatus,
        Field::PointSpread,
        Field::GameTotal,
        Field::Pace,
        Field::DepthChartRank,
        Field::StarterAheadOut,
        Field::ByeWeek,
        Field::OwnershipPct,
        Field::OwnershipTrend,
        Field::ProjectedPoints,
        Field::ProjectedFloor,
        Field::ProjectedCeiling,
        Field::RestOfSeasonPoints,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }

    pub fn group(self) -> FieldGroup {
        match self {
            Field::SnapShare | Field::TargetShare | Field::RouteParticipation => FieldGroup::Usage,
            Field::MatchupDelta | Field::Opponent => FieldGroup::Matchup,
            Field::HealthStatus => FieldGroup::Health,
            Field::PointSpread | Field::GameTotal | Field::Pace => FieldGroup::GameScript,
            Field::DepthChartRank | Field::StarterAheadOut | Field::ByeWeek => FieldGroup::Depth,
            Field::OwnershipPct | Field::OwnershipTrend => FieldGroup::Market,
            Field::ProjectedPoints
            | Field::ProjectedFloor
            | Field::ProjectedCeiling
            | Field::RestOfSeasonPoints => FieldGroup::Projection,
        }
    }

    pub fn kind(self) -> ValueKind {
        match self {
            Field::HealthStatus => ValueKind::Health,
            Field::Opponent => ValueKind::Text,
            Field::StarterAheadOut => ValueKind::Flag,
            _ => ValueKind::Number,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Field::SnapShare => "snap_share",
            Field::TargetShare => "target_share",
            Field::RouteParticipation => "route_participation",
            Field::MatchupDelta => "matchup_delta",
            Field::Opponent => "opponent",
            Field::HealthStatus => "health_status",
            Field::PointSpread => "point_spread",
            Field::GameTotal => "game_total",
            Field::Pace => "pace",
            Field::DepthChartRank => "depth_chart_rank",
            Field::StarterAheadOut => "starter_ahead_out",
            Field::ByeWeek => "bye_week",
            Field::OwnershipPct => "ownership_pct",
            Field::OwnershipTrend => "ownership_trend",
            Field::ProjectedPoints => "projected_points",
            Field::ProjectedFloor => "projected_floor",
            Field::ProjectedCeiling => "projected_ceiling",
            Field::RestOfSeasonPoints => "rest_of_season_points",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Active,
    Questionable,
    Doubtful,
    Out,
}

impl HealthStatus {
    /// Accepts full words in any case plus the usual injury-report designations.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" | "HEALTHY" | "A" => Some(Self::Active),
            "QUESTIONABLE" | "Q" | "GTD" => Some(Self::Questionable),
            "DOUBTFUL" | "D" => Some(Self::Doubtful),
            "OUT" | "O" | "IR" | "PUP" | "SUSP" | "SUSPENDED" | "NA" => Some(Self::Out),
            _ => None,
        }
    }
}

/// Untagged for serialization; provider input is decoded per field with [`FieldValue::decode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Flag(bool),
    Health(HealthStatus),
    Text(String),
}

impl FieldValue {
    /// Decodes a raw provider value as the kind `field` expects. Numeric strings count as numbers.
    pub fn decode(field: Field, raw: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;
        match (field.kind(), raw) {
            (ValueKind::Number, Value::Number(n)) => n.as_f64().map(Self::Number),
            (ValueKind::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Self::Number),
            (ValueKind::Flag, Value::Bool(b)) => Some(Self::Flag(*b)),
            (ValueKind::Health, Value::String(s)) => HealthStatus::parse(s).map(Self::Health),
            (ValueKind::Text, Value::String(s)) if !s.trim().is_empty() => {
                Some(Self::Text(s.trim().to_string()))
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Number(_) => ValueKind::Number,
            Self::Flag(_) => ValueKind::Flag,
            Self::Health(_) => ValueKind::Health,
            Self::Text(_) => ValueKind::Text,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_health(&self) -> Option<HealthStatus> {
        match self {
            Self::Health(h) => Some(*h),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One immutable, timestamped, sourced data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldObservation {
    pub seq: u64,
    pub entity: CanonicalKey,
    pub field: Field,
    pub value: FieldValue,
    pub source: ProviderId,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    Fresh,
    Stale,
    Missing,
}

/// Best available reading of one field for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FieldReading {
    Observed {
        observation: FieldObservation,
        stale: bool,
    },
    Missing,
}

impl FieldReading {
    pub fn status(&self) -> FieldStatus {
        match self {
            Self::Observed { stale: false, .. } => FieldStatus::Fresh,
            Self::Observed { stale: true, .. } => FieldStatus::Stale,
            Self::Missing => FieldStatus::Missing,
        }
    }

    pub fn value(&self) -> Option<&FieldValue> {
        match self {
            Self::Observed { observation, .. } => Some(&observation.value),
            Self::Missing => None,
        }
    }
}
