use crate::domain::entity::{CanonicalKey, Position};
use crate::domain::observation::Field;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    StartSit,
    Waiver,
    Trade,
}

impl DecisionType {
    /// Fields whose absence degrades the request.
    pub fn required_fields(self) -> &'static [Field] {
        match self {
            DecisionType::StartSit => &[
                Field::SnapShare,
                Field::TargetShare,
                Field::MatchupDelta,
                Field::HealthStatus,
                Field::ProjectedPoints,
            ],
            DecisionType::Waiver => &[
                Field::OwnershipPct,
                Field::OwnershipTrend,
                Field::SnapShare,
                Field::HealthStatus,
            ],
            DecisionType::Trade => &[
                Field::SnapShare,
                Field::TargetShare,
                Field::HealthStatus,
                Field::RestOfSeasonPoints,
            ],
        }
    }

    /// Fields fetched when available; missing ones contribute a neutral signal.
    pub fn supporting_fields(self) -> &'static [Field] {
        match self {
            DecisionType::StartSit => &[
                Field::RouteParticipation,
                Field::Opponent,
                Field::PointSpread,
                Field::GameTotal,
                Field::Pace,
                Field::DepthChartRank,
                Field::StarterAheadOut,
                Field::ByeWeek,
                Field::ProjectedFloor,
                Field::ProjectedCeiling,
                Field::RestOfSeasonPoints,
            ],
            DecisionType::Waiver => &[
                Field::TargetShare,
                Field::RouteParticipation,
                Field::MatchupDelta,
                Field::DepthChartRank,
                Field::StarterAheadOut,
                Field::ProjectedPoints,
                Field::ProjectedFloor,
                Field::ProjectedCeiling,
                Field::RestOfSeasonPoints,
            ],
            DecisionType::Trade => &[
                Field::RouteParticipation,
                Field::MatchupDelta,
                Field::DepthChartRank,
                Field::StarterAheadOut,
                Field::ProjectedPoints,
                Field::ProjectedFloor,
                Field::ProjectedCeiling,
            ],
        }
    }

    pub fn wanted_fields(self) -> Vec<Field> {
        let mut out: Vec<Field> = self.required_fields().to_vec();
        out.extend_from_slice(self.supporting_fields());
        out.sort();
        out.dedup();
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    Entities { keys: Vec<CanonicalKey> },
    Roster { team_key: String },
    FreeAgents { position: Option<Position> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringFormat {
    Standard,
    HalfPpr,
    #[default]
    Ppr,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeagueRules {
    #[serde(default)]
    pub scoring: ScoringFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeProposal {
    pub give: Vec<CanonicalKey>,
    pub receive: Vec<CanonicalKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionContext {
    pub as_of: DateTime<Utc>,
    /// Resolved from the season calendar when absent.
    #[serde(default)]
    pub week: Option<u32>,
    /// Projected fantasy margin of the user's lineup against this week's opponent.
    /// Positive means favored.
    #[serde(default)]
    pub projected_margin: Option<f64>,
    /// Overrides the configured horizon switch date.
    #[serde(default)]
    pub late_season: Option<bool>,
    #[serde(default)]
    pub lineup_slots: Option<usize>,
    #[serde(default)]
    pub max_adds: Option<usize>,
    #[serde(default)]
    pub trade: Option<TradeProposal>,
    #[serde(default)]
    pub league: LeagueRules,
}

impl DecisionContext {
    pub fn new(as_of: DateTime<Utc>) -> Self {
        Self {
            as_of,
            week: None,
            projected_margin: None,
            late_season: None,
            lineup_slots: None,
            max_adds: None,
            trade: None,
            league: LeagueRules::default(),
        }
    }
}

/// Immutable once issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub scope: Scope,
    pub decision: DecisionType,
    pub context: DecisionContext,
}

impl RecommendationRequest {
    pub fn new(scope: Scope, decision: DecisionType, context: DecisionContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope,
            decision,
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_and_supporting_fields_do_not_overlap() {
        for decision in [DecisionType::StartSit, DecisionType::Waiver, DecisionType::Trade] {
            for f in decision.supporting_fields() {
                assert!(
                    !decision.required_fields().contains(f),
                    "{f} listed twice for {decision:?}"
                );
            }
        }
    }

    #[test]
    fn parses_request_with_defaults() {
        let req: RecommendationRequest = serde_json::from_value(json!({
            "scope": {"kind": "roster", "team_key": "461.l.1234.t.5"},
            "decision": "start_sit",
            "context": {"as_of": "2026-10-16T12:00:00Z", "projected_margin": -15.0}
        }))
        .unwrap();

        assert_eq!(req.decision, DecisionType::StartSit);
        assert_eq!(req.context.projected_margin, Some(-15.0));
        assert_eq!(req.context.league.scoring, ScoringFormat::Ppr);
        assert!(req.context.week.is_none());
    }
}
