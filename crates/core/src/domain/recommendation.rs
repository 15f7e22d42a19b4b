use crate::aggregate::DegradationReport;
use crate::domain::entity::CanonicalKey;
use crate::domain::observation::Field;
use crate::domain::request::DecisionType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Heuristic signals in declared priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Usage,
    Matchup,
    Health,
    GameScript,
    Contingency,
    Horizon,
}

impl Signal {
    pub const PRIORITY: [Signal; 6] = [
        Signal::Usage,
        Signal::Matchup,
        Signal::Health,
        Signal::GameScript,
        Signal::Contingency,
        Signal::Horizon,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Usage => "usage",
            Signal::Matchup => "matchup",
            Signal::Health => "health",
            Signal::GameScript => "game_script",
            Signal::Contingency => "contingency",
            Signal::Horizon => "horizon",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub floor: f64,
    pub median: f64,
    pub ceiling: f64,
}

impl ScoreComponents {
    pub fn spread(&self) -> f64 {
        self.ceiling - self.floor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

/// How much of a recommendation rests on live data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataConfidence {
    Live,
    Stale,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Start,
    Sit,
    Add,
    Pass,
    Acquire,
    Send,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalContribution {
    pub signal: Signal,
    /// Normalized to [-1, 1].
    pub value: f64,
    pub weight: f64,
    pub observed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub rank: u32,
    pub entity: CanonicalKey,
    pub name: String,
    pub decision: DecisionType,
    pub verdict: Verdict,
    pub score: ScoreComponents,
    pub signals: Vec<SignalContribution>,
    pub risk: RiskBand,
    pub rationale: String,
    pub confidence: DataConfidence,
    pub estimated_fields: Vec<Field>,
    /// Chaos-play alternative.
    pub high_variance: bool,
    pub correlated_with: Option<CanonicalKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeVerdict {
    Accept,
    Decline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSummary {
    pub give_value: f64,
    pub receive_value: f64,
    pub net: f64,
    pub verdict: TradeVerdict,
    pub confidence: DataConfidence,
}

pub const LIVE_DATA_CONFIRMATION: &str = "All required data was fetched live for this request.";
pub const FALLBACK_WARNING: &str =
    "Some required data is stale or missing; affected figures are estimates, not live observations.";

/// User-facing disclosure. The front-end renders `message` verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Disclosure {
    LiveData {
        message: String,
    },
    FallbackWarning {
        message: String,
        stale: Vec<(CanonicalKey, Field)>,
        missing: Vec<(CanonicalKey, Field)>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub request_id: Uuid,
    pub decision: DecisionType,
    pub recommendations: Vec<Recommendation>,
    pub trade: Option<TradeSummary>,
    pub report: DegradationReport,
    pub disclosure: Disclosure,
}
