//! Static advisor configuration, loaded once at process start.
//!
//! Every tunable lives here with its default declared in [`AdvisorConfig::default`]. A config that
//! fails [`AdvisorConfig::validate`] is fatal at start.

use crate::domain::entity::{CanonicalKey, Position, ProviderId};
use crate::domain::observation::{Field, FieldGroup, HealthStatus};
use crate::domain::recommendation::Signal;
use crate::error::CoreError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Weights of the six heuristic signals. Must be non-increasing in declared priority order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalWeights {
    pub usage: f64,
    pub matchup: f64,
    pub health: f64,
    pub game_script: f64,
    pub contingency: f64,
    pub horizon: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            usage: 0.30,
            matchup: 0.22,
            health: 0.20,
            game_script: 0.13,
            contingency: 0.10,
            horizon: 0.05,
        }
    }
}

impl SignalWeights {
    pub fn get(&self, signal: Signal) -> f64 {
        match signal {
            Signal::Usage => self.usage,
            Signal::Matchup => self.matchup,
            Signal::Health => self.health,
            Signal::GameScript => self.game_script,
            Signal::Contingency => self.contingency,
            Signal::Horizon => self.horizon,
        }
    }

    pub fn total(&self) -> f64 {
        Signal::PRIORITY.iter().map(|s| self.get(*s)).sum()
    }
}

/// Signal value (in [-1, 0]) per health status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthPenalties {
    pub active: f64,
    pub questionable: f64,
    pub doubtful: f64,
    pub out: f64,
}

impl Default for HealthPenalties {
    fn default() -> Self {
        Self {
            active: 0.0,
            questionable: -0.25,
            doubtful: -0.6,
            out: -1.0,
        }
    }
}

impl HealthPenalties {
    pub fn get(&self, status: HealthStatus) -> f64 {
        match status {
            HealthStatus::Active => self.active,
            HealthStatus::Questionable => self.questionable,
            HealthStatus::Doubtful => self.doubtful,
            HealthStatus::Out => self.out,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub id: ProviderId,
    pub base_url: String,
    #[serde(default = "default_provider_path")]
    pub path: String,
    /// Name of the env var holding the API key, if the provider needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub coverage: Vec<FieldGroup>,
    #[serde(default = "default_provider_retries")]
    pub retries: u32,
}

fn default_provider_path() -> String {
    "/v1/observations".to_string()
}

fn default_provider_retries() -> u32 {
    2
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossReferenceEntry {
    pub key: CanonicalKey,
    pub name: String,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub aliases: BTreeMap<ProviderId, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Earlier entries win timestamp ties.
    pub provider_priority: Vec<ProviderId>,
    pub staleness_secs: BTreeMap<Field, u64>,
    pub favorite_spread_threshold: f64,
    pub chaos_deficit_threshold: f64,
    /// Scores within this many points are near-equal for tie-break purposes.
    pub near_equal_band: f64,
    pub horizon_switch_date: NaiveDate,
    pub season_start_date: NaiveDate,
    pub weights: SignalWeights,
    pub health_penalties: HealthPenalties,
    /// Projection used, and labelled as an estimate, when no provider supplies one.
    pub position_baselines: BTreeMap<Position, f64>,
    /// Composite signal of +1 scales the projection by `1 + signal_scale`.
    pub signal_scale: f64,
    /// Floor/ceiling half-width as a fraction of the median when providers omit them.
    pub default_spread_ratio: f64,
    pub provider_timeout_ms: u64,
    pub request_deadline_ms: u64,
    pub providers: Vec<ProviderEndpoint>,
    pub cross_reference: Vec<CrossReferenceEntry>,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        let staleness_secs = Field::ALL
            .iter()
            .map(|f| (*f, default_staleness_secs(*f)))
            .collect();

        let position_baselines = [
            (Position::Qb, 16.0),
            (Position::Rb, 10.0),
            (Position::Wr, 10.0),
            (Position::Te, 7.0),
            (Position::K, 7.0),
            (Position::Def, 6.0),
        ]
        .into_iter()
        .collect();

        Self {
            provider_priority: vec![ProviderId::new("primary"), ProviderId::new("secondary")],
            staleness_secs,
            favorite_spread_threshold: 10.0,
            chaos_deficit_threshold: 12.0,
            near_equal_band: 1.0,
            horizon_switch_date: NaiveDate::from_ymd_opt(2026, 12, 1).unwrap_or_default(),
            season_start_date: NaiveDate::from_ymd_opt(2026, 9, 8).unwrap_or_default(),
            weights: SignalWeights::default(),
            health_penalties: HealthPenalties::default(),
            position_baselines,
            signal_scale: 0.5,
            default_spread_ratio: 0.4,
            provider_timeout_ms: 4_000,
            request_deadline_ms: 10_000,
            providers: Vec::new(),
            cross_reference: Vec::new(),
        }
    }
}

/// Injury status goes stale in minutes; season-long usage tolerates hours.
fn default_staleness_secs(field: Field) -> u64 {
    match field.group() {
        FieldGroup::Health => 15 * 60,
        FieldGroup::GameScript => 60 * 60,
        FieldGroup::Depth | FieldGroup::Market | FieldGroup::Projection => 6 * 60 * 60,
        FieldGroup::Usage => 12 * 60 * 60,
        FieldGroup::Matchup => 24 * 60 * 60,
    }
}

impl AdvisorConfig {
    pub fn from_json_str(s: &str) -> Result<Self, CoreError> {
        let config: Self = serde_json::from_str(s)
            .map_err(|e| CoreError::Configuration(format!("invalid advisor config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let bad = |msg: String| Err(CoreError::Configuration(msg));

        if self.provider_priority.is_empty() {
            return bad("provider_priority must name at least one provider".to_string());
        }
        let mut seen = BTreeSet::new();
        for p in &self.provider_priority {
            if !seen.insert(p) {
                return bad(format!("provider_priority lists {p} twice"));
            }
        }
        for endpoint in &self.providers {
            if !seen.contains(&endpoint.id) {
                return bad(format!(
                    "provider {} is configured but missing from provider_priority",
                    endpoint.id
                ));
            }
            if endpoint.coverage.is_empty() {
                return bad(format!("provider {} covers no field groups", endpoint.id));
            }
            if endpoint.base_url.trim().is_empty() {
                return bad(format!("provider {} has an empty base_url", endpoint.id));
            }
        }

        for field in Field::ALL {
            match self.staleness_secs.get(&field) {
                Some(0) => return bad(format!("staleness threshold for {field} must be > 0")),
                Some(_) => {}
                None => return bad(format!("staleness threshold for {field} is not configured")),
            }
        }

        for (name, v) in [
            ("favorite_spread_threshold", self.favorite_spread_threshold),
            ("chaos_deficit_threshold", self.chaos_deficit_threshold),
            ("signal_scale", self.signal_scale),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return bad(format!("{name} must be a positive number (got {v})"));
            }
        }
        if !self.near_equal_band.is_finite() || self.near_equal_band < 0.0 {
            return bad(format!(
                "near_equal_band must be non-negative (got {})",
                self.near_equal_band
            ));
        }
        if !(0.0..1.0).contains(&self.default_spread_ratio) {
            return bad(format!(
                "default_spread_ratio must be in [0, 1) (got {})",
                self.default_spread_ratio
            ));
        }

        let mut prev = f64::INFINITY;
        for signal in Signal::PRIORITY {
            let w = self.weights.get(signal);
            if !w.is_finite() || w < 0.0 {
                return bad(format!("weight for {signal:?} must be non-negative (got {w})"));
            }
            if w > prev {
                return bad(format!(
                    "weight for {signal:?} ({w}) exceeds a higher-priority signal ({prev})"
                ));
            }
            prev = w;
        }
        if self.weights.total() <= 0.0 {
            return bad("signal weights must not all be zero".to_string());
        }

        let p = self.health_penalties;
        let ordered = p.active <= 0.0
            && p.active >= p.questionable
            && p.questionable >= p.doubtful
            && p.doubtful >= p.out
            && p.out >= -1.0;
        if !ordered {
            return bad(
                "health_penalties must satisfy 0 >= active >= questionable >= doubtful >= out >= -1"
                    .to_string(),
            );
        }

        for (pos, v) in &self.position_baselines {
            if !v.is_finite() || *v < 0.0 {
                return bad(format!("baseline for {pos:?} must be non-negative (got {v})"));
            }
        }

        if self.provider_timeout_ms == 0 {
            return bad("provider_timeout_ms must be > 0".to_string());
        }
        if self.request_deadline_ms < self.provider_timeout_ms {
            return bad(format!(
                "request_deadline_ms ({}) must be >= provider_timeout_ms ({})",
                self.request_deadline_ms, self.provider_timeout_ms
            ));
        }
        if self.horizon_switch_date <= self.season_start_date {
            return bad("horizon_switch_date must fall after season_start_date".to_string());
        }

        Ok(())
    }

    pub fn staleness_threshold(&self, field: Field) -> chrono::Duration {
        let secs = self
            .staleness_secs
            .get(&field)
            .copied()
            .unwrap_or_else(|| default_staleness_secs(field));
        chrono::Duration::seconds(secs as i64)
    }

    pub fn baseline_for(&self, position: Option<Position>) -> f64 {
        position
            .and_then(|p| self.position_baselines.get(&p).copied())
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_config_is_valid() {
        AdvisorConfig::default().validate().unwrap();
    }

    #[test]
    fn health_is_stale_sooner_than_usage() {
        let c = AdvisorConfig::default();
        assert!(c.staleness_threshold(Field::HealthStatus) < c.staleness_threshold(Field::SnapShare));
    }

    #[test]
    fn partial_json_keeps_declared_defaults() {
        let c = AdvisorConfig::from_json_str(
            &json!({
                "provider_priority": ["sleeper", "yahoo"],
                "chaos_deficit_threshold": 15.0
            })
            .to_string(),
        )
        .unwrap();
        assert_eq!(c.provider_priority[0], ProviderId::new("sleeper"));
        assert_eq!(c.chaos_deficit_threshold, 15.0);
        assert_eq!(c.favorite_spread_threshold, 10.0);
    }

    #[test]
    fn rejects_weights_out_of_priority_order() {
        let mut c = AdvisorConfig::default();
        c.weights.horizon = 0.5;
        let err = c.validate().unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[test]
    fn rejects_duplicate_priority_and_unknown_endpoint() {
        let mut c = AdvisorConfig::default();
        c.provider_priority.push(ProviderId::new("primary"));
        assert!(c.validate().is_err());

        let mut c = AdvisorConfig::default();
        c.providers.push(ProviderEndpoint {
            id: ProviderId::new("espn"),
            base_url: "https://example.test".to_string(),
            path: default_provider_path(),
            api_key_env: None,
            coverage: vec![FieldGroup::Health],
            retries: 1,
        });
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_zero_staleness_and_short_deadline() {
        let mut c = AdvisorConfig::default();
        c.staleness_secs.insert(Field::HealthStatus, 0);
        assert!(c.validate().is_err());

        let mut c = AdvisorConfig::default();
        c.request_deadline_ms = c.provider_timeout_ms - 1;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        let err = AdvisorConfig::from_json_str("{ not json").unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }
}
