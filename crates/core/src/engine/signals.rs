//! The six heuristic signals, each a scoring function onto a shared `[-1, 1]` scale.
//!
//! A function returns `None` when its inputs are absent; the signal then contributes a neutral
//! zero and is reported as unobserved.

use crate::aggregate::AggregatedEntityView;
use crate::domain::observation::Field;
use crate::domain::recommendation::{Signal, SignalContribution};
use crate::domain::request::{DecisionType, ScoringFormat};
use crate::policy::AdvisorConfig;

/// Target share at which the target component of usage saturates.
const TARGET_SHARE_CEILING: f64 = 0.30;
/// Matchup delta (points allowed vs. league average) that maps to a full signal.
const MATCHUP_SCALE: f64 = 10.0;
const LEAGUE_AVG_IMPLIED_TOTAL: f64 = 22.0;
const LEAGUE_AVG_GAME_TOTAL: f64 = 44.0;
const IMPLIED_TOTAL_SCALE: f64 = 10.0;
const PACE_WEIGHT: f64 = 0.2;
const DEPTH_STEP_PENALTY: f64 = 0.25;

pub struct SignalInput<'a> {
    pub view: &'a AggregatedEntityView,
    pub config: &'a AdvisorConfig,
    pub decision: DecisionType,
    pub scoring: ScoringFormat,
    pub late_season: bool,
    /// Weekly median before signal adjustment.
    pub base_median: f64,
}

pub type ScoringFn = fn(&SignalInput<'_>) -> Option<f64>;

/// Applied in declared priority order.
pub const SCORERS: [(Signal, ScoringFn); 6] = [
    (Signal::Usage, usage),
    (Signal::Matchup, matchup),
    (Signal::Health, health),
    (Signal::GameScript, game_script),
    (Signal::Contingency, contingency),
    (Signal::Horizon, horizon),
];

pub fn evaluate(input: &SignalInput<'_>) -> Vec<SignalContribution> {
    SCORERS
        .iter()
        .map(|(signal, score)| {
            let value = score(input).filter(|v| v.is_finite());
            SignalContribution {
                signal: *signal,
                value: value.map_or(0.0, clamp_unit),
                weight: input.config.weights.get(*signal),
                observed: value.is_some(),
            }
        })
        .collect()
}

/// Weighted mean of contributions, in `[-1, 1]`.
pub fn composite(contributions: &[SignalContribution]) -> f64 {
    let total: f64 = contributions.iter().map(|c| c.weight).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let sum: f64 = contributions.iter().map(|c| c.weight * c.value).sum();
    clamp_unit(sum / total)
}

fn clamp_unit(v: f64) -> f64 {
    v.clamp(-1.0, 1.0)
}

fn target_portion(scoring: ScoringFormat) -> f64 {
    match scoring {
        ScoringFormat::Standard => 0.3,
        ScoringFormat::HalfPpr => 0.4,
        ScoringFormat::Ppr => 0.5,
    }
}

fn usage(input: &SignalInput<'_>) -> Option<f64> {
    let view = input.view;
    let snaps = view
        .number(Field::SnapShare)
        .or_else(|| view.number(Field::RouteParticipation))
        .map(|v| v.clamp(0.0, 1.0));
    let targets = view
        .number(Field::TargetShare)
        .map(|v| (v / TARGET_SHARE_CEILING).clamp(0.0, 1.0));

    let share = match (snaps, targets) {
        (Some(s), Some(t)) => {
            let tp = target_portion(input.scoring);
            (1.0 - tp) * s + tp * t
        }
        (Some(s), None) => s,
        (None, Some(t)) => t,
        (None, None) => return None,
    };
    Some(2.0 * share - 1.0)
}

fn matchup(input: &SignalInput<'_>) -> Option<f64> {
    input
        .view
        .number(Field::MatchupDelta)
        .map(|d| d / MATCHUP_SCALE)
}

fn health(input: &SignalInput<'_>) -> Option<f64> {
    input
        .view
        .value(Field::HealthStatus)
        .and_then(|v| v.as_health())
        .map(|h| input.config.health_penalties.get(h))
}

fn game_script(input: &SignalInput<'_>) -> Option<f64> {
    let view = input.view;
    let spread = view.number(Field::PointSpread);
    let total = view.number(Field::GameTotal);
    if spread.is_none() && total.is_none() {
        return None;
    }

    let implied = total.unwrap_or(LEAGUE_AVG_GAME_TOTAL) / 2.0 + spread.unwrap_or(0.0) / 2.0;
    let mut signal = (implied - LEAGUE_AVG_IMPLIED_TOTAL) / IMPLIED_TOTAL_SCALE;
    // Pace is a ratio to league average plays per game.
    if let Some(pace) = view.number(Field::Pace) {
        signal += PACE_WEIGHT * (pace - 1.0).clamp(-1.0, 1.0);
    }
    Some(signal)
}

fn contingency(input: &SignalInput<'_>) -> Option<f64> {
    let view = input.view;
    if view
        .value(Field::StarterAheadOut)
        .and_then(|v| v.as_flag())
        .unwrap_or(false)
    {
        return Some(1.0);
    }
    let rank = view.number(Field::DepthChartRank)?;
    if rank <= 1.0 {
        Some(0.0)
    } else {
        Some(-DEPTH_STEP_PENALTY * (rank - 1.0))
    }
}

/// Rest-of-season value relative to this week, weighted by how forward-looking the decision is.
fn horizon(input: &SignalInput<'_>) -> Option<f64> {
    let ros = input.view.number(Field::RestOfSeasonPoints)?;
    let forward = if input.late_season {
        0.0
    } else {
        match input.decision {
            DecisionType::StartSit => 0.25,
            DecisionType::Waiver | DecisionType::Trade => 1.0,
        }
    };
    let rel = (ros - input.base_median) / input.base_median.max(1.0);
    Some(clamp_unit(rel) * forward)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{CanonicalKey, Entity, ProviderId};
    use crate::domain::observation::{FieldObservation, FieldReading, FieldValue, HealthStatus};
    use crate::testutil::ts;
    use std::collections::BTreeMap;

    fn view(fields: &[(Field, FieldValue)]) -> AggregatedEntityView {
        let key = CanonicalKey::new("casey-example");
        let fields = fields
            .iter()
            .enumerate()
            .map(|(i, (f, v))| {
                let reading = FieldReading::Observed {
                    observation: FieldObservation {
                        seq: i as u64,
                        entity: key.clone(),
                        field: *f,
                        value: v.clone(),
                        source: ProviderId::new("p1"),
                        fetched_at: ts(11, 0),
                    },
                    stale: false,
                };
                (*f, reading)
            })
            .collect::<BTreeMap<_, _>>();
        AggregatedEntityView {
            entity: Entity::placeholder(key),
            fields,
        }
    }

    fn input<'a>(view: &'a AggregatedEntityView, config: &'a AdvisorConfig) -> SignalInput<'a> {
        SignalInput {
            view,
            config,
            decision: DecisionType::StartSit,
            scoring: ScoringFormat::Ppr,
            late_season: false,
            base_median: 12.0,
        }
    }

    #[test]
    fn scorers_follow_declared_priority() {
        let order: Vec<Signal> = SCORERS.iter().map(|(s, _)| *s).collect();
        assert_eq!(order, Signal::PRIORITY.to_vec());
    }

    #[test]
    fn missing_inputs_are_neutral_and_unobserved() {
        let config = AdvisorConfig::default();
        let v = view(&[]);
        let contributions = evaluate(&input(&v, &config));
        assert_eq!(contributions.len(), 6);
        assert!(contributions.iter().all(|c| !c.observed && c.value == 0.0));
        assert_eq!(composite(&contributions), 0.0);
    }

    #[test]
    fn usage_weights_targets_by_scoring_format() {
        let config = AdvisorConfig::default();
        let v = view(&[
            (Field::SnapShare, FieldValue::Number(0.5)),
            (Field::TargetShare, FieldValue::Number(0.3)),
        ]);
        let mut i = input(&v, &config);
        let ppr = usage(&i).unwrap();
        i.scoring = ScoringFormat::Standard;
        let standard = usage(&i).unwrap();
        assert!(ppr > standard);
        assert!((ppr - 0.5).abs() < 1e-9);
    }

    #[test]
    fn health_uses_configured_penalties() {
        let config = AdvisorConfig::default();
        let v = view(&[(Field::HealthStatus, FieldValue::Health(HealthStatus::Doubtful))]);
        assert_eq!(health(&input(&v, &config)), Some(-0.6));
    }

    #[test]
    fn game_script_rewards_high_implied_totals() {
        let config = AdvisorConfig::default();
        let shootout = view(&[
            (Field::GameTotal, FieldValue::Number(52.0)),
            (Field::PointSpread, FieldValue::Number(3.0)),
        ]);
        let slog = view(&[
            (Field::GameTotal, FieldValue::Number(38.0)),
            (Field::PointSpread, FieldValue::Number(-6.0)),
        ]);
        assert!(game_script(&input(&shootout, &config)).unwrap() > 0.0);
        assert!(game_script(&input(&slog, &config)).unwrap() < 0.0);
    }

    #[test]
    fn contingency_prefers_handcuff_with_starter_out() {
        let config = AdvisorConfig::default();
        let handcuff = view(&[
            (Field::DepthChartRank, FieldValue::Number(2.0)),
            (Field::StarterAheadOut, FieldValue::Flag(true)),
        ]);
        let backup = view(&[(Field::DepthChartRank, FieldValue::Number(3.0))]);
        assert_eq!(contingency(&input(&handcuff, &config)), Some(1.0));
        assert_eq!(contingency(&input(&backup, &config)), Some(-0.5));
    }

    #[test]
    fn horizon_is_ignored_late_in_season() {
        let config = AdvisorConfig::default();
        let v = view(&[(Field::RestOfSeasonPoints, FieldValue::Number(18.0))]);
        let mut i = input(&v, &config);
        i.decision = DecisionType::Trade;
        assert!((horizon(&i).unwrap() - 0.5).abs() < 1e-9);
        i.late_season = true;
        assert_eq!(horizon(&i), Some(0.0));
    }

    #[test]
    fn contributions_are_clamped() {
        let config = AdvisorConfig::default();
        let v = view(&[(Field::MatchupDelta, FieldValue::Number(40.0))]);
        let contributions = evaluate(&input(&v, &config));
        let m = contributions
            .iter()
            .find(|c| c.signal == Signal::Matchup)
            .unwrap();
        assert_eq!(m.value, 1.0);
        assert!(m.observed);
    }
}
