pub mod ranking;
pub mod signals;

use crate::aggregate::{AggregatedEntityView, DegradationReport};
use crate::domain::entity::CanonicalKey;
use crate::domain::observation::{Field, FieldStatus};
use crate::domain::recommendation::{
    DataConfidence, Recommendation, RiskBand, ScoreComponents, SignalContribution, TradeSummary,
    TradeVerdict, Verdict,
};
use crate::domain::request::{DecisionContext, DecisionType, TradeProposal};
use crate::error::CoreError;
use crate::policy::AdvisorConfig;
use ranking::{Candidate, Posture};
use signals::SignalInput;
use std::sync::Arc;

const LOW_RISK_MAX_SPREAD: f64 = 0.6;
const MEDIUM_RISK_MAX_SPREAD: f64 = 1.0;

/// Everything computed for one entity before ranking.
struct Scored {
    name: String,
    score: ScoreComponents,
    signals: Vec<SignalContribution>,
    confidence: DataConfidence,
    estimated: Vec<Field>,
    stale: Vec<Field>,
    /// Set when the entity's team is idle in the request week.
    bye_week: Option<u32>,
}

pub struct HeuristicEngine {
    config: Arc<AdvisorConfig>,
}

impl HeuristicEngine {
    pub fn new(config: Arc<AdvisorConfig>) -> Self {
        Self { config }
    }

    /// Ranked recommendations, best first.
    ///
    /// Fails on unresolved ambiguity, on a malformed decision context, and when every required
    /// field of every in-scope entity is missing.
    pub fn recommend(
        &self,
        views: &[AggregatedEntityView],
        report: &DegradationReport,
        decision: DecisionType,
        context: &DecisionContext,
    ) -> Result<Vec<Recommendation>, CoreError> {
        if let Some(ambiguity) = report.ambiguities.first() {
            return Err(ambiguity.clone().into_error());
        }
        validate_context(decision, context)?;

        let required = decision.required_fields();
        let all_missing = views.iter().all(|v| {
            required
                .iter()
                .all(|f| v.reading(*f).status() == FieldStatus::Missing)
        });
        if all_missing {
            return Err(CoreError::InsufficientData {
                entities: views.iter().map(|v| v.entity.key.clone()).collect(),
                fields: required.to_vec(),
                providers_tried: report.providers_tried(),
            });
        }

        let late_season = context.late_season.unwrap_or(false);
        let scored: Vec<Scored> = views
            .iter()
            .map(|v| self.score(v, decision, context, late_season))
            .collect();
        let candidates: Vec<Candidate> = views
            .iter()
            .zip(&scored)
            .map(|(v, s)| Candidate {
                key: v.entity.key.clone(),
                team: v.entity.team.clone(),
                opponent: v
                    .value(Field::Opponent)
                    .and_then(|o| o.as_text())
                    .map(str::to_string),
                score: s.score,
            })
            .collect();

        let posture =
            Posture::from_margin(context.projected_margin, self.config.favorite_spread_threshold);
        let order = ranking::rank(
            &candidates,
            posture,
            self.config.near_equal_band,
            decision == DecisionType::StartSit,
        );

        let mut out: Vec<Recommendation> = Vec::with_capacity(order.len());
        for (pos, placement) in order.iter().enumerate() {
            let cand = &candidates[placement.index];
            let s = &scored[placement.index];
            let rank = pos as u32 + 1;
            out.push(Recommendation {
                rank,
                entity: cand.key.clone(),
                name: s.name.clone(),
                decision,
                verdict: match s.bye_week {
                    Some(_) => Verdict::Sit,
                    None => verdict(decision, context, &cand.key, pos),
                },
                score: s.score,
                signals: s.signals.clone(),
                risk: risk_band(&s.score, s.confidence),
                rationale: rationale(s, posture, placement.correlated_with.as_ref()),
                confidence: s.confidence,
                estimated_fields: s.estimated.clone(),
                high_variance: false,
                correlated_with: placement.correlated_with.clone(),
            });
        }

        let deficit = context.projected_margin.map_or(0.0, |m| -m);
        if deficit > self.config.chaos_deficit_threshold {
            if let Some(pos) = ranking::chaos_pick(&candidates, &order) {
                let rec = &mut out[pos];
                rec.high_variance = true;
                rec.rationale.push_str(&format!(
                    " High-variance alternative: projected deficit of {deficit:.1} points calls for ceiling (up to {:.1}) over expected score.",
                    rec.score.ceiling
                ));
                tracing::info!(entity = %rec.entity, deficit, "tagged chaos-play alternative");
            }
        }

        Ok(out)
    }

    /// Net value of a proposed trade from the user's side, using each entity's median.
    pub fn evaluate_trade(
        &self,
        recommendations: &[Recommendation],
        proposal: &TradeProposal,
    ) -> TradeSummary {
        let mut confidence = DataConfidence::Live;
        let mut side = |keys: &[CanonicalKey]| -> f64 {
            keys.iter()
                .map(|k| match recommendations.iter().find(|r| &r.entity == k) {
                    Some(r) => {
                        confidence = confidence.max(r.confidence);
                        r.score.median
                    }
                    None => {
                        confidence = DataConfidence::Fallback;
                        0.0
                    }
                })
                .sum()
        };
        let give_value = side(&proposal.give);
        let receive_value = side(&proposal.receive);
        let net = receive_value - give_value;

        TradeSummary {
            give_value,
            receive_value,
            net,
            verdict: if net > 0.0 {
                TradeVerdict::Accept
            } else {
                TradeVerdict::Decline
            },
            confidence,
        }
    }

    fn score(
        &self,
        view: &AggregatedEntityView,
        decision: DecisionType,
        context: &DecisionContext,
        late_season: bool,
    ) -> Scored {
        let required = decision.required_fields();
        let mut estimated: Vec<Field> = required
            .iter()
            .copied()
            .filter(|f| view.reading(*f).status() == FieldStatus::Missing)
            .collect();
        let stale: Vec<Field> = required
            .iter()
            .copied()
            .filter(|f| view.reading(*f).status() == FieldStatus::Stale)
            .collect();

        let sources = match decision {
            DecisionType::Trade => [Field::RestOfSeasonPoints, Field::ProjectedPoints],
            DecisionType::StartSit | DecisionType::Waiver => {
                [Field::ProjectedPoints, Field::RestOfSeasonPoints]
            }
        };
        let median = match sources.iter().find_map(|f| view.number(*f)) {
            Some(m) => m.max(0.0),
            None => {
                if !estimated.contains(&sources[0]) {
                    estimated.push(sources[0]);
                }
                self.config.baseline_for(view.entity.position)
            }
        };

        let ratio = self.config.default_spread_ratio;
        let floor = view
            .number(Field::ProjectedFloor)
            .unwrap_or(median * (1.0 - ratio))
            .min(median)
            .max(0.0);
        let ceiling = view
            .number(Field::ProjectedCeiling)
            .unwrap_or(median * (1.0 + ratio))
            .max(median);

        let input = SignalInput {
            view,
            config: &self.config,
            decision,
            scoring: context.league.scoring,
            late_season,
            base_median: median,
        };
        let contributions = signals::evaluate(&input);
        let adj = (1.0 + self.config.signal_scale * signals::composite(&contributions)).max(0.0);

        let confidence = if !estimated.is_empty() {
            DataConfidence::Fallback
        } else if !stale.is_empty() {
            DataConfidence::Stale
        } else {
            DataConfidence::Live
        };

        let bye_week = match (decision, context.week, view.number(Field::ByeWeek)) {
            (DecisionType::StartSit, Some(week), Some(bye)) if bye == f64::from(week) => Some(week),
            _ => None,
        };
        let adj = if bye_week.is_some() { 0.0 } else { adj };

        Scored {
            name: view.entity.display_name.clone(),
            score: ScoreComponents {
                floor: floor * adj,
                median: median * adj,
                ceiling: ceiling * adj,
            },
            signals: contributions,
            confidence,
            estimated,
            stale,
            bye_week,
        }
    }
}

fn validate_context(decision: DecisionType, context: &DecisionContext) -> Result<(), CoreError> {
    if context.lineup_slots == Some(0) {
        return Err(CoreError::InvalidRequest("lineup_slots must be at least 1".into()));
    }
    if context.max_adds == Some(0) {
        return Err(CoreError::InvalidRequest("max_adds must be at least 1".into()));
    }
    if let Some(m) = context.projected_margin {
        if !m.is_finite() {
            return Err(CoreError::InvalidRequest("projected_margin must be finite".into()));
        }
    }
    if decision == DecisionType::Trade {
        match &context.trade {
            None => {
                return Err(CoreError::InvalidRequest(
                    "trade decisions need a trade proposal in the context".into(),
                ))
            }
            Some(t) if t.give.is_empty() || t.receive.is_empty() => {
                return Err(CoreError::InvalidRequest(
                    "trade proposal needs at least one entity on each side".into(),
                ))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn verdict(
    decision: DecisionType,
    context: &DecisionContext,
    key: &CanonicalKey,
    pos: usize,
) -> Verdict {
    match decision {
        DecisionType::StartSit if pos < context.lineup_slots.unwrap_or(1) => Verdict::Start,
        DecisionType::StartSit => Verdict::Sit,
        DecisionType::Waiver if pos < context.max_adds.unwrap_or(1) => Verdict::Add,
        DecisionType::Waiver => Verdict::Pass,
        DecisionType::Trade => match &context.trade {
            Some(t) if t.receive.contains(key) => Verdict::Acquire,
            Some(t) if t.give.contains(key) => Verdict::Send,
            _ => Verdict::Pass,
        },
    }
}

fn risk_band(score: &ScoreComponents, confidence: DataConfidence) -> RiskBand {
    let rel = score.spread() / score.median.max(1.0);
    let band = if rel < LOW_RISK_MAX_SPREAD {
        RiskBand::Low
    } else if rel < MEDIUM_RISK_MAX_SPREAD {
        RiskBand::Medium
    } else {
        RiskBand::High
    };
    // Estimates never read as low risk.
    if confidence == DataConfidence::Fallback && band == RiskBand::Low {
        RiskBand::Medium
    } else {
        band
    }
}

fn join(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn rationale(s: &Scored, posture: Posture, correlated_with: Option<&CanonicalKey>) -> String {
    let mut out = format!(
        "{}: median {:.1} (floor {:.1}, ceiling {:.1}).",
        s.name, s.score.median, s.score.floor, s.score.ceiling
    );

    let strongest = s
        .signals
        .iter()
        .filter(|c| c.observed && c.value != 0.0)
        .max_by(|a, b| (a.weight * a.value.abs()).total_cmp(&(b.weight * b.value.abs())));
    if let Some(c) = strongest {
        out.push_str(&format!(" Strongest signal: {} ({:+.2}).", c.signal, c.value));
    }
    if let Some(week) = s.bye_week {
        out.push_str(&format!(" On bye in week {week}: projected 0, do not start."));
    }

    match posture {
        Posture::Favorite => out.push_str(" Favored this week: lower variance preferred among near-equal options."),
        Posture::Underdog => out.push_str(" Underdog this week: higher ceiling preferred among near-equal options."),
        Posture::Even => {}
    }
    if let Some(partner) = correlated_with {
        out.push_str(&format!(" Correlated stack with {partner} (same game, opposing sides)."));
    }
    if !s.estimated.is_empty() {
        out.push_str(&format!(
            " ESTIMATED, not observed: {}.",
            join(&s.estimated)
        ));
    }
    if !s.stale.is_empty() {
        out.push_str(&format!(" Stale data: {}.", join(&s.stale)));
    }
    out
}
