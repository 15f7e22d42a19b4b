use crate::aggregate::Aggregator;
use crate::domain::recommendation::RecommendationSet;
use crate::domain::request::{DecisionType, RecommendationRequest, Scope};
use crate::engine::HeuristicEngine;
use crate::error::CoreError;
use crate::freshness::FreshnessTracker;
use crate::ingest::ProviderClient;
use crate::policy::AdvisorConfig;
use crate::resolve::EntityResolver;
use crate::time::season;
use std::sync::Arc;
use tracing::Instrument;

/// Request pipeline: aggregate, then score. One per process; shared across requests.
pub struct Advisor {
    config: Arc<AdvisorConfig>,
    aggregator: Aggregator,
    engine: HeuristicEngine,
}

impl Advisor {
    /// Validates the config; a bad config never reaches request time.
    pub fn from_config(
        config: AdvisorConfig,
        providers: Vec<Arc<dyn ProviderClient>>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        if providers.is_empty() {
            return Err(CoreError::Configuration(
                "at least one provider is required".to_string(),
            ));
        }
        for p in &providers {
            if !config.provider_priority.contains(p.provider_id()) {
                return Err(CoreError::Configuration(format!(
                    "provider {} is missing from provider_priority",
                    p.provider_id()
                )));
            }
        }

        let config = Arc::new(config);
        let resolver = Arc::new(EntityResolver::with_cross_reference(&config.cross_reference)?);
        let tracker = Arc::new(FreshnessTracker::new(config.provider_priority.clone()));
        tracing::info!(
            providers = providers.len(),
            cross_reference = config.cross_reference.len(),
            "advisor ready"
        );

        Ok(Self {
            aggregator: Aggregator::new(providers, resolver, tracker, Arc::clone(&config)),
            engine: HeuristicEngine::new(Arc::clone(&config)),
            config,
        })
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    pub fn resolver(&self) -> &EntityResolver {
        self.aggregator.resolver()
    }

    pub async fn advise(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationSet, CoreError> {
        let span = tracing::info_span!(
            "advise",
            request_id = %request.id,
            decision = ?request.decision
        );
        self.advise_inner(request).instrument(span).await
    }

    async fn advise_inner(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationSet, CoreError> {
        let request = self.complete_context(request)?;
        let (views, report) = self.aggregator.aggregate(&request).await;

        let recommendations =
            self.engine
                .recommend(&views, &report, request.decision, &request.context)?;
        let trade = match (&request.decision, &request.context.trade) {
            (DecisionType::Trade, Some(proposal)) => {
                Some(self.engine.evaluate_trade(&recommendations, proposal))
            }
            _ => None,
        };

        tracing::info!(
            recommendations = recommendations.len(),
            status = ?report.status,
            "request served"
        );
        Ok(RecommendationSet {
            request_id: request.id,
            decision: request.decision,
            recommendations,
            trade,
            disclosure: report.disclosure(),
            report,
        })
    }

    /// Fills week and late-season from the calendar, and checks scope against the decision.
    fn complete_context(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationRequest, CoreError> {
        let mut request = request.clone();

        match &request.scope {
            Scope::Entities { keys } if keys.is_empty() => {
                return Err(CoreError::InvalidRequest(
                    "entity scope must name at least one entity".into(),
                ))
            }
            Scope::Roster { team_key } if team_key.trim().is_empty() => {
                return Err(CoreError::InvalidRequest("roster scope needs a team key".into()))
            }
            _ => {}
        }

        if let (DecisionType::Trade, Some(proposal)) = (&request.decision, &request.context.trade) {
            if let Scope::Entities { keys } = &request.scope {
                let uncovered = proposal
                    .give
                    .iter()
                    .chain(&proposal.receive)
                    .find(|k| !keys.contains(*k));
                if let Some(key) = uncovered {
                    return Err(CoreError::InvalidRequest(format!(
                        "trade entity {key} is not in the request scope"
                    )));
                }
            }
        }

        let ctx = &mut request.context;
        if ctx.week.is_none() {
            ctx.week = Some(season::week_for_date(
                self.config.season_start_date,
                ctx.as_of.date_naive(),
            ));
        }
        if ctx.late_season.is_none() {
            ctx.late_season = Some(season::is_late_season(
                self.config.horizon_switch_date,
                ctx.as_of,
            ));
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{CanonicalKey, ProviderId};
    use crate::domain::observation::FieldGroup;
    use crate::domain::recommendation::{DataConfidence, Disclosure, TradeVerdict, Verdict};
    use crate::domain::request::{DecisionContext, TradeProposal};
    use crate::error::ProviderError;
    use crate::ingest::StaticProvider;
    use crate::testutil::{config, provider, start_sit_item, ts, ALL_GROUPS};
    use serde_json::json;

    fn timing_out(id: &str) -> Arc<dyn ProviderClient> {
        Arc::new(StaticProvider::failing(
            ProviderId::new(id),
            ALL_GROUPS.to_vec(),
            ProviderError::Timeout,
        ))
    }

    #[tokio::test]
    async fn live_request_confirms_live_data() {
        let p1 = provider(
            "p1",
            &ALL_GROUPS,
            ts(11, 50),
            json!([start_sit_item("1", "Casey Example", 14.0), start_sit_item("2", "Drew Example", 8.0)]),
        );
        let advisor = Advisor::from_config(config(&["p1"]), vec![p1]).unwrap();
        let req = RecommendationRequest::new(
            Scope::Roster {
                team_key: "t1".into(),
            },
            DecisionType::StartSit,
            DecisionContext::new(ts(12, 0)),
        );

        let set = advisor.advise(&req).await.unwrap();
        assert_eq!(set.request_id, req.id);
        assert_eq!(set.recommendations.len(), 2);
        assert_eq!(set.recommendations[0].entity.as_str(), "casey-example");
        assert_eq!(set.recommendations[0].verdict, Verdict::Start);
        assert!(set
            .recommendations
            .iter()
            .all(|r| r.confidence == DataConfidence::Live));
        assert!(matches!(set.disclosure, Disclosure::LiveData { .. }));
    }

    #[tokio::test]
    async fn calendar_week_benches_entity_on_bye() {
        // 2026-10-16 falls in week 6 of a season starting 2026-09-08.
        let mut idle = start_sit_item("1", "Casey Example", 14.0);
        idle["fields"]["bye_week"] = json!(6);
        let p1 = provider(
            "p1",
            &ALL_GROUPS,
            ts(11, 50),
            json!([idle, start_sit_item("2", "Drew Example", 8.0)]),
        );
        let advisor = Advisor::from_config(config(&["p1"]), vec![p1]).unwrap();
        let req = RecommendationRequest::new(
            Scope::Roster {
                team_key: "t1".into(),
            },
            DecisionType::StartSit,
            DecisionContext::new(ts(12, 0)),
        );

        let set = advisor.advise(&req).await.unwrap();
        assert_eq!(set.recommendations[0].entity.as_str(), "drew-example");
        assert_eq!(set.recommendations[0].verdict, Verdict::Start);
        let casey = &set.recommendations[1];
        assert_eq!(casey.verdict, Verdict::Sit);
        assert_eq!(casey.score.median, 0.0);
        assert!(casey.rationale.contains("On bye in week 6"));
    }

    #[tokio::test]
    async fn all_timeouts_raise_insufficient_data() {
        let advisor =
            Advisor::from_config(config(&["p1", "p2"]), vec![timing_out("p1"), timing_out("p2")])
                .unwrap();
        let req = RecommendationRequest::new(
            Scope::Entities {
                keys: vec![CanonicalKey::new("casey-example")],
            },
            DecisionType::StartSit,
            DecisionContext::new(ts(12, 0)),
        );

        match advisor.advise(&req).await {
            Err(CoreError::InsufficientData {
                entities,
                providers_tried,
                ..
            }) => {
                assert_eq!(entities, vec![CanonicalKey::new("casey-example")]);
                assert_eq!(providers_tried.len(), 2);
            }
            other => panic!("expected insufficient data, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn partial_outage_degrades_with_fallback_disclosure() {
        let usage_only = provider(
            "p1",
            &[FieldGroup::Usage, FieldGroup::Projection, FieldGroup::Matchup],
            ts(11, 50),
            json!([start_sit_item("1", "Casey Example", 14.0)]),
        );
        let advisor =
            Advisor::from_config(config(&["p1", "p2"]), vec![usage_only, timing_out("p2")])
                .unwrap();
        let req = RecommendationRequest::new(
            Scope::Roster {
                team_key: "t1".into(),
            },
            DecisionType::StartSit,
            DecisionContext::new(ts(12, 0)),
        );

        let set = advisor.advise(&req).await.unwrap();
        let rec = &set.recommendations[0];
        assert_eq!(rec.confidence, DataConfidence::Fallback);
        assert!(rec.rationale.contains("health_status"));
        match &set.disclosure {
            Disclosure::FallbackWarning { missing, .. } => {
                assert!(missing.contains(&(CanonicalKey::new("casey-example"), crate::domain::observation::Field::HealthStatus)));
            }
            other => panic!("expected fallback warning, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn trade_request_carries_summary() {
        let item = |id: &str, name: &str, ros: f64| {
            json!({
                "raw_id": id,
                "name": name,
                "team": "KC",
                "position": "RB",
                "fields": {
                    "snap_share": 0.7,
                    "target_share": 0.1,
                    "health_status": "active",
                    "rest_of_season_points": ros
                }
            })
        };
        let p1 = provider(
            "p1",
            &ALL_GROUPS,
            ts(11, 50),
            json!([item("1", "Casey Example", 9.0), item("2", "Drew Example", 13.0)]),
        );
        let advisor = Advisor::from_config(config(&["p1"]), vec![p1]).unwrap();
        let casey = CanonicalKey::new("casey-example");
        let drew = CanonicalKey::new("drew-example");
        let mut ctx = DecisionContext::new(ts(12, 0));
        ctx.trade = Some(TradeProposal {
            give: vec![casey.clone()],
            receive: vec![drew.clone()],
        });
        let req = RecommendationRequest::new(
            Scope::Entities {
                keys: vec![casey, drew],
            },
            DecisionType::Trade,
            ctx,
        );

        let set = advisor.advise(&req).await.unwrap();
        let trade = set.trade.unwrap();
        assert_eq!(trade.verdict, TradeVerdict::Accept);
        assert!(trade.net > 0.0);
    }

    #[tokio::test]
    async fn trade_entities_must_be_in_scope() {
        let advisor = Advisor::from_config(config(&["p1"]), vec![timing_out("p1")]).unwrap();
        let mut ctx = DecisionContext::new(ts(12, 0));
        ctx.trade = Some(TradeProposal {
            give: vec![CanonicalKey::new("a")],
            receive: vec![CanonicalKey::new("b")],
        });
        let req = RecommendationRequest::new(
            Scope::Entities {
                keys: vec![CanonicalKey::new("a")],
            },
            DecisionType::Trade,
            ctx,
        );
        let err = advisor.advise(&req).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }

    #[test]
    fn rejects_provider_outside_priority() {
        let err = Advisor::from_config(config(&["p1"]), vec![timing_out("p9")])
            .err()
            .unwrap();
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn fills_calendar_context() {
        let advisor = Advisor::from_config(config(&["p1"]), vec![timing_out("p1")]).unwrap();
        let req = RecommendationRequest::new(
            Scope::Roster {
                team_key: "t1".into(),
            },
            DecisionType::StartSit,
            DecisionContext::new(ts(12, 0)),
        );
        let completed = advisor.complete_context(&req).unwrap();
        assert_eq!(completed.context.week, Some(6));
        assert_eq!(completed.context.late_season, Some(false));
    }
}
