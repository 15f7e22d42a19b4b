//! Fan-out to providers, identity reconciliation and the degradation protocol.

use crate::domain::entity::{CanonicalKey, Entity, ProviderId};
use crate::domain::observation::{Field, FieldGroup, FieldReading, FieldStatus, FieldValue};
use crate::domain::recommendation::{Disclosure, FALLBACK_WARNING, LIVE_DATA_CONFIRMATION};
use crate::domain::request::{DecisionType, RecommendationRequest, Scope};
use crate::error::{CoreError, ProviderError};
use crate::freshness::FreshnessTracker;
use crate::ingest::types::ProviderPayload;
use crate::ingest::ProviderClient;
use crate::policy::AdvisorConfig;
use crate::resolve::EntityResolver;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Best-available picture of one entity, rebuilt per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedEntityView {
    pub entity: Entity,
    pub fields: BTreeMap<Field, FieldReading>,
}

static MISSING: FieldReading = FieldReading::Missing;

impl AggregatedEntityView {
    pub fn reading(&self, field: Field) -> &FieldReading {
        self.fields.get(&field).unwrap_or(&MISSING)
    }

    pub fn value(&self, field: Field) -> Option<&FieldValue> {
        self.reading(field).value()
    }

    pub fn number(&self, field: Field) -> Option<f64> {
        self.value(field).and_then(FieldValue::as_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Every required field is fresh.
    Live,
    /// Nothing missing, but some required field is stale.
    Stale,
    /// At least one required field is missing for an in-scope entity.
    Degraded,
    /// No provider call succeeded.
    FallbackOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FetchOutcome {
    Delivered { items: usize },
    Failed { kind: String, detail: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderOutcome {
    pub provider: ProviderId,
    pub group: FieldGroup,
    pub outcome: FetchOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbiguityWarning {
    pub provider: ProviderId,
    pub raw_id: String,
    pub raw_name: String,
    pub candidates: Vec<CanonicalKey>,
}

impl AmbiguityWarning {
    pub fn into_error(self) -> CoreError {
        CoreError::AmbiguousEntity {
            provider: self.provider,
            raw_id: self.raw_id,
            raw_name: self.raw_name,
            candidates: self.candidates,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationReport {
    pub as_of: DateTime<Utc>,
    pub decision: DecisionType,
    pub status: RequestStatus,
    /// Per in-scope entity, per required field.
    pub fields: BTreeMap<CanonicalKey, BTreeMap<Field, FieldStatus>>,
    pub providers: Vec<ProviderOutcome>,
    pub ambiguities: Vec<AmbiguityWarning>,
}

impl DegradationReport {
    pub fn is_degraded(&self) -> bool {
        matches!(
            self.status,
            RequestStatus::Degraded | RequestStatus::FallbackOnly
        )
    }

    pub fn is_fallback_only(&self) -> bool {
        self.status == RequestStatus::FallbackOnly
    }

    pub fn status_of(&self, key: &CanonicalKey, field: Field) -> Option<FieldStatus> {
        self.fields.get(key).and_then(|m| m.get(&field)).copied()
    }

    pub fn fields_with(&self, key: &CanonicalKey, status: FieldStatus) -> Vec<Field> {
        self.fields
            .get(key)
            .map(|m| {
                m.iter()
                    .filter(|(_, s)| **s == status)
                    .map(|(f, _)| *f)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn providers_tried(&self) -> Vec<ProviderId> {
        let set: BTreeSet<&ProviderId> = self.providers.iter().map(|o| &o.provider).collect();
        set.into_iter().cloned().collect()
    }

    pub fn successful_calls(&self) -> usize {
        self.providers
            .iter()
            .filter(|o| matches!(o.outcome, FetchOutcome::Delivered { .. }))
            .count()
    }

    /// The disclosure the front-end must render verbatim.
    pub fn disclosure(&self) -> Disclosure {
        let mut stale = Vec::new();
        let mut missing = Vec::new();
        for (key, fields) in &self.fields {
            for (field, status) in fields {
                match status {
                    FieldStatus::Fresh => {}
                    FieldStatus::Stale => stale.push((key.clone(), *field)),
                    FieldStatus::Missing => missing.push((key.clone(), *field)),
                }
            }
        }

        if self.status == RequestStatus::Live && stale.is_empty() && missing.is_empty() {
            Disclosure::LiveData {
                message: LIVE_DATA_CONFIRMATION.to_string(),
            }
        } else {
            Disclosure::FallbackWarning {
                message: FALLBACK_WARNING.to_string(),
                stale,
                missing,
            }
        }
    }
}

struct Call {
    provider: Arc<dyn ProviderClient>,
    group: FieldGroup,
    fields: Vec<Field>,
}

pub struct Aggregator {
    providers: Vec<Arc<dyn ProviderClient>>,
    resolver: Arc<EntityResolver>,
    tracker: Arc<FreshnessTracker>,
    config: Arc<AdvisorConfig>,
}

impl Aggregator {
    pub fn new(
        mut providers: Vec<Arc<dyn ProviderClient>>,
        resolver: Arc<EntityResolver>,
        tracker: Arc<FreshnessTracker>,
        config: Arc<AdvisorConfig>,
    ) -> Self {
        let rank = |id: &ProviderId| {
            config
                .provider_priority
                .iter()
                .position(|p| p == id)
                .unwrap_or(config.provider_priority.len())
        };
        providers.sort_by(|a, b| {
            rank(a.provider_id())
                .cmp(&rank(b.provider_id()))
                .then_with(|| a.provider_id().cmp(b.provider_id()))
        });

        Self {
            providers,
            resolver,
            tracker,
            config,
        }
    }

    pub fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    pub fn tracker(&self) -> &FreshnessTracker {
        &self.tracker
    }

    fn plan(&self, decision: DecisionType) -> Vec<Call> {
        let wanted = decision.wanted_fields();
        let mut groups: BTreeMap<FieldGroup, Vec<Field>> = BTreeMap::new();
        for f in wanted {
            groups.entry(f.group()).or_default().push(f);
        }

        let mut calls = Vec::new();
        for provider in &self.providers {
            for (group, fields) in &groups {
                if provider.coverage().contains(group) {
                    calls.push(Call {
                        provider: Arc::clone(provider),
                        group: *group,
                        fields: fields.clone(),
                    });
                }
            }
        }
        calls
    }

    /// Never fails: provider errors become report entries.
    pub async fn aggregate(
        &self,
        request: &RecommendationRequest,
    ) -> (Vec<AggregatedEntityView>, DegradationReport) {
        let as_of = request.context.as_of;
        let calls = self.plan(request.decision);
        let results = self.dispatch(&calls, &request.scope, as_of).await;

        let mut outcomes = Vec::with_capacity(calls.len());
        let mut ambiguities: Vec<AmbiguityWarning> = Vec::new();
        let mut seen: BTreeSet<CanonicalKey> = BTreeSet::new();

        // Calls are in priority order, so recording is deterministic regardless of completion order.
        for (call, result) in calls.iter().zip(results) {
            let provider = call.provider.provider_id().clone();
            let outcome = match result {
                Ok(payload) => {
                    let items = payload.items.len();
                    self.ingest(call, payload, &mut seen, &mut ambiguities);
                    FetchOutcome::Delivered { items }
                }
                Err(err) => {
                    tracing::warn!(%provider, group = ?call.group, error = %err, "provider call failed");
                    FetchOutcome::Failed {
                        kind: err.kind().to_string(),
                        detail: err.to_string(),
                    }
                }
            };
            outcomes.push(ProviderOutcome {
                provider,
                group: call.group,
                outcome,
            });
        }

        // Explicit scopes only care about ambiguity touching the requested keys. Category scopes
        // keep every warning, since the unattached item may belong to the roster.
        if let Scope::Entities { keys } = &request.scope {
            ambiguities.retain(|a| a.candidates.iter().any(|c| keys.contains(c)));
        }
        let in_scope = self.in_scope(&request.scope, seen);
        let wanted = request.decision.wanted_fields();
        let required = request.decision.required_fields();

        let mut views = Vec::with_capacity(in_scope.len());
        let mut field_report = BTreeMap::new();
        for key in in_scope {
            let entity = self
                .resolver
                .entity(&key)
                .unwrap_or_else(|| Entity::placeholder(key.clone()));

            let fields: BTreeMap<Field, FieldReading> = wanted
                .iter()
                .map(|f| {
                    let max_age = self.config.staleness_threshold(*f);
                    (*f, self.tracker.latest(&key, *f, as_of, max_age))
                })
                .collect();

            let statuses: BTreeMap<Field, FieldStatus> = required
                .iter()
                .map(|f| {
                    let status = fields
                        .get(f)
                        .map(FieldReading::status)
                        .unwrap_or(FieldStatus::Missing);
                    (*f, status)
                })
                .collect();

            field_report.insert(key, statuses);
            views.push(AggregatedEntityView { entity, fields });
        }

        let delivered = outcomes
            .iter()
            .any(|o| matches!(o.outcome, FetchOutcome::Delivered { .. }));
        let any_status = |s: FieldStatus| {
            field_report
                .values()
                .any(|m: &BTreeMap<Field, FieldStatus>| m.values().any(|v| *v == s))
        };
        let status = if !delivered {
            RequestStatus::FallbackOnly
        } else if views.is_empty() || any_status(FieldStatus::Missing) {
            RequestStatus::Degraded
        } else if any_status(FieldStatus::Stale) {
            RequestStatus::Stale
        } else {
            RequestStatus::Live
        };

        let report = DegradationReport {
            as_of,
            decision: request.decision,
            status,
            fields: field_report,
            providers: outcomes,
            ambiguities,
        };

        match status {
            RequestStatus::Live | RequestStatus::Stale => tracing::info!(
                request_id = %request.id,
                entities = views.len(),
                calls = calls.len(),
                status = ?status,
                "aggregation complete"
            ),
            RequestStatus::Degraded | RequestStatus::FallbackOnly => tracing::warn!(
                request_id = %request.id,
                entities = views.len(),
                calls = calls.len(),
                delivered = report.successful_calls(),
                status = ?status,
                "aggregation degraded"
            ),
        }

        (views, report)
    }

    /// Runs every call concurrently, each under its own timeout, all under the request deadline.
    /// Results come back in call order; anything still pending at the deadline is `Cancelled`.
    async fn dispatch(
        &self,
        calls: &[Call],
        scope: &Scope,
        as_of: DateTime<Utc>,
    ) -> Vec<Result<ProviderPayload, ProviderError>> {
        let per_call = Duration::from_millis(self.config.provider_timeout_ms);
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.config.request_deadline_ms);

        let mut set = JoinSet::new();
        for (idx, call) in calls.iter().enumerate() {
            let provider = Arc::clone(&call.provider);
            let fields = call.fields.clone();
            let scope = scope.clone();
            set.spawn(async move {
                let res = match tokio::time::timeout(per_call, provider.fetch(&scope, &fields, as_of))
                    .await
                {
                    Ok(res) => res,
                    Err(_) => Err(ProviderError::Timeout),
                };
                (idx, res)
            });
        }

        let mut results: Vec<Option<Result<ProviderPayload, ProviderError>>> =
            (0..calls.len()).map(|_| None).collect();
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((idx, res)))) => results[idx] = Some(res),
                Ok(Some(Err(err))) => {
                    tracing::error!(error = %err, "provider task failed to complete");
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(pending = set.len(), "request deadline reached; cancelling pending provider calls");
                    set.abort_all();
                    break;
                }
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or(Err(ProviderError::Cancelled)))
            .collect()
    }

    fn ingest(
        &self,
        call: &Call,
        payload: ProviderPayload,
        seen: &mut BTreeSet<CanonicalKey>,
        ambiguities: &mut Vec<AmbiguityWarning>,
    ) {
        let provider = call.provider.provider_id();
        for item in payload.items {
            let key = match self.resolver.resolve_with_hint(
                provider,
                &item.raw_id,
                &item.name,
                item.team.as_deref(),
            ) {
                Ok(key) => key,
                Err(CoreError::AmbiguousEntity {
                    provider,
                    raw_id,
                    raw_name,
                    candidates,
                }) => {
                    let dup = ambiguities
                        .iter()
                        .any(|a| a.provider == provider && a.raw_id == raw_id);
                    if !dup {
                        tracing::warn!(%provider, %raw_id, %raw_name, ?candidates, "ambiguous entity; observations not attached");
                        ambiguities.push(AmbiguityWarning {
                            provider,
                            raw_id,
                            raw_name,
                            candidates,
                        });
                    }
                    continue;
                }
                Err(err) => {
                    tracing::warn!(%provider, raw_id = %item.raw_id, error = %err, "entity resolution failed; item skipped");
                    continue;
                }
            };

            self.resolver
                .enrich(&key, item.team.as_deref(), item.position);
            seen.insert(key.clone());

            let fetched_at = item.observed_at.unwrap_or(payload.fetched_at);
            for (field, value) in item.fields {
                if !call.fields.contains(&field) {
                    continue;
                }
                match self
                    .tracker
                    .record(&key, field, value, provider, fetched_at)
                {
                    Ok(obs) => {
                        tracing::debug!(%provider, entity = %key, %field, seq = obs.seq, "recorded observation")
                    }
                    Err(err) => {
                        tracing::warn!(%provider, entity = %key, %field, error = %err, "observation rejected")
                    }
                }
            }
        }
    }

    fn in_scope(&self, scope: &Scope, seen: BTreeSet<CanonicalKey>) -> BTreeSet<CanonicalKey> {
        match scope {
            Scope::Entities { keys } => keys.iter().cloned().collect(),
            Scope::Roster { .. } => seen,
            Scope::FreeAgents { position } => seen
                .into_iter()
                .filter(|key| match (position, self.resolver.entity(key)) {
                    (Some(want), Some(entity)) => entity.position.map_or(true, |p| p == *want),
                    _ => true,
                })
                .collect(),
        }
    }
}
