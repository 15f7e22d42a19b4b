use crate::domain::entity::ProviderId;
use crate::domain::observation::FieldGroup;
use crate::ingest::types::ProviderPayload;
use crate::ingest::{ProviderClient, StaticProvider};
use crate::policy::AdvisorConfig;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

pub const ALL_GROUPS: [FieldGroup; 7] = [
    FieldGroup::Usage,
    FieldGroup::Matchup,
    FieldGroup::Health,
    FieldGroup::GameScript,
    FieldGroup::Depth,
    FieldGroup::Market,
    FieldGroup::Projection,
];

pub fn ts(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, h, m, 0).unwrap()
}

pub fn payload(provider: &str, fetched_at: DateTime<Utc>, items: Value) -> ProviderPayload {
    serde_json::from_value(json!({
        "provider": provider,
        "fetched_at": fetched_at,
        "items": items,
    }))
    .unwrap()
}

pub fn provider(
    id: &str,
    groups: &[FieldGroup],
    fetched_at: DateTime<Utc>,
    items: Value,
) -> Arc<dyn ProviderClient> {
    Arc::new(StaticProvider::new(
        ProviderId::new(id),
        groups.to_vec(),
        payload(id, fetched_at, items),
    ))
}

pub fn config(priority: &[&str]) -> AdvisorConfig {
    AdvisorConfig {
        provider_priority: priority.iter().map(|p| ProviderId::new(*p)).collect(),
        provider_timeout_ms: 500,
        request_deadline_ms: 2_000,
        ..AdvisorConfig::default()
    }
}

/// A complete start/sit item with every required field present.
pub fn start_sit_item(raw_id: &str, name: &str, projected: f64) -> Value {
    json!({
        "raw_id": raw_id,
        "name": name,
        "team": "KC",
        "position": "WR",
        "fields": {
            "snap_share": 0.8,
            "target_share": 0.22,
            "matchup_delta": 0.0,
            "health_status": "active",
            "projected_points": projected
        }
    })
}
