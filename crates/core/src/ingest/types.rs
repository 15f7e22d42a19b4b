use crate::domain::entity::{Position, ProviderId};
use crate::domain::observation::{Field, FieldValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPayload {
    pub provider: ProviderId,
    pub fetched_at: DateTime<Utc>,
    pub items: Vec<PayloadItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadItem {
    pub raw_id: String,
    pub name: String,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default, deserialize_with = "lenient_position")]
    pub position: Option<Position>,
    /// Overrides the payload-level fetch time for this item.
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_fields")]
    pub fields: BTreeMap<Field, FieldValue>,
}

/// Unknown positions become `None` instead of rejecting the whole payload.
fn lenient_position<'de, D>(deserializer: D) -> Result<Option<Position>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(Position::parse))
}

/// Unknown field names and values of the wrong kind are skipped one by one, so the rest of the
/// item (and the payload) still lands.
fn lenient_fields<'de, D>(deserializer: D) -> Result<BTreeMap<Field, FieldValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();
    for (name, value) in raw.unwrap_or_default() {
        let Some(field) = Field::parse(&name) else {
            tracing::warn!(field = %name, "unknown provider field skipped");
            continue;
        };
        match FieldValue::decode(field, &value) {
            Some(v) => {
                out.insert(field, v);
            }
            None => tracing::warn!(%field, %value, "provider value has the wrong kind; skipped"),
        }
    }
    Ok(out)
}

impl PayloadItem {
    pub fn is_valid(&self) -> bool {
        !self.raw_id.trim().is_empty() && !self.name.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::observation::HealthStatus;
    use serde_json::json;

    #[test]
    fn parses_expected_shape() {
        let v = json!({
            "provider": "sleeper",
            "fetched_at": "2026-10-16T11:00:00Z",
            "items": [
                {
                    "raw_id": "JSMITH01",
                    "name": "J. Smith",
                    "team": "KC",
                    "position": "wr",
                    "fields": {
                        "snap_share": 0.82,
                        "health_status": "questionable",
                        "opponent": "LV",
                        "starter_ahead_out": false
                    }
                }
            ]
        });

        let parsed: ProviderPayload = serde_json::from_value(v).unwrap();
        let item = &parsed.items[0];
        assert_eq!(item.position, Some(Position::Wr));
        assert_eq!(
            item.fields.get(&Field::HealthStatus),
            Some(&FieldValue::Health(HealthStatus::Questionable))
        );
        assert_eq!(
            item.fields.get(&Field::StarterAheadOut),
            Some(&FieldValue::Flag(false))
        );
        assert!(item.is_valid());
    }

    #[test]
    fn unknown_names_and_bad_values_skip_only_themselves() {
        let v = json!({
            "provider": "sleeper",
            "fetched_at": "2026-10-16T11:00:00Z",
            "items": [
                {"raw_id": "1", "name": "Casey Example", "position": "LB", "fields": {"snap_share": 0.7}},
                {
                    "raw_id": "2",
                    "name": "Drew Example",
                    "fields": {
                        "snap_share": 0.55,
                        "vibes": 1.0,
                        "target_share": "high",
                        "health_status": "Q",
                        "bye_week": 7
                    }
                }
            ]
        });

        let parsed: ProviderPayload = serde_json::from_value(v).unwrap();
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(parsed.items[0].position, None);
        assert_eq!(
            parsed.items[0].fields.get(&Field::SnapShare),
            Some(&FieldValue::Number(0.7))
        );

        let fields = &parsed.items[1].fields;
        assert_eq!(fields.get(&Field::SnapShare), Some(&FieldValue::Number(0.55)));
        assert_eq!(
            fields.get(&Field::HealthStatus),
            Some(&FieldValue::Health(HealthStatus::Questionable))
        );
        assert_eq!(fields.get(&Field::ByeWeek), Some(&FieldValue::Number(7.0)));
        assert!(!fields.contains_key(&Field::TargetShare));
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn null_fields_read_as_empty() {
        let item: PayloadItem =
            serde_json::from_value(json!({"raw_id": "1", "name": "X", "fields": null})).unwrap();
        assert!(item.fields.is_empty());
    }
}
