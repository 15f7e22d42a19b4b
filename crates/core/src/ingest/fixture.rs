use crate::domain::entity::ProviderId;
use crate::domain::observation::{Field, FieldGroup};
use crate::domain::request::Scope;
use crate::error::ProviderError;
use crate::ingest::provider::ProviderClient;
use crate::ingest::types::{PayloadItem, ProviderPayload};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Provider backed by a fixed payload. Used offline by the worker and throughout the tests.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    id: ProviderId,
    coverage: Vec<FieldGroup>,
    response: Result<ProviderPayload, ProviderError>,
    delay: Option<Duration>,
}

#[derive(Debug, Deserialize)]
struct FixtureFile {
    provider: ProviderId,
    coverage: Vec<FieldGroup>,
    fetched_at: DateTime<Utc>,
    items: Vec<PayloadItem>,
}

impl StaticProvider {
    pub fn new(id: ProviderId, coverage: Vec<FieldGroup>, payload: ProviderPayload) -> Self {
        Self {
            id,
            coverage,
            response: Ok(payload),
            delay: None,
        }
    }

    pub fn failing(id: ProviderId, coverage: Vec<FieldGroup>, error: ProviderError) -> Self {
        Self {
            id,
            coverage,
            response: Err(error),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        let file: FixtureFile = serde_json::from_str(&text)
            .with_context(|| format!("fixture {} is not a valid provider file", path.display()))?;
        anyhow::ensure!(!file.coverage.is_empty(), "fixture coverage must be non-empty");

        let payload = ProviderPayload {
            provider: file.provider.clone(),
            fetched_at: file.fetched_at,
            items: file.items,
        };
        Ok(Self::new(file.provider, file.coverage, payload))
    }
}

#[async_trait::async_trait]
impl ProviderClient for StaticProvider {
    fn provider_id(&self) -> &ProviderId {
        &self.id
    }

    fn coverage(&self) -> &[FieldGroup] {
        &self.coverage
    }

    async fn fetch(
        &self,
        _scope: &Scope,
        fields: &[Field],
        _as_of: DateTime<Utc>,
    ) -> Result<ProviderPayload, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut payload = self.response.clone()?;
        // Answer only what was asked, like a real per-group call.
        for item in &mut payload.items {
            item.fields.retain(|f, _| fields.contains(f));
        }
        Ok(payload)
    }
}
