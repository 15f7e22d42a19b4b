use crate::domain::entity::ProviderId;
use crate::domain::observation::{Field, FieldGroup};
use crate::domain::request::Scope;
use crate::error::ProviderError;
use crate::ingest::types::ProviderPayload;
use crate::policy::ProviderEndpoint;
use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use std::time::Duration;

const RETRY_BASE_BACKOFF_MS: u64 = 200;

/// One external data source. Every provider is driven through this interface regardless of
/// transport.
#[async_trait::async_trait]
pub trait ProviderClient: Send + Sync {
    fn provider_id(&self) -> &ProviderId;

    fn coverage(&self) -> &[FieldGroup];

    async fn fetch(
        &self,
        scope: &Scope,
        fields: &[Field],
        as_of: DateTime<Utc>,
    ) -> Result<ProviderPayload, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonProvider {
    id: ProviderId,
    coverage: Vec<FieldGroup>,
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
    retries: u32,
}

impl HttpJsonProvider {
    pub fn from_endpoint(endpoint: &ProviderEndpoint, timeout: Duration) -> anyhow::Result<Self> {
        let api_key = match endpoint.api_key_env.as_deref() {
            Some(var) => Some(
                std::env::var(var)
                    .with_context(|| format!("{var} is required for provider {}", endpoint.id))?,
            ),
            None => None,
        };

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build provider http client")?;

        Ok(Self {
            id: endpoint.id.clone(),
            coverage: endpoint.coverage.clone(),
            http,
            base_url: endpoint.base_url.clone(),
            api_key,
            path: endpoint.path.clone(),
            retries: endpoint.retries.max(1),
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            let value = HeaderValue::from_str(api_key).map_err(|_| ProviderError::Unauthorized)?;
            headers.insert("x-api-key", value);
        }
        Ok(headers)
    }

    async fn fetch_once(
        &self,
        scope: &Scope,
        fields: &[Field],
        as_of: DateTime<Utc>,
    ) -> Result<ProviderPayload, ProviderError> {
        let mut query = scope_query(scope);
        query.push(("fields", join_fields(fields)));
        query.push(("as_of", as_of.to_rfc3339()));

        let res = self
            .http
            .get(self.url())
            .headers(self.headers()?)
            .query(&query)
            .send()
            .await
            .map_err(classify_transport)?;

        if let Some(err) = classify_status(res.status()) {
            return Err(err);
        }

        let text = res.text().await.map_err(classify_transport)?;
        let parsed = serde_json::from_str::<ProviderPayload>(&text)
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        self.validate(parsed)
    }

    fn validate(&self, mut payload: ProviderPayload) -> Result<ProviderPayload, ProviderError> {
        if payload.provider != self.id {
            return Err(ProviderError::Malformed(format!(
                "payload claims provider {}, expected {}",
                payload.provider, self.id
            )));
        }

        let before = payload.items.len();
        payload.items.retain(|item| item.is_valid());
        let dropped = before - payload.items.len();
        if dropped > 0 {
            tracing::warn!(provider = %self.id, dropped, "dropped items without id or name");
        }
        Ok(payload)
    }
}

#[async_trait::async_trait]
impl ProviderClient for HttpJsonProvider {
    fn provider_id(&self) -> &ProviderId {
        &self.id
    }

    fn coverage(&self) -> &[FieldGroup] {
        &self.coverage
    }

    async fn fetch(
        &self,
        scope: &Scope,
        fields: &[Field],
        as_of: DateTime<Utc>,
    ) -> Result<ProviderPayload, ProviderError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(scope, fields, as_of).await {
                Ok(payload) => return Ok(payload),
                // Only transport failures are worth retrying.
                Err(ProviderError::Transport(detail)) if attempt < self.retries => {
                    let backoff = Duration::from_millis(RETRY_BASE_BACKOFF_MS << (attempt - 1));
                    tracing::warn!(provider = %self.id, attempt, ?backoff, error = %detail, "provider fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn scope_query(scope: &Scope) -> Vec<(&'static str, String)> {
    match scope {
        Scope::Entities { keys } => vec![(
            "keys",
            keys.iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(","),
        )],
        Scope::Roster { team_key } => vec![("team_key", team_key.clone())],
        Scope::FreeAgents { position } => {
            let mut out = vec![("status", "FA".to_string())];
            if let Some(p) = position {
                if let Ok(serde_json::Value::String(s)) = serde_json::to_value(p) {
                    out.push(("position", s));
                }
            }
            out
        }
    }
}

fn join_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn classify_status(status: StatusCode) -> Option<ProviderError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Unauthorized,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderError::Timeout,
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            ProviderError::Transport(format!("HTTP {s}"))
        }
        s => ProviderError::Malformed(format!("HTTP {s}")),
    })
}

fn classify_transport(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else if err.is_decode() {
        ProviderError::Malformed(err.to_string())
    } else {
        ProviderError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{CanonicalKey, Position};

    fn endpoint(path: &str) -> ProviderEndpoint {
        ProviderEndpoint {
            id: ProviderId::new("sleeper"),
            base_url: "https://api.example.test/".to_string(),
            path: path.to_string(),
            api_key_env: None,
            coverage: vec![FieldGroup::Usage, FieldGroup::Health],
            retries: 2,
        }
    }

    #[test]
    fn builds_url_with_or_without_leading_slash() {
        let a = HttpJsonProvider::from_endpoint(&endpoint("/v1/obs"), Duration::from_secs(1))
            .unwrap();
        let b = HttpJsonProvider::from_endpoint(&endpoint("v1/obs"), Duration::from_secs(1))
            .unwrap();
        assert_eq!(a.url(), "https://api.example.test/v1/obs");
        assert_eq!(a.url(), b.url());
    }

    #[test]
    fn missing_api_key_env_fails_at_construction() {
        let mut e = endpoint("/v1/obs");
        e.api_key_env = Some("GRIDIRON_TEST_KEY_THAT_IS_NOT_SET".to_string());
        assert!(HttpJsonProvider::from_endpoint(&e, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn classifies_http_statuses() {
        assert_eq!(classify_status(StatusCode::OK), None);
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            Some(ProviderError::Unauthorized)
        );
        assert_eq!(
            classify_status(StatusCode::GATEWAY_TIMEOUT),
            Some(ProviderError::Timeout)
        );
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY),
            Some(ProviderError::Transport(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND),
            Some(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn scope_query_encodes_each_scope() {
        let q = scope_query(&Scope::Entities {
            keys: vec![CanonicalKey::new("a"), CanonicalKey::new("b")],
        });
        assert_eq!(q, vec![("keys", "a,b".to_string())]);

        let q = scope_query(&Scope::FreeAgents {
            position: Some(Position::Te),
        });
        assert_eq!(
            q,
            vec![("status", "FA".to_string()), ("position", "TE".to_string())]
        );
    }

    #[test]
    fn validate_rejects_foreign_payload_and_drops_invalid_items() {
        let p = HttpJsonProvider::from_endpoint(&endpoint("/v1/obs"), Duration::from_secs(1))
            .unwrap();
        let payload: ProviderPayload = serde_json::from_value(serde_json::json!({
            "provider": "sleeper",
            "fetched_at": "2026-10-16T11:00:00Z",
            "items": [
                {"raw_id": "1", "name": "A"},
                {"raw_id": " ", "name": "B"}
            ]
        }))
        .unwrap();
        assert_eq!(p.validate(payload.clone()).unwrap().items.len(), 1);

        let mut foreign = payload;
        foreign.provider = ProviderId::new("yahoo");
        assert!(matches!(
            p.validate(foreign),
            Err(ProviderError::Malformed(_))
        ));
    }
}
