pub mod fixture;
pub mod provider;
pub mod types;

pub use fixture::StaticProvider;
pub use provider::{HttpJsonProvider, ProviderClient};

use crate::policy::AdvisorConfig;
use std::sync::Arc;
use std::time::Duration;

/// Builds one HTTP client per configured provider endpoint.
pub fn build_http_providers(config: &AdvisorConfig) -> anyhow::Result<Vec<Arc<dyn ProviderClient>>> {
    let timeout = Duration::from_millis(config.provider_timeout_ms);
    let mut out: Vec<Arc<dyn ProviderClient>> = Vec::with_capacity(config.providers.len());
    for endpoint in &config.providers {
        out.push(Arc::new(HttpJsonProvider::from_endpoint(endpoint, timeout)?));
    }
    Ok(out)
}
