pub mod advisor;
pub mod aggregate;
pub mod domain;
pub mod engine;
pub mod error;
pub mod freshness;
pub mod ingest;
pub mod policy;
pub mod resolve;
pub mod time;

#[cfg(test)]
pub(crate) mod testutil;

pub use advisor::Advisor;
pub use error::{CoreError, ProviderError};

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub advisor_config_path: Option<String>,
        pub sentry_dsn: Option<String>,
        pub port: Option<u16>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let port = match std::env::var("PORT") {
                Ok(v) => Some(v.parse::<u16>().with_context(|| format!("PORT is not a valid port: {v}"))?),
                Err(_) => None,
            };

            Ok(Self {
                advisor_config_path: std::env::var("ADVISOR_CONFIG").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                port,
            })
        }

        pub fn require_advisor_config_path(&self) -> anyhow::Result<&str> {
            self.advisor_config_path
                .as_deref()
                .context("ADVISOR_CONFIG is required")
        }
    }
}
