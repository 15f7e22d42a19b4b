use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gridiron_core::domain::request::RecommendationRequest;
use gridiron_core::ingest::{ProviderClient, StaticProvider};
use gridiron_core::policy::AdvisorConfig;
use gridiron_core::time::season;
use gridiron_core::Advisor;

#[derive(Debug, Parser)]
#[command(name = "gridiron_worker")]
struct Args {
    /// Recommendation request (JSON).
    #[arg(long)]
    request: PathBuf,

    /// Advisor config (JSON). Falls back to ADVISOR_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serve provider data from a fixture file instead of HTTP. Repeatable.
    #[arg(long = "fixture")]
    fixtures: Vec<PathBuf>,

    /// Override the request's as-of time (RFC 3339 or YYYY-MM-DD).
    #[arg(long)]
    as_of: Option<String>,

    /// Pretty-print the output.
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = gridiron_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(p) => p.clone(),
        None => PathBuf::from(settings.require_advisor_config_path()?),
    };
    let config = AdvisorConfig::load(&config_path)
        .with_context(|| format!("load advisor config {}", config_path.display()))?;

    let providers: Vec<Arc<dyn ProviderClient>> = if args.fixtures.is_empty() {
        gridiron_core::ingest::build_http_providers(&config)?
    } else {
        let mut out: Vec<Arc<dyn ProviderClient>> = Vec::with_capacity(args.fixtures.len());
        for path in &args.fixtures {
            out.push(Arc::new(StaticProvider::load(path)?));
        }
        out
    };
    tracing::info!(
        providers = providers.len(),
        offline = !args.fixtures.is_empty(),
        "providers ready"
    );

    let advisor = Advisor::from_config(config, providers)?;

    let text = std::fs::read_to_string(&args.request)
        .with_context(|| format!("failed to read request {}", args.request.display()))?;
    let mut request: RecommendationRequest =
        serde_json::from_str(&text).context("request is not a valid RecommendationRequest")?;
    if let Some(as_of) = args.as_of.as_deref() {
        request.context.as_of = season::resolve_as_of(Some(as_of), chrono::Utc::now())?;
    }

    match advisor.advise(&request).await {
        Ok(set) => {
            let out = if args.pretty {
                serde_json::to_string_pretty(&set)?
            } else {
                serde_json::to_string(&set)?
            };
            println!("{out}");
            tracing::info!(request_id = %set.request_id, recommendations = set.recommendations.len(), "run complete");
            Ok(())
        }
        Err(err) => {
            let kind = err.kind();
            let err = anyhow::Error::new(err).context(format!("recommendation run failed ({kind})"));
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(request_id = %request.id, error = %format!("{err:#}"), "recommendation run failed");
            Err(err)
        }
    }
}

fn init_sentry(settings: &gridiron_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
