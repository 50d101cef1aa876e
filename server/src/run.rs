//! Refill server entrypoint: load config, open persistence, initialize
//! providers, start the HTTP listener and (if enabled) the reconciliation
//! monitor, and shut both down together on SIGTERM/SIGINT (spec §6.5).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use jsonwebtoken::Algorithm;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use refill_core::alerts;
use refill_core::envelope::EnvelopeConfig;
use refill_core::handlers::{self, AppState};
use refill_core::util::SigDown;
use refill_core::{Monitor, MonitorConfig, PgCatalog};
use refill_providers::{ProviderRegistry, ProviderSettings};

use crate::config::{Config, Secrets};
use crate::db;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .expect("failed to initialize rustls crypto provider");

    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::load()?;
    let secrets = Secrets::load_from_env(&config)?;

    let pool = db::connect(&secrets.database_url).await?;
    let catalog: Arc<dyn refill_core::Catalog> = Arc::new(PgCatalog::new(pool));

    let provider_settings = config
        .providers
        .iter()
        .map(|(name, public)| {
            let credentials = secrets
                .provider_credentials
                .get(name)
                .cloned()
                .unwrap_or_else(|| serde_json::json!({}));
            ProviderSettings::new(name.clone(), public.base_url.clone(), credentials)
        })
        .collect();
    let registry = ProviderRegistry::initialize(provider_settings).await?;
    let registry = Arc::new(registry);

    let envelope = EnvelopeConfig {
        auth_enabled: config.auth_enabled,
        jwt_max_lifetime_in_seconds: config.jwt_max_lifetime_in_seconds,
        auth_public_key_pem: secrets.auth_public_key_pem,
        callback_private_key_pem: secrets.callback_private_key_pem,
        algorithm: Algorithm::RS256,
    };

    let alert_sink = alerts::from_webhook_url(config.slack_webhook_url.as_deref());

    let state = AppState {
        catalog: catalog.clone(),
        providers: registry.clone(),
        envelope,
    };

    let http_endpoints: Router = handlers::routes().with_state(state).layer(TraceLayer::new_for_http()).layer(
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any),
    );

    let addr = SocketAddr::new(config.host, config.server_port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("failed to bind to {addr}: {e}"))?;

    let sig_down = SigDown::try_new()?;

    let monitor = Arc::new(Monitor::new(
        catalog,
        registry.all(),
        alert_sink,
        MonitorConfig {
            interval: Duration::from_millis(config.cron_interval_in_ms),
            pending_alert_threshold: Duration::from_secs(config.pending_alert_threshold_in_seconds),
            max_concurrency: 8,
        },
    ));
    if config.cron_enabled {
        monitor.start(sig_down.cancellation_token());
    }

    tracing::info!("starting refill server at http://{addr}");
    let shutdown_token = sig_down.cancellation_token();
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await?;

    if config.cron_enabled {
        monitor.stop().await;
    }

    Ok(())
}
