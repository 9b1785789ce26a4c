//! The binary entry point for the portal backend.

use std::sync::Arc;
use std::time::Duration;

use app_core::config::{Config, DeploymentTarget};
use app_core::middleware::request_response_logger;
use app_core::oauth::{FederatedProviders, GoogleProvider};
use app_core::password::{Argon2Hasher, Hasher};
use app_core::storage::BlobStore;
use app_core::storage::local::LocalBlobStore;
use axum::http::StatusCode;
use axum::{Json, Router, middleware};
use base64::Engine as _;
use base64::engine::general_purpose;
use portal::{IdentityService, LocalIdentity, MemoryRecordStore, RecordStore};
use tokio::signal;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_cookies::{CookieManagerLayer, Key};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(fmt::format::FmtSpan::CLOSE),
        )
        .init();

    if let Err(err) = run().await {
        panic!("❌ Portal failed to start: {err}");
    }
}

/// Wires the identity, record and storage backends and serves the API.
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Reloads automatically when the file changes.
    let config = Arc::new(
        Config::builder("config/config.yaml")
            .watch_interval(Duration::from_secs(5))
            .watch()
            .build()?,
    );

    let base_url = config.base_url()?;
    let public_url = config.public_url()?;
    let deployment = config.deployment_target()?;
    tracing::info!(%deployment, %base_url, %public_url, "configuration loaded");

    // Identity provider and record store. Emailed links point at this API.
    let hasher: Arc<dyn Hasher> = Arc::new(Argon2Hasher::new());
    let identity: Arc<dyn IdentityService> = Arc::new(LocalIdentity::new(hasher, public_url));
    let records: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());

    // Cookie encryption key, 64 bytes base64 encoded.
    let secret = general_purpose::STANDARD.decode(config.get::<String>("session.secret")?)?;
    let cookie_key = Key::try_from(secret.as_slice())?;

    // Federated sign-in providers.
    let mut providers = FederatedProviders::new();
    if let Ok(client_id) = config.get::<String>("oauth.google.client_id") {
        let client_secret = config.get("oauth.google.client_secret")?;
        let redirect_uri = config.get("oauth.google.redirect_uri")?;
        providers.register("google", Arc::new(GoogleProvider::new(client_id, client_secret, redirect_uri)?));
    }
    tracing::info!(providers = ?providers.names(), "federated providers registered");

    // Credential document storage.
    let base_path: String = config.get("storage.local.base_path")?;
    let files_url: String = config.get("storage.local.base_url")?;
    let files = LocalBlobStore::new(base_path, files_url);
    let blob: Arc<dyn BlobStore> = Arc::new(files.clone());

    let portal_state = portal::new(portal::Dependency {
        config: config.clone(),
        identity,
        records,
        blob,
        providers,
        cookie_key,
    });

    let timeout_secs = Duration::from_secs(config.get::<u64>("server.timeout_secs")?);
    let mut app = with_document_files(Router::new(), &files)
        .merge(portal::create_router(portal_state))
        .method_not_allowed_fallback(|| async {
            (
                StatusCode::METHOD_NOT_ALLOWED,
                Json(serde_json::json!({"message": "Method not allowed"})),
            )
        });

    app = match deployment {
        DeploymentTarget::StaticExport => {
            let static_dir: String = config.get_or("app.static_dir", "out".to_string())?;
            tracing::info!(%static_dir, "serving exported front-end");
            app.fallback_service(ServeDir::new(static_dir))
        }
        DeploymentTarget::Standalone => app.fallback(|| async {
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"message": "Endpoint not found"})),
            )
        }),
    };

    let app = app.layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(request_response_logger))
            .layer(CookieManagerLayer::new())
            .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
            .layer(RequestDecompressionLayer::new())
            .layer(CompressionLayer::new())
            .layer(TimeoutLayer::new(timeout_secs)),
    );

    let server_address = config.get::<String>("server.address")?;
    let listener = tokio::net::TcpListener::bind(&server_address).await?;

    tracing::info!("🚀 listening on {}", listener.local_addr()?);

    let (shutdown_tx, _) = broadcast::channel(1);
    spawn_shutdown_listener(shutdown_tx.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_tx.subscribe().recv().await.ok();
            tracing::info!("🛑 Server is shutting down gracefully...");
        })
        .await?;

    Ok(())
}

/// Serves stored documents at the path of `storage.local.base_url`.
fn with_document_files(app: Router, files: &LocalBlobStore) -> Router {
    match files.mount_path() {
        "/" => {
            tracing::warn!("storage.local.base_url has no path, documents are not served");
            app
        }
        mount => {
            tracing::info!(mount, base_path = %files.base_path().display(), "serving stored documents");
            app.nest_service(mount, ServeDir::new(files.base_path()))
        }
    }
}

/// Spawns a background task to listen for system shutdown signals.
fn spawn_shutdown_listener(shutdown_tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => { tracing::info!("🔻 Received SIGINT (Ctrl+C)")},
            _ = terminate => { tracing::info!("🔻 Received SIGTERM")},
        }

        if shutdown_tx.send(()).is_err() {
            tracing::error!("Failed to send shutdown signal");
        }
    });
}
