//! Vigilit - literature triage for pharmacovigilance safety review
//!
//! Articles ingested from literature sources are classified into safety
//! tracks, reviewed in allocated batches, and every workflow mutation is
//! recorded in the audit trail.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use vigilit::config::LogFormat;
use vigilit::db::{OrganizationRepository, RoleRepository};
use vigilit::models::{default_organization_uuid, Organization};
use vigilit::{api, auth_middleware, AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;

    // The guard must stay alive so file logs are flushed on shutdown
    let _log_guard = init_logging(&config);

    info!("Vigilit starting up");

    if config.auth.jwt_secret.is_empty() {
        anyhow::bail!("auth.jwt_secret must be configured (or set VIGILIT_JWT_SECRET)");
    }

    let db = vigilit::db::init_pool(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to initialize database")?;
    info!("Database initialized");

    seed_defaults(&db, &config).await?;

    let state = AppState::new(config.clone(), db);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address configuration")?;

    info!("Starting HTTP server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .await
        .context("HTTP server error")?;

    Ok(())
}

/// Ensure the default organization and its system roles exist
async fn seed_defaults(db: &vigilit::DbPool, config: &AppConfig) -> Result<()> {
    let orgs = OrganizationRepository::new(db);
    let roles = RoleRepository::new(db);

    let now = chrono::Utc::now();
    let default_org = Organization {
        id: default_organization_uuid(),
        name: "Default Organization".to_string(),
        slug: "default".to_string(),
        created_at: now,
        updated_at: now,
    };
    orgs.ensure(&default_org).await?;
    roles.seed_system_roles(default_org.id).await?;

    if let Some(super_org_id) = config.authorization.super_admin_org_id {
        let super_org = Organization {
            id: super_org_id,
            name: "Platform Administration".to_string(),
            slug: "platform-admin".to_string(),
            created_at: now,
            updated_at: now,
        };
        orgs.ensure(&super_org).await?;
        roles.seed_system_roles(super_org_id).await?;
    }

    Ok(())
}

fn create_router(state: AppState) -> Router {
    let api = api::public_routes().merge(api::protected_routes().layer(
        axum::middleware::from_fn_with_state(state.clone(), auth_middleware),
    ));

    Router::new()
        .nest("/api/v1", api)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

fn init_logging(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match &config.logging.file {
        Some(path) => {
            if let Some(dir) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(dir) {
                    eprintln!("Warning: Failed to create log directory {:?}: {}", dir, e);
                }
            }
            let file_appender = tracing_appender::rolling::never(
                path.parent().unwrap_or_else(|| std::path::Path::new(".")),
                path.file_name().unwrap_or_else(|| "vigilit.log".as_ref()),
            );
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            let registry = tracing_subscriber::registry().with(env_filter);
            match config.logging.format {
                LogFormat::Json => registry
                    .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                    .init(),
                LogFormat::Text => registry
                    .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                    .init(),
            }
            Some(guard)
        }
        None => {
            let registry = tracing_subscriber::registry().with(env_filter);
            match config.logging.format {
                LogFormat::Json => registry
                    .with(tracing_subscriber::fmt::layer().json())
                    .init(),
                LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
            }
            None
        }
    }
}
