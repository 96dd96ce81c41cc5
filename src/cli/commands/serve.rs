use clap::Args;
use std::sync::Arc;

use crate::app::{app, AppState};
use crate::auth::JwtVerifier;
use crate::config;
use crate::database::{DatabaseManager, PgSessionStore};
use crate::observer::InvalidationPipeline;

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    #[arg(long, help = "Port to listen on (overrides SCOPSY_API_PORT/PORT)")]
    pub port: Option<u16>,

    #[arg(long, help = "Apply pending migrations before serving")]
    pub migrate: bool,
}

pub async fn handle(args: ServeArgs) -> anyhow::Result<()> {
    let config = config::config();
    tracing::info!("Starting Scopsy API in {:?} mode", config.environment);

    if crate::is_development!() && config.security.jwt_secret.is_empty() {
        tracing::warn!("SUPABASE_JWT_SECRET is not set; mint tokens with `token` after setting it");
    }

    let pool = DatabaseManager::connect(&config.database)?;

    if args.migrate || config.database.run_migrations {
        // The server still comes up without a database; /health reports it
        if let Err(e) = DatabaseManager::migrate(&pool).await {
            tracing::error!("Migrations not applied: {}", e);
        }
    }

    let observers = InvalidationPipeline::from_config(&config.revalidation)?;
    tracing::info!("View invalidation via {} observer(s)", observers.len());

    let state = AppState::new(
        Arc::new(PgSessionStore::new(pool)),
        observers,
        JwtVerifier::from_config(&config.security),
    );
    let router = app(state, config);

    let port = args.port.unwrap_or(config.api.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", bind_addr, e))?;

    tracing::info!("Scopsy API listening on http://{}", bind_addr);

    axum::serve(listener, router).await?;
    Ok(())
}
