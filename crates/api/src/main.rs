use std::env;

use anyhow::{Context, Result};
use visitgate_api::{build_app, AppConfig};
use visitgate_observability::{init_tracing, LogTarget};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("visitgate_api", LogTarget::Stdout);

    let bind = env::var("VISITGATE_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let config = AppConfig::from_env();
    let base_url = config.enrichment.base_url.clone();
    let model = config.enrichment.model.clone();

    let app = build_app(config)?;

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    tracing::info!(
        bind = %bind,
        enrichment_base_url = %base_url,
        enrichment_model = %model,
        "visitgate intake api started; enrichment is required and has no fallback"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
