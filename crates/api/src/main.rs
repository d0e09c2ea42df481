use std::sync::Arc;

use anyhow::Context;

use ledger_api::app::{self, services::AppServices};
use ledger_api::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("invalid configuration")?;
    ledger_observability::init(settings.log_format);

    let services = AppServices::connect(&settings)
        .await
        .context("failed to open the ledger database")?;
    let app = app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
