use std::net::SocketAddr;

use anyhow::Context;

use terra_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    terra_observability::init();

    let config = AppConfig::from_env()?;

    let services = terra_api::app::build_services(&config).await?;
    let app = terra_api::app::build_app(services, Vec::new());

    let listener = tokio::net::TcpListener::bind(config.bind_addr.as_str())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
