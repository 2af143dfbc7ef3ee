use delivery_proxy::api;
use delivery_proxy::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "delivery_proxy=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    api::serve(config).await
}
