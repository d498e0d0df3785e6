use box_manifest::api::{self, ApiState};
use box_manifest::config::AppConfig;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env may set RUST_LOG.
    let dotenv_result = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "box_manifest=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(err) = dotenv_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!("⚠️ Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();
    let store = app_config.store.open();
    info!(
        "📂 Orders: {}, manifest: {}",
        store.input_path().display(),
        store.output_path().display()
    );

    info!("🚀 Box manifest service starting...");
    let state = ApiState::new(app_config.manifest.run_config(), store);
    api::start_api_server(app_config.api.clone(), state).await?;
    Ok(())
}
