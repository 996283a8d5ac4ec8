use ecocollect::{app::AppState, config::Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "ecocollect=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let app_state = AppState::new(&config).await?;
    app_state.run_migration().await?;

    let app = ecocollect::app::router(app_state);

    tracing::debug!("listening on {}", config.bind_addr);

    axum::Server::bind(&config.bind_addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
