use backend::{AppState, config::Config, create_router};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backend=debug,tower_http=info,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    let state = AppState::from_config(&config).expect("build upstream clients");
    tracing::info!(
        "geocoding via {}, routing via {} ({})",
        config.nominatim_url,
        config.ors_url,
        config.ors_profile
    );
    let app = create_router(state);

    tracing::info!("starting backend on http://{}", config.listen);
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .expect("bind listen address");
    axum::serve(listener, app).await.expect("serve http");
}
