use grouppulse_whiteboard::config::env_parse;
use grouppulse_whiteboard::storage::{DEFAULT_QUOTA_BYTES, LocalStore};
use grouppulse_whiteboard::{ChannelConfig, routes, state};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");
    let quota = env_parse("WHITEBOARD_STORAGE_QUOTA_BYTES", DEFAULT_QUOTA_BYTES);
    let config = ChannelConfig::from_env();

    tracing::info!(
        quota,
        throttle_ms = config.throttle.as_millis(),
        resync_ms = config.resync.as_millis(),
        heartbeat_ms = config.heartbeat.as_millis(),
        "whiteboard channel configured"
    );

    let state = state::AppState::new(LocalStore::with_quota(quota), config);
    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "grouppulse whiteboard gateway listening");
    axum::serve(listener, app).await.expect("server failed");
}
