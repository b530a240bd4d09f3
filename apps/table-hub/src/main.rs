use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use table_hub::config::Config;
use table_hub::gateway::Hub;
use table_hub::ledger::EventBridge;
use table_hub::query::{HttpStateQuery, Personalizer, StateQuery};
use table_hub::AppState;

#[tokio::main]
async fn main() {
    // Load .env if present; variables may also come from the environment.
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let query: Arc<dyn StateQuery> = Arc::new(HttpStateQuery::new(&config.state_query_url));
    let personalizer = Personalizer::new(query, config.query_timeout);
    let (hub, hub_task) = Hub::spawn(personalizer);

    let bridge = EventBridge::new(
        config.tendermint_ws_url.clone(),
        hub.clone(),
        config.upstream_retry,
    )
    .spawn();

    tracing::info!(
        state_query_url = %config.state_query_url,
        tendermint_ws = %config.tendermint_ws_url,
        "table-hub configured"
    );

    let state = AppState {
        hub,
        config: Arc::new(config),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(table_hub::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "table-hub listening");
    tracing::info!("websocket endpoint: ws://localhost:{port}/ws");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
    }

    bridge.abort();
    hub_task.abort();
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
