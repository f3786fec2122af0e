use crate::api::api_router;
use crate::channel_ws::channel_router;
use crate::state::AppState;
/// HTTP server: spawns axum on a background tokio task.
use axum::Router;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api_router())
        .merge(channel_router())
        .fallback(crate::api::not_found)
        .layer(cors)
        .with_state(state)
}

/// Bind and serve in the background. Returns the bound port and a sender
/// that stops the server when `true` is sent.
pub async fn spawn_server(
    state: AppState,
) -> Result<(u16, watch::Sender<bool>), Box<dyn std::error::Error>> {
    let port = state.port;
    let bind_addr = state.bind_address.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind_addr, port)).await?;
    let actual_port = listener.local_addr()?.port();

    log::info!(
        target: "taskboard.server",
        "HTTP server listening on http://{}:{}",
        bind_addr,
        actual_port
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        // A dropped sender means nobody can stop us; serve until the process exits.
        let shutdown = async move {
            if shutdown_rx.wait_for(|stop| *stop).await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            log::error!(target: "taskboard.server", "HTTP server exited with error: {}", e);
        }
    });

    Ok((actual_port, shutdown_tx))
}
