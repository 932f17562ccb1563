//! The browser front end: an axum router serving server-rendered pages.

pub mod error;
pub mod pages;
pub mod render;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use error::AppError;
pub use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::index))
        .route("/player", post(pages::set_player))
        .route("/realm/:topic", post(pages::enter_realm))
        .route("/leave-realm", post(pages::leave_realm))
        .route("/journal", post(pages::toggle_journal))
        .route("/chapter/:difficulty", post(pages::start_chapter))
        .route("/answer", post(pages::answer))
        .route("/next", post(pages::next_question))
        .route("/retry", post(pages::retry_chapter))
        .route("/leave-chapter", post(pages::leave_chapter))
        .route("/reset", post(pages::reset))
        .route("/api/report", get(pages::report))
        .route("/health", get(pages::health))
        .fallback(pages::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl+C or SIGTERM.
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = state.config.bind_addr();
    let app = router(state);
    let listener = TcpListener::bind(addr).await?;
    info!("ManabiFun listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
