// src/api/mod.rs

pub mod handlers;
pub mod snapshot;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::{mpsc, watch};

use crate::logging::runtime_logger::RuntimeLogger;
use crate::runtime::CommandRequest;
use snapshot::OverlaySnapshot;

/// HTTP 层共享状态
pub struct AppState {
    pub commands: mpsc::Sender<CommandRequest>,
    pub snapshot: Arc<watch::Sender<OverlaySnapshot>>,
    pub runtime_logger: Arc<RuntimeLogger>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/commands/game-over", post(handlers::handle_game_over))
        .route("/commands/show-banner", post(handlers::handle_show_banner))
        .route("/commands/hide-banner", post(handlers::handle_hide_banner))
        .route("/commands/show-fullscreen", post(handlers::handle_show_fullscreen))
        .route("/commands/close-fullscreen", post(handlers::handle_close_fullscreen))
        .route("/commands/click-banner", post(handlers::handle_click_banner))
        .route("/commands/click-fullscreen", post(handlers::handle_click_fullscreen))
        .route("/commands/reload-ads", post(handlers::handle_reload_ads))
        .route("/host/attach", post(handlers::handle_attach_host))
        .route("/diagnostics", get(handlers::handle_diagnostics))
        .route("/overlay/state", get(handlers::handle_overlay_state))
        .route("/overlay/visibility", post(handlers::handle_visibility_report))
        .route("/health", get(handlers::handle_health))
        .with_state(state)
}
