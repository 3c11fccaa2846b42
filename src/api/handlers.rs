// src/api/handlers.rs

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::api::snapshot::OverlaySnapshot;
use crate::api::AppState;
use crate::overlay::display::Region;
use crate::runtime::{CommandReply, CommandRequest, OverlayCommand};

/// 把命令交给浮层主循环并等待结果；主循环已退出时返回 None
pub async fn submit(
    commands: &mpsc::Sender<CommandRequest>,
    command: OverlayCommand,
) -> Option<CommandReply> {
    let (reply, done) = oneshot::channel();
    commands.send(CommandRequest { command, reply }).await.ok()?;
    done.await.ok()
}

async fn overlay_unavailable(state: &AppState, command: &str) -> Response {
    warn!(command, "overlay loop is not running");
    state
        .runtime_logger
        .log("ERROR", &format!("command {} dropped: overlay loop unavailable", command))
        .await;
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "ok": false, "error": "overlay loop unavailable" })),
    )
        .into_response()
}

/// **执行宿主命令**：200 已执行，409 被拒绝，503 主循环不可用
async fn run_command(state: &AppState, command: OverlayCommand) -> Response {
    let name = command.name();
    match submit(&state.commands, command).await {
        Some(reply) => {
            let status = if reply.ok { StatusCode::OK } else { StatusCode::CONFLICT };
            (status, Json(reply)).into_response()
        }
        None => overlay_unavailable(state, name).await,
    }
}

pub async fn handle_game_over(State(state): State<Arc<AppState>>) -> Response {
    run_command(&state, OverlayCommand::GameOver).await
}

pub async fn handle_show_banner(State(state): State<Arc<AppState>>) -> Response {
    run_command(&state, OverlayCommand::ShowBanner).await
}

pub async fn handle_hide_banner(State(state): State<Arc<AppState>>) -> Response {
    run_command(&state, OverlayCommand::HideBanner).await
}

pub async fn handle_show_fullscreen(State(state): State<Arc<AppState>>) -> Response {
    run_command(&state, OverlayCommand::ShowFullscreen).await
}

pub async fn handle_close_fullscreen(State(state): State<Arc<AppState>>) -> Response {
    run_command(&state, OverlayCommand::CloseFullscreen).await
}

pub async fn handle_click_banner(State(state): State<Arc<AppState>>) -> Response {
    run_command(&state, OverlayCommand::ClickBanner).await
}

pub async fn handle_click_fullscreen(State(state): State<Arc<AppState>>) -> Response {
    run_command(&state, OverlayCommand::ClickFullscreen).await
}

pub async fn handle_reload_ads(State(state): State<Arc<AppState>>) -> Response {
    run_command(&state, OverlayCommand::ReloadAds).await
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AttachRequest {
    pub callback_url: String,
}

/// 宿主运行时就绪后登记回调地址
pub async fn handle_attach_host(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AttachRequest>,
) -> Response {
    run_command(
        &state,
        OverlayCommand::AttachHost {
            callback_url: body.callback_url,
        },
    )
    .await
}

pub async fn handle_diagnostics(State(state): State<Arc<AppState>>) -> Response {
    match submit(&state.commands, OverlayCommand::Diagnose).await {
        Some(CommandReply {
            diagnostics: Some(diagnostics),
            ..
        }) => (StatusCode::OK, Json(diagnostics)).into_response(),
        _ => overlay_unavailable(&state, "diagnose").await,
    }
}

pub async fn handle_overlay_state(State(state): State<Arc<AppState>>) -> Json<OverlaySnapshot> {
    let snapshot = state.snapshot.borrow().clone();
    Json(snapshot)
}

#[derive(Deserialize, Debug)]
pub struct VisibilityReport {
    pub region: Region,
    pub visible: bool,
}

/// 页面上报容器的实际可见性，供可见性巡检纠正
pub async fn handle_visibility_report(
    State(state): State<Arc<AppState>>,
    Json(report): Json<VisibilityReport>,
) -> Json<serde_json::Value> {
    state.snapshot.send_modify(|snapshot| {
        snapshot.region_mut(report.region).visible = report.visible;
    });
    Json(json!({ "ok": true }))
}

pub async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}
