// src/runtime.rs

//! 浮层主循环：唯一持有 `AdOverlay` 的任务。
//! 宿主命令、列表拉取回包、定时任务到期都在这里串行处理。

use std::future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::backend::host_webhook::HttpHostBridge;
use crate::error::FetchError;
use crate::logging::runtime_logger::RuntimeLogger;
use crate::model::ad::RawAdRecord;
use crate::overlay::source::{FetchTicket, LoadOutcome};
use crate::overlay::{AdOverlay, Diagnostics};

/// 宿主可以发给浮层的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayCommand {
    GameOver,
    ShowBanner,
    HideBanner,
    ShowFullscreen,
    CloseFullscreen,
    ClickBanner,
    ClickFullscreen,
    ReloadAds,
    AttachHost { callback_url: String },
    Diagnose,
}

impl OverlayCommand {
    pub fn name(&self) -> &'static str {
        match self {
            OverlayCommand::GameOver => "game_over",
            OverlayCommand::ShowBanner => "show_banner",
            OverlayCommand::HideBanner => "hide_banner",
            OverlayCommand::ShowFullscreen => "show_fullscreen",
            OverlayCommand::CloseFullscreen => "close_fullscreen",
            OverlayCommand::ClickBanner => "click_banner",
            OverlayCommand::ClickFullscreen => "click_fullscreen",
            OverlayCommand::ReloadAds => "reload_ads",
            OverlayCommand::AttachHost { .. } => "attach_host",
            OverlayCommand::Diagnose => "diagnose",
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub ok: bool,
    /// 仅 game over：这一次是否弹出了插屏
    #[serde(skip_serializing_if = "Option::is_none")]
    pub displayed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

impl CommandReply {
    pub fn applied(ok: bool) -> Self {
        Self {
            ok,
            displayed: None,
            diagnostics: None,
        }
    }
}

pub struct CommandRequest {
    pub command: OverlayCommand,
    pub reply: oneshot::Sender<CommandReply>,
}

/// 拉取任务完成后交回主循环的结果
pub type FetchCompletion = (FetchTicket, Result<Vec<RawAdRecord>, FetchError>);

/// 同步执行一条命令
pub fn dispatch(overlay: &mut AdOverlay, command: OverlayCommand) -> CommandReply {
    let ok = match command {
        OverlayCommand::GameOver => {
            let displayed = overlay.trigger_game_over();
            return CommandReply {
                ok: true,
                displayed: Some(displayed),
                diagnostics: None,
            };
        }
        OverlayCommand::ShowBanner => overlay.show_banner(),
        OverlayCommand::HideBanner => overlay.hide_banner(),
        OverlayCommand::ShowFullscreen => overlay.show_fullscreen_ad(),
        OverlayCommand::CloseFullscreen => overlay.close_fullscreen_ad(),
        OverlayCommand::ClickBanner => overlay.click_banner(),
        OverlayCommand::ClickFullscreen => overlay.click_fullscreen_ad(),
        OverlayCommand::ReloadAds => overlay.reload_ads(),
        OverlayCommand::AttachHost { callback_url } => match HttpHostBridge::new(&callback_url) {
            Ok(bridge) => {
                overlay.attach_host(Box::new(bridge));
                true
            }
            Err(e) => {
                warn!("rejecting host attach: {}", e);
                false
            }
        },
        OverlayCommand::Diagnose => {
            return CommandReply {
                ok: true,
                displayed: None,
                diagnostics: Some(overlay.diagnose()),
            };
        }
    };
    CommandReply::applied(ok)
}

/// 主循环的输入端
pub struct OverlayChannels {
    pub commands: mpsc::Receiver<CommandRequest>,
    pub fetches: mpsc::UnboundedReceiver<FetchCompletion>,
    pub shutdown: oneshot::Receiver<()>,
}

/// 运行浮层直到收到关闭信号或命令通道关闭。
///
/// 处理每个事件前先把调度器推进到真实流逝的时间，
/// 没有定时任务时只等外部事件。
pub async fn run_overlay(
    mut overlay: AdOverlay,
    channels: OverlayChannels,
    runtime_logger: Arc<RuntimeLogger>,
) {
    let OverlayChannels {
        mut commands,
        mut fetches,
        mut shutdown,
    } = channels;
    let epoch = Instant::now();

    overlay.init();
    runtime_logger.log("INFO", "overlay loop started").await;

    loop {
        let wake_at = overlay.next_deadline().map(|deadline| epoch + deadline);
        let timer = async move {
            match wake_at {
                Some(at) => sleep_until(at).await,
                None => future::pending::<()>().await,
            }
        };

        tokio::select! {
            request = commands.recv() => {
                overlay.advance_to(epoch.elapsed());
                let Some(CommandRequest { command, reply }) = request else {
                    info!("command channel closed, stopping overlay loop");
                    break;
                };
                let name = command.name();
                let outcome = dispatch(&mut overlay, command);
                debug!(command = name, ok = outcome.ok, "overlay command handled");
                if reply.send(outcome).is_err() {
                    debug!(command = name, "command caller went away before the reply");
                }
            }
            Some((ticket, result)) = fetches.recv() => {
                overlay.advance_to(epoch.elapsed());
                let failure = result.as_ref().err().map(|e| e.to_string());
                match overlay.on_ads_fetched(ticket, result) {
                    LoadOutcome::Loaded(count) => {
                        runtime_logger
                            .log("INFO", &format!("{} ads loaded: {}", ticket.ad_type, count))
                            .await;
                    }
                    LoadOutcome::Retrying { next_attempt } => {
                        runtime_logger
                            .log(
                                "WARN",
                                &format!(
                                    "{} ads fetch failed ({}), attempt {} scheduled",
                                    ticket.ad_type,
                                    failure.unwrap_or_default(),
                                    next_attempt
                                ),
                            )
                            .await;
                    }
                    LoadOutcome::FellBack => {
                        runtime_logger
                            .log("ERROR", &format!("{} ads unavailable, using fallback", ticket.ad_type))
                            .await;
                    }
                    LoadOutcome::Stale => {}
                }
            }
            _ = timer => {
                overlay.advance_to(epoch.elapsed());
            }
            _ = &mut shutdown => {
                info!("overlay loop received shutdown");
                break;
            }
        }
    }

    runtime_logger.log("INFO", "overlay loop stopped").await;
}
