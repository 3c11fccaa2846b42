// src/overlay/context.rs

use crate::config::OverlayConfig;
use crate::model::ad::AdInventory;
use crate::overlay::display::DisplayContainers;
use crate::overlay::host_bridge::HostLink;
use crate::overlay::telemetry::AdTelemetry;
use crate::scheduler::Scheduler;

/// 浮层共享状态。由 `AdOverlay` 独占持有，
/// 以 `&mut` 的形式传给轮播、插屏和数据源。
pub struct OverlayContext {
    pub config: OverlayConfig,
    /// 当前的横幅 / 全屏广告列表
    pub inventory: AdInventory,
    pub scheduler: Scheduler,
    pub display: DisplayContainers,
    pub telemetry: Box<dyn AdTelemetry>,
    pub host: HostLink,
}
