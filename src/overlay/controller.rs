// src/overlay/controller.rs

use std::time::Duration;

use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::OverlayConfig;
use crate::error::FetchError;
use crate::model::ad::{AdInventory, AdType, RawAdRecord};
use crate::overlay::context::OverlayContext;
use crate::overlay::display::{AdRenderer, DisplayContainers, DisplayState, Region};
use crate::overlay::host_bridge::{HostBridge, HostLink};
use crate::overlay::interstitial::InterstitialController;
use crate::overlay::rotator::BannerRotator;
use crate::overlay::source::{AdDataSource, AdFetcher, FetchTicket, LoadOutcome};
use crate::overlay::telemetry::AdTelemetry;
use crate::scheduler::{Scheduler, Task, TimerId};

/// 诊断信息
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub banners_loaded: usize,
    pub fullscreen_loaded: usize,
    pub banners_loading: bool,
    pub fullscreen_loading: bool,
    pub banner_region_created: bool,
    pub fullscreen_region_created: bool,
    pub display: DisplayState,
    pub rotation_running: bool,
    pub current_banner_index: usize,
    pub game_over_count: u32,
    pub game_over_threshold: u32,
    pub interstitial_showing: bool,
    pub host_attached: bool,
    pub game_paused: bool,
    pub pending_timers: usize,
    pub uptime_ms: u64,
}

/// **广告浮层控制器**
///
/// 持有全部状态，对外暴露宿主可调用的入口。所有方法都在同一个任务上调用。
pub struct AdOverlay {
    ctx: OverlayContext,
    source: AdDataSource,
    rotator: BannerRotator,
    interstitial: InterstitialController,
    rng: StdRng,
    banner_enabled: bool,
    visibility_timer: Option<TimerId>,
}

impl AdOverlay {
    pub fn new(
        config: OverlayConfig,
        renderer: Box<dyn AdRenderer>,
        telemetry: Box<dyn AdTelemetry>,
        fetcher: Box<dyn AdFetcher>,
        host: HostLink,
        rng: StdRng,
    ) -> Self {
        let display = DisplayContainers::new(renderer, config.z_index);
        Self {
            ctx: OverlayContext {
                config,
                inventory: AdInventory::default(),
                scheduler: Scheduler::new(),
                display,
                telemetry,
                host,
            },
            source: AdDataSource::new(fetcher),
            rotator: BannerRotator::new(),
            interstitial: InterstitialController::new(),
            rng,
            banner_enabled: false,
            visibility_timer: None,
        }
    }

    /// 创建容器、拉取两份广告列表、开启可见性巡检
    pub fn init(&mut self) {
        info!("initializing ad overlay");
        self.ctx.display.ensure_regions();
        self.banner_enabled = true;
        for ad_type in AdType::ALL {
            self.source.load(&mut self.ctx, ad_type);
        }
        if self.visibility_timer.is_none() {
            let timer = self.ctx.scheduler.schedule_every(
                self.ctx.config.visibility_check_interval(),
                Task::CheckVisibility,
            );
            self.visibility_timer = Some(timer);
        }
    }

    pub fn load_ads(&mut self, ad_type: AdType) {
        self.source.load(&mut self.ctx, ad_type);
    }

    pub fn reload_ads(&mut self) -> bool {
        for ad_type in AdType::ALL {
            self.load_ads(ad_type);
        }
        true
    }

    pub fn on_ads_fetched(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<RawAdRecord>, FetchError>,
    ) -> LoadOutcome {
        let outcome = self.source.on_fetched(&mut self.ctx, ticket, result);
        let installed = matches!(outcome, LoadOutcome::Loaded(n) if n > 0)
            || outcome == LoadOutcome::FellBack;
        if ticket.ad_type == AdType::Banner
            && installed
            && self.banner_enabled
            && !self.rotator.is_running()
        {
            self.rotator.start(&mut self.ctx);
        }
        outcome
    }

    pub fn trigger_game_over(&mut self) -> bool {
        self.interstitial.on_game_over(&mut self.ctx, &mut self.rng)
    }

    pub fn show_banner(&mut self) -> bool {
        self.banner_enabled = true;
        self.rotator.start(&mut self.ctx)
    }

    pub fn hide_banner(&mut self) -> bool {
        self.banner_enabled = false;
        self.rotator.stop(&mut self.ctx);
        true
    }

    pub fn show_fullscreen_ad(&mut self) -> bool {
        self.interstitial.show(&mut self.ctx, &mut self.rng)
    }

    pub fn close_fullscreen_ad(&mut self) -> bool {
        self.interstitial.close(&mut self.ctx)
    }

    pub fn click_banner(&mut self) -> bool {
        self.rotator.click(&mut self.ctx)
    }

    pub fn click_fullscreen_ad(&mut self) -> bool {
        self.interstitial.click(&mut self.ctx)
    }

    pub fn attach_host(&mut self, bridge: Box<dyn HostBridge>) {
        self.ctx.host.attach_runtime(bridge);
    }

    /// 执行所有在 `now` 之前到期的任务
    pub fn advance_to(&mut self, now: Duration) {
        while let Some((id, task)) = self.ctx.scheduler.pop_due(now) {
            self.run_task(id, task);
        }
        self.ctx.scheduler.settle(now);
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.ctx.scheduler.next_deadline()
    }

    pub fn diagnose(&self) -> Diagnostics {
        Diagnostics {
            banners_loaded: self.ctx.inventory.banners.len(),
            fullscreen_loaded: self.ctx.inventory.fullscreen.len(),
            banners_loading: self.source.is_loading(AdType::Banner),
            fullscreen_loading: self.source.is_loading(AdType::Fullscreen),
            banner_region_created: self.ctx.display.has_region(Region::Banner),
            fullscreen_region_created: self.ctx.display.has_region(Region::Fullscreen),
            display: self.ctx.display.state(),
            rotation_running: self.rotator.is_running(),
            current_banner_index: self.rotator.current_index(),
            game_over_count: self.interstitial.game_over_count(),
            game_over_threshold: self.ctx.config.game_over_threshold,
            interstitial_showing: self.interstitial.is_showing(),
            host_attached: self.ctx.host.is_runtime_attached(),
            game_paused: self.ctx.host.is_paused(),
            pending_timers: self.ctx.scheduler.pending(),
            uptime_ms: self.ctx.scheduler.now().as_millis() as u64,
        }
    }

    fn run_task(&mut self, id: TimerId, task: Task) {
        match task {
            Task::RotateBanner => self.rotator.tick(&mut self.ctx, id),
            Task::DismissFullscreen => self.interstitial.on_dismiss_timer(&mut self.ctx, id),
            Task::RetryFetch(ad_type) => self.source.retry(ad_type, id),
            Task::CheckVisibility => {
                let corrected = self.ctx.display.correct_visibility();
                if corrected > 0 {
                    warn!(corrected, "ad containers were hidden by the page, visibility restored");
                }
            }
        }
    }
}

/// 测试用的只读访问
#[cfg(test)]
impl AdOverlay {
    pub fn now(&self) -> Duration {
        self.ctx.scheduler.now()
    }

    pub fn is_loading(&self, ad_type: AdType) -> bool {
        self.source.is_loading(ad_type)
    }

    pub fn inventory(&self) -> &AdInventory {
        &self.ctx.inventory
    }

    pub fn display_state(&self) -> DisplayState {
        self.ctx.display.state()
    }
}
