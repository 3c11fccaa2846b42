// src/overlay/rotator.rs

use std::mem;

use tracing::{debug, info};

use crate::overlay::context::OverlayContext;
use crate::overlay::display::Region;
use crate::overlay::telemetry::AdEvent;
use crate::scheduler::{Task, TimerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPhase {
    Stopped,
    Running { timer: TimerId },
}

/// **横幅轮播**
///
/// 同一时刻最多只有一个轮播定时器；`current_index` 在停止后保留。
#[derive(Debug)]
pub struct BannerRotator {
    current_index: usize,
    phase: RotationPhase,
}

impl Default for BannerRotator {
    fn default() -> Self {
        Self::new()
    }
}

impl BannerRotator {
    pub fn new() -> Self {
        Self {
            current_index: 0,
            phase: RotationPhase::Stopped,
        }
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, RotationPhase::Running { .. })
    }

    /// 展示当前横幅并开始轮播。列表为空时什么都不做，返回 false。
    pub fn start(&mut self, ctx: &mut OverlayContext) -> bool {
        self.cancel_timer(ctx);
        let len = ctx.inventory.banners.len();
        if len == 0 {
            debug!("no banners available to display");
            return false;
        }
        self.current_index %= len;
        self.display_current(ctx);

        let timer = ctx
            .scheduler
            .schedule_every(ctx.config.banner_rotation_interval(), Task::RotateBanner);
        self.phase = RotationPhase::Running { timer };
        info!(
            interval_ms = ctx.config.banner_rotation_interval_ms,
            banners = len,
            "banner rotation started"
        );
        true
    }

    pub fn stop(&mut self, ctx: &mut OverlayContext) {
        if self.cancel_timer(ctx) {
            info!("banner rotation stopped");
        }
        ctx.display.hide(Region::Banner);
    }

    pub fn tick(&mut self, ctx: &mut OverlayContext, timer: TimerId) {
        if self.phase != (RotationPhase::Running { timer }) {
            debug!("ignoring tick from a cancelled rotation timer");
            return;
        }
        let len = ctx.inventory.banners.len();
        if len == 0 {
            debug!("banner list is empty, nothing to rotate");
            return;
        }
        self.current_index = (self.current_index + 1) % len;
        self.display_current(ctx);
    }

    /// 点击当前横幅：上报点击，然后打开落地页
    pub fn click(&self, ctx: &mut OverlayContext) -> bool {
        let Some(ad) = ctx.display.visible_ad(Region::Banner).cloned() else {
            debug!("banner click ignored, no banner is visible");
            return false;
        };
        ctx.telemetry.report(AdEvent::click(&ad));
        ctx.display.open_target(&ad.target_url);
        info!(ad_id = %ad.id, "banner clicked");
        true
    }

    fn display_current(&self, ctx: &mut OverlayContext) {
        let Some(ad) = ctx.inventory.banners.get(self.current_index).cloned() else {
            return;
        };
        ctx.display.show(Region::Banner, &ad);
        ctx.telemetry.report(AdEvent::impression(&ad));
        debug!(ad_id = %ad.id, index = self.current_index, "banner displayed");
    }

    fn cancel_timer(&mut self, ctx: &mut OverlayContext) -> bool {
        match mem::replace(&mut self.phase, RotationPhase::Stopped) {
            RotationPhase::Running { timer } => ctx.scheduler.cancel(timer),
            RotationPhase::Stopped => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::model::ad::AdType;
    use crate::overlay::display::Region;
    use crate::overlay::testing::{raw_ads, test_config, Harness};

    #[test]
    fn displays_in_order_and_wraps() {
        let config = test_config();
        let interval = config.banner_rotation_interval();
        let mut h = Harness::with_ads(config, &["A", "B", "C"], &[]);

        h.advance(interval * 3);
        assert_eq!(h.renderer.rendered_ids(Region::Banner), vec!["A", "B", "C", "A"]);
        assert_eq!(h.overlay.diagnose().current_banner_index, 0);

        h.advance(interval);
        assert_eq!(h.overlay.diagnose().current_banner_index, 1);
    }

    #[test]
    fn one_impression_per_display() {
        let config = test_config();
        let interval = config.banner_rotation_interval();
        let mut h = Harness::with_ads(config, &["A", "B"], &[]);
        h.advance(interval * 3);
        // A, B, A, B
        assert_eq!(h.telemetry.impressions("A"), 2);
        assert_eq!(h.telemetry.impressions("B"), 2);
    }

    #[test]
    fn restarting_never_leaves_two_timers() {
        let config = test_config();
        let interval = config.banner_rotation_interval();
        let mut h = Harness::with_ads(config, &["A", "B", "C"], &[]);
        assert!(h.overlay.show_banner());
        assert!(h.overlay.show_banner());
        let before = h.renderer.rendered_ids(Region::Banner).len();

        h.advance(interval);
        assert_eq!(h.renderer.rendered_ids(Region::Banner).len(), before + 1);
    }

    #[test]
    fn stop_hides_and_cancels() {
        let config = test_config();
        let interval = config.banner_rotation_interval();
        let mut h = Harness::with_ads(config, &["A", "B"], &[]);
        assert!(h.overlay.hide_banner());
        assert!(!h.overlay.display_state().is_banner_visible);

        h.advance(interval * 4);
        assert_eq!(h.renderer.rendered_ids(Region::Banner), vec!["A"]);

        assert!(h.overlay.show_banner());
        assert!(h.overlay.display_state().is_banner_visible);
    }

    #[test]
    fn emptied_list_turns_ticks_into_noops() {
        let config = test_config();
        let interval = config.banner_rotation_interval();
        let mut h = Harness::with_ads(config, &["A", "B"], &[]);

        h.overlay.load_ads(AdType::Banner);
        h.answer(AdType::Banner, Ok(Vec::new()));
        h.advance(interval * 2);

        assert_eq!(h.renderer.rendered_ids(Region::Banner), vec!["A"]);
        assert!(h.overlay.display_state().is_banner_visible);
    }

    #[test]
    fn shrunk_list_keeps_index_in_range() {
        let config = test_config();
        let interval = config.banner_rotation_interval();
        let mut h = Harness::with_ads(config, &["A", "B", "C"], &[]);
        h.advance(interval * 2);
        assert_eq!(h.overlay.diagnose().current_banner_index, 2);

        h.overlay.load_ads(AdType::Banner);
        h.answer(AdType::Banner, Ok(raw_ads(&["X", "Y"])));
        h.advance(interval);
        assert_eq!(h.overlay.diagnose().current_banner_index, 1);
        assert_eq!(h.renderer.rendered_ids(Region::Banner).last().unwrap(), "Y");
    }

    #[test]
    fn click_reports_and_opens_target() {
        let mut h = Harness::with_ads(test_config(), &["A"], &[]);
        assert!(h.overlay.click_banner());
        assert_eq!(h.telemetry.clicks("A"), 1);
        assert_eq!(h.renderer.opened(), vec!["https://shop.test/A"]);

        h.overlay.hide_banner();
        assert!(!h.overlay.click_banner());
    }

    #[test]
    fn start_without_banners_is_refused() {
        let mut h = Harness::with_ads(test_config(), &[], &[]);
        assert!(!h.overlay.show_banner());
        assert!(!h.overlay.diagnose().rotation_running);
    }

    proptest! {
        #[test]
        fn n_ticks_return_to_the_starting_ad(len in 1usize..8, offset in 0usize..8) {
            let config = test_config();
            let interval = config.banner_rotation_interval();
            let ids: Vec<String> = (0..len).map(|i| format!("ad{i}")).collect();
            let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
            let mut h = Harness::with_ads(config, &refs, &[]);

            h.advance(interval * offset as u32);
            let start = h.overlay.diagnose().current_banner_index;
            h.advance(interval * len as u32);
            prop_assert_eq!(h.overlay.diagnose().current_banner_index, start);
        }
    }
}
