// src/overlay/interstitial.rs

use std::mem;

use rand::Rng;
use tracing::{debug, info};

use crate::model::ad::AdRecord;
use crate::overlay::context::OverlayContext;
use crate::overlay::display::Region;
use crate::overlay::telemetry::AdEvent;
use crate::scheduler::{Task, TimerId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterstitialPhase {
    Idle,
    Showing { ad: AdRecord, dismiss_timer: TimerId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissReason {
    Timeout,
    Closed,
    Clicked,
}

/// **全屏插屏控制器**
///
/// 每累计 `game_over_threshold` 次 game over 展示一次全屏广告。
/// 展示期间暂停游戏，关闭（超时、手动关闭、点击）只会执行一次。
#[derive(Debug)]
pub struct InterstitialController {
    game_over_count: u32,
    phase: InterstitialPhase,
}

impl Default for InterstitialController {
    fn default() -> Self {
        Self::new()
    }
}

impl InterstitialController {
    pub fn new() -> Self {
        Self {
            game_over_count: 0,
            phase: InterstitialPhase::Idle,
        }
    }

    pub fn game_over_count(&self) -> u32 {
        self.game_over_count
    }

    pub fn is_showing(&self) -> bool {
        matches!(self.phase, InterstitialPhase::Showing { .. })
    }

    pub fn on_game_over<R: Rng>(&mut self, ctx: &mut OverlayContext, rng: &mut R) -> bool {
        self.game_over_count += 1;
        let threshold = ctx.config.game_over_threshold;
        info!(count = self.game_over_count, threshold, "game over");
        if self.game_over_count < threshold {
            return false;
        }
        self.game_over_count = 0;
        self.show(ctx, rng)
    }

    /// 随机挑一个全屏广告展示。正在展示或列表为空时直接忽略。
    pub fn show<R: Rng>(&mut self, ctx: &mut OverlayContext, rng: &mut R) -> bool {
        if self.is_showing() {
            debug!("fullscreen ad already showing, request dropped");
            return false;
        }
        let ads = &ctx.inventory.fullscreen;
        if ads.is_empty() {
            info!("no fullscreen ads available");
            return false;
        }
        let ad = ads[rng.gen_range(0..ads.len())].clone();

        ctx.host.pause_game();
        ctx.display.show(Region::Fullscreen, &ad);
        ctx.telemetry.report(AdEvent::impression(&ad));
        let dismiss_timer = ctx
            .scheduler
            .schedule_once(ctx.config.fullscreen_duration(), Task::DismissFullscreen);
        info!(ad_id = %ad.id, duration_ms = ctx.config.fullscreen_duration_ms, "fullscreen ad displayed");
        self.phase = InterstitialPhase::Showing { ad, dismiss_timer };
        true
    }

    pub fn on_dismiss_timer(&mut self, ctx: &mut OverlayContext, timer: TimerId) {
        match &self.phase {
            InterstitialPhase::Showing { dismiss_timer, .. } if *dismiss_timer == timer => {
                self.dismiss(ctx, DismissReason::Timeout);
            }
            _ => debug!("ignoring a stale dismiss timer"),
        }
    }

    pub fn close(&mut self, ctx: &mut OverlayContext) -> bool {
        self.dismiss(ctx, DismissReason::Closed).is_some()
    }

    /// 点击广告：上报点击、关闭插屏、打开落地页
    pub fn click(&mut self, ctx: &mut OverlayContext) -> bool {
        let ad = match &self.phase {
            InterstitialPhase::Showing { ad, .. } => ad.clone(),
            InterstitialPhase::Idle => return false,
        };
        ctx.telemetry.report(AdEvent::click(&ad));
        self.dismiss(ctx, DismissReason::Clicked);
        ctx.display.open_target(&ad.target_url);
        true
    }

    fn dismiss(&mut self, ctx: &mut OverlayContext, reason: DismissReason) -> Option<AdRecord> {
        match mem::replace(&mut self.phase, InterstitialPhase::Idle) {
            InterstitialPhase::Idle => None,
            InterstitialPhase::Showing { ad, dismiss_timer } => {
                ctx.scheduler.cancel(dismiss_timer);
                ctx.display.hide(Region::Fullscreen);
                ctx.host.resume_game();
                info!(ad_id = %ad.id, ?reason, "fullscreen ad closed");
                Some(ad)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use crate::overlay::display::Region;
    use crate::overlay::testing::{test_config, Harness};

    fn pause_resume(h: &Harness) -> Vec<String> {
        h.bridge.sent().into_iter().map(|(_, command)| command).collect()
    }

    #[test]
    fn threshold_game_overs_show_exactly_one_ad() {
        let mut h = Harness::with_ads(test_config(), &[], &["F"]);
        let shown: Vec<bool> = (0..5).map(|_| h.overlay.trigger_game_over()).collect();
        assert_eq!(shown, vec![false, false, false, false, true]);
        assert_eq!(h.telemetry.impressions("F"), 1);
        assert_eq!(h.overlay.diagnose().game_over_count, 0);
        assert!(h.overlay.display_state().is_fullscreen_visible);
    }

    #[test]
    fn one_short_of_threshold_shows_nothing() {
        let mut h = Harness::with_ads(test_config(), &[], &["F"]);
        for _ in 0..4 {
            h.overlay.trigger_game_over();
        }
        assert_eq!(h.telemetry.impressions("F"), 0);
        assert_eq!(h.overlay.diagnose().game_over_count, 4);
        assert!(!h.overlay.display_state().is_fullscreen_visible);
    }

    #[test]
    fn show_while_showing_is_a_noop() {
        let mut h = Harness::with_ads(test_config(), &[], &["F", "G"]);
        h.overlay.trigger_game_over();
        h.overlay.trigger_game_over();
        assert!(h.overlay.show_fullscreen_ad());
        let state = h.overlay.display_state();
        let events = h.telemetry.events().len();

        assert!(!h.overlay.show_fullscreen_ad());
        assert_eq!(h.overlay.display_state(), state);
        assert_eq!(h.overlay.diagnose().game_over_count, 2);
        assert_eq!(h.telemetry.events().len(), events);
        assert_eq!(pause_resume(&h), vec!["PauseGame"]);
    }

    #[test]
    fn auto_dismiss_resumes_the_game() {
        let config = test_config();
        let duration = config.fullscreen_duration();
        let mut h = Harness::with_ads(config, &[], &["F"]);
        assert!(h.overlay.show_fullscreen_ad());

        h.advance(duration - Duration::from_millis(1));
        assert!(h.overlay.display_state().is_fullscreen_visible);
        h.advance(Duration::from_millis(1));
        assert!(!h.overlay.display_state().is_fullscreen_visible);
        assert_eq!(pause_resume(&h), vec!["PauseGame", "ResumeGame"]);
    }

    #[test]
    fn explicit_close_cancels_the_timer() {
        let config = test_config();
        let duration = config.fullscreen_duration();
        let mut h = Harness::with_ads(config, &[], &["F"]);
        h.overlay.show_fullscreen_ad();
        assert!(h.overlay.close_fullscreen_ad());
        assert!(!h.overlay.close_fullscreen_ad());

        h.advance(duration * 2);
        assert_eq!(pause_resume(&h), vec!["PauseGame", "ResumeGame"]);
    }

    #[test]
    fn close_then_new_show_is_not_cut_short_by_the_old_timer() {
        let config = test_config();
        let duration = config.fullscreen_duration();
        let mut h = Harness::with_ads(config, &[], &["F"]);
        h.overlay.show_fullscreen_ad();
        h.advance(duration / 2);
        h.overlay.close_fullscreen_ad();
        h.overlay.show_fullscreen_ad();

        h.advance(duration / 2);
        assert!(h.overlay.display_state().is_fullscreen_visible);
        h.advance(duration / 2);
        assert!(!h.overlay.display_state().is_fullscreen_visible);
    }

    #[test]
    fn click_reports_dismisses_and_opens() {
        let mut h = Harness::with_ads(test_config(), &[], &["F"]);
        h.overlay.show_fullscreen_ad();
        assert!(h.overlay.click_fullscreen_ad());
        assert_eq!(h.telemetry.clicks("F"), 1);
        assert!(!h.overlay.display_state().is_fullscreen_visible);
        assert_eq!(h.renderer.opened(), vec!["https://shop.test/F"]);
        assert_eq!(pause_resume(&h), vec!["PauseGame", "ResumeGame"]);
        assert!(!h.overlay.click_fullscreen_ad());
    }

    #[test]
    fn empty_list_shows_nothing_but_still_resets_counter() {
        let mut h = Harness::with_ads(test_config(), &[], &[]);
        for _ in 0..5 {
            assert!(!h.overlay.trigger_game_over());
        }
        assert_eq!(h.overlay.diagnose().game_over_count, 0);
        assert!(pause_resume(&h).is_empty());
        assert!(h.renderer.rendered_ids(Region::Fullscreen).is_empty());
    }

    #[test]
    fn works_without_a_host_runtime() {
        let mut h = Harness::detached(test_config());
        h.overlay.init();
        h.answer(crate::model::ad::AdType::Fullscreen, Ok(crate::overlay::testing::raw_ads(&["F"])));
        assert!(h.overlay.show_fullscreen_ad());
        assert!(h.overlay.display_state().is_fullscreen_visible);
        assert!(h.overlay.close_fullscreen_ad());
    }

    proptest! {
        #[test]
        fn shows_once_per_threshold(threshold in 1u32..8, rounds in 1u32..4) {
            let mut config = test_config();
            config.game_over_threshold = threshold;
            let mut h = Harness::with_ads(config, &[], &["F"]);
            let mut shown = 0;
            for _ in 0..threshold * rounds {
                if h.overlay.trigger_game_over() {
                    shown += 1;
                    h.overlay.close_fullscreen_ad();
                }
            }
            prop_assert_eq!(shown, rounds);
            prop_assert_eq!(h.overlay.diagnose().game_over_count, 0);
        }
    }
}
