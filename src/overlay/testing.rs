// src/overlay/testing.rs
//
// 测试用的记录型替身：渲染、上报、拉取、宿主桥接都只记下调用。

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::OverlayConfig;
use crate::error::{BridgeError, FetchError};
use crate::model::ad::{AdRecord, AdType, RawAdRecord};
use crate::overlay::controller::AdOverlay;
use crate::overlay::display::{AdRenderer, Region};
use crate::overlay::host_bridge::{HostBridge, HostLink};
use crate::overlay::source::{AdFetcher, FetchTicket, LoadOutcome};
use crate::overlay::telemetry::{AdEvent, AdEventKind, AdTelemetry};

pub fn test_config() -> OverlayConfig {
    OverlayConfig::default()
}

pub fn raw_ads(ids: &[&str]) -> Vec<RawAdRecord> {
    ids.iter()
        .map(|id| RawAdRecord {
            id: Some(id.to_string()),
            image_url: Some(format!("https://cdn.test/{id}.png")),
            target_url: Some(format!("https://shop.test/{id}")),
            ..RawAdRecord::default()
        })
        .collect()
}

#[derive(Debug, Default, Clone)]
pub struct RegionView {
    pub z_index: i32,
    pub visible: bool,
    pub ad_id: Option<String>,
    pub creations: u32,
}

#[derive(Debug, Default)]
pub struct RenderLog {
    pub regions: HashMap<Region, RegionView>,
    pub rendered: Vec<(Region, AdRecord)>,
    pub opened: Vec<String>,
}

#[derive(Clone, Default)]
pub struct RecordingRenderer(pub Rc<RefCell<RenderLog>>);

impl RecordingRenderer {
    pub fn rendered_ids(&self, region: Region) -> Vec<String> {
        self.0
            .borrow()
            .rendered
            .iter()
            .filter(|(r, _)| *r == region)
            .map(|(_, ad)| ad.id.clone())
            .collect()
    }

    pub fn rendered_images(&self, region: Region) -> Vec<String> {
        self.0
            .borrow()
            .rendered
            .iter()
            .filter(|(r, _)| *r == region)
            .map(|(_, ad)| ad.image_url.clone())
            .collect()
    }

    pub fn opened(&self) -> Vec<String> {
        self.0.borrow().opened.clone()
    }

    pub fn is_region_visible(&self, region: Region) -> bool {
        self.0.borrow().regions.get(&region).map(|v| v.visible).unwrap_or(false)
    }

    /// 模拟宿主页面把容器藏起来
    pub fn force_hidden(&self, region: Region) {
        if let Some(view) = self.0.borrow_mut().regions.get_mut(&region) {
            view.visible = false;
        }
    }
}

impl AdRenderer for RecordingRenderer {
    fn has_region(&self, region: Region) -> bool {
        self.0.borrow().regions.contains_key(&region)
    }

    fn create_region(&mut self, region: Region, z_index: i32) {
        let mut log = self.0.borrow_mut();
        let view = log.regions.entry(region).or_default();
        view.z_index = z_index;
        view.creations += 1;
    }

    fn render(&mut self, region: Region, ad: &AdRecord) {
        let mut log = self.0.borrow_mut();
        if let Some(view) = log.regions.get_mut(&region) {
            view.ad_id = Some(ad.id.clone());
        }
        log.rendered.push((region, ad.clone()));
    }

    fn clear(&mut self, region: Region) {
        if let Some(view) = self.0.borrow_mut().regions.get_mut(&region) {
            view.ad_id = None;
        }
    }

    fn set_visible(&mut self, region: Region, visible: bool) {
        if let Some(view) = self.0.borrow_mut().regions.get_mut(&region) {
            view.visible = visible;
        }
    }

    fn is_visible(&self, region: Region) -> bool {
        self.is_region_visible(region)
    }

    fn open_target(&mut self, url: &str) {
        self.0.borrow_mut().opened.push(url.to_string());
    }
}

#[derive(Clone, Default)]
pub struct RecordingTelemetry(pub Rc<RefCell<Vec<AdEvent>>>);

impl RecordingTelemetry {
    pub fn events(&self) -> Vec<AdEvent> {
        self.0.borrow().clone()
    }

    fn count(&self, kind: AdEventKind, ad_id: &str) -> usize {
        self.0
            .borrow()
            .iter()
            .filter(|e| e.kind == kind && e.ad_id == ad_id)
            .count()
    }

    pub fn impressions(&self, ad_id: &str) -> usize {
        self.count(AdEventKind::Impression, ad_id)
    }

    pub fn clicks(&self, ad_id: &str) -> usize {
        self.count(AdEventKind::Click, ad_id)
    }
}

impl AdTelemetry for RecordingTelemetry {
    fn report(&self, event: AdEvent) {
        self.0.borrow_mut().push(event);
    }
}

#[derive(Clone, Default)]
pub struct RecordingFetcher(pub Rc<RefCell<Vec<FetchTicket>>>);

impl RecordingFetcher {
    pub fn requests(&self, ad_type: AdType) -> usize {
        self.0.borrow().iter().filter(|t| t.ad_type == ad_type).count()
    }

    pub fn last(&self, ad_type: AdType) -> Option<FetchTicket> {
        self.0.borrow().iter().rev().find(|t| t.ad_type == ad_type).copied()
    }
}

impl AdFetcher for RecordingFetcher {
    fn request(&mut self, ticket: FetchTicket) {
        self.0.borrow_mut().push(ticket);
    }
}

#[derive(Clone, Default)]
pub struct RecordingBridge {
    sent: Rc<RefCell<Vec<(String, String)>>>,
    fail: bool,
}

impl RecordingBridge {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.borrow().clone()
    }
}

impl HostBridge for RecordingBridge {
    fn name(&self) -> &str {
        "recording"
    }

    fn send_message(&self, receiver: &str, command: &str) -> Result<(), BridgeError> {
        if self.fail {
            return Err(BridgeError::Send {
                receiver: receiver.to_string(),
                command: command.to_string(),
                reason: "unity instance not ready".to_string(),
            });
        }
        self.sent.borrow_mut().push((receiver.to_string(), command.to_string()));
        Ok(())
    }
}

/// 装配好替身的浮层
pub struct Harness {
    pub overlay: AdOverlay,
    pub renderer: RecordingRenderer,
    pub telemetry: RecordingTelemetry,
    pub fetcher: RecordingFetcher,
    pub bridge: RecordingBridge,
}

impl Harness {
    /// 宿主运行时已就绪
    pub fn new(config: OverlayConfig) -> Self {
        let mut harness = Self::detached(config);
        harness.overlay.attach_host(Box::new(harness.bridge.clone()));
        harness
    }

    /// 没有宿主运行时
    pub fn detached(config: OverlayConfig) -> Self {
        let renderer = RecordingRenderer::default();
        let telemetry = RecordingTelemetry::default();
        let fetcher = RecordingFetcher::default();
        let bridge = RecordingBridge::default();
        let host = HostLink::new(config.host.clone());
        let overlay = AdOverlay::new(
            config,
            Box::new(renderer.clone()),
            Box::new(telemetry.clone()),
            Box::new(fetcher.clone()),
            host,
            StdRng::seed_from_u64(7),
        );
        Self {
            overlay,
            renderer,
            telemetry,
            fetcher,
            bridge,
        }
    }

    /// 初始化并用给定广告应答两次初始拉取
    pub fn with_ads(config: OverlayConfig, banners: &[&str], fullscreen: &[&str]) -> Self {
        let mut harness = Self::new(config);
        harness.overlay.init();
        harness.answer(AdType::Banner, Ok(raw_ads(banners)));
        harness.answer(AdType::Fullscreen, Ok(raw_ads(fullscreen)));
        harness
    }

    /// 应答该类型最近一次拉取
    pub fn answer(
        &mut self,
        ad_type: AdType,
        result: Result<Vec<RawAdRecord>, FetchError>,
    ) -> LoadOutcome {
        let ticket = self
            .fetcher
            .last(ad_type)
            .expect("no fetch was requested for this ad type");
        self.overlay.on_ads_fetched(ticket, result)
    }

    pub fn advance(&mut self, by: Duration) {
        let target = self.overlay.now() + by;
        self.overlay.advance_to(target);
    }
}
