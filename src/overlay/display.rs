// src/overlay/display.rs

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::overlay_config::ZIndexConfig;
use crate::model::ad::AdRecord;

/// 两个展示区域
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Banner,
    Fullscreen,
}

impl Region {
    pub const ALL: [Region; 2] = [Region::Banner, Region::Fullscreen];

    /// 页面上对应容器的元素 id
    pub fn element_id(&self) -> &'static str {
        match self {
            Region::Banner => "ad-banner-container",
            Region::Fullscreen => "ad-fullscreen-container",
        }
    }
}

/// 渲染适配层。状态机只发出"在某区域展示某广告"的指令，
/// 具体怎么画由实现者决定。
pub trait AdRenderer {
    fn has_region(&self, region: Region) -> bool;
    fn create_region(&mut self, region: Region, z_index: i32);
    fn render(&mut self, region: Region, ad: &AdRecord);
    fn clear(&mut self, region: Region);
    fn set_visible(&mut self, region: Region, visible: bool);
    /// 实际观测到的可见性，可能被宿主页面改掉
    fn is_visible(&self, region: Region) -> bool;
    /// 在新窗口打开落地页
    fn open_target(&mut self, url: &str);
}

/// 期望的可见状态，两个区域互不影响
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DisplayState {
    pub is_banner_visible: bool,
    pub is_fullscreen_visible: bool,
}

impl DisplayState {
    pub fn is_visible(&self, region: Region) -> bool {
        match region {
            Region::Banner => self.is_banner_visible,
            Region::Fullscreen => self.is_fullscreen_visible,
        }
    }

    fn set(&mut self, region: Region, visible: bool) {
        match region {
            Region::Banner => self.is_banner_visible = visible,
            Region::Fullscreen => self.is_fullscreen_visible = visible,
        }
    }
}

/// 展示容器：区域只创建一次，之后复用
pub struct DisplayContainers {
    renderer: Box<dyn AdRenderer>,
    z_index: ZIndexConfig,
    state: DisplayState,
    banner_ad: Option<AdRecord>,
    fullscreen_ad: Option<AdRecord>,
}

impl DisplayContainers {
    pub fn new(renderer: Box<dyn AdRenderer>, z_index: ZIndexConfig) -> Self {
        Self {
            renderer,
            z_index,
            state: DisplayState::default(),
            banner_ad: None,
            fullscreen_ad: None,
        }
    }

    pub fn state(&self) -> DisplayState {
        self.state
    }

    pub fn has_region(&self, region: Region) -> bool {
        self.renderer.has_region(region)
    }

    fn z_index_of(&self, region: Region) -> i32 {
        match region {
            Region::Banner => self.z_index.banner,
            Region::Fullscreen => self.z_index.fullscreen,
        }
    }

    fn slot_mut(&mut self, region: Region) -> &mut Option<AdRecord> {
        match region {
            Region::Banner => &mut self.banner_ad,
            Region::Fullscreen => &mut self.fullscreen_ad,
        }
    }

    pub fn ensure_regions(&mut self) {
        for region in Region::ALL {
            if self.renderer.has_region(region) {
                debug!(region = region.element_id(), "container already exists, reusing");
            } else {
                self.renderer.create_region(region, self.z_index_of(region));
                info!(region = region.element_id(), "container created");
            }
        }
    }

    /// 展示广告；容器丢失时重新创建
    pub fn show(&mut self, region: Region, ad: &AdRecord) {
        if !self.renderer.has_region(region) {
            warn!(region = region.element_id(), "container not found, recreating");
            self.renderer.create_region(region, self.z_index_of(region));
        }
        self.renderer.render(region, ad);
        self.renderer.set_visible(region, true);
        self.state.set(region, true);
        *self.slot_mut(region) = Some(ad.clone());
    }

    pub fn hide(&mut self, region: Region) {
        if self.renderer.has_region(region) {
            self.renderer.set_visible(region, false);
            if region == Region::Fullscreen {
                self.renderer.clear(region);
            }
        }
        self.state.set(region, false);
        *self.slot_mut(region) = None;
    }

    /// 当前可见区域里的广告（点击事件绑定在它上面）
    pub fn visible_ad(&self, region: Region) -> Option<&AdRecord> {
        if !self.state.is_visible(region) {
            return None;
        }
        match region {
            Region::Banner => self.banner_ad.as_ref(),
            Region::Fullscreen => self.fullscreen_ad.as_ref(),
        }
    }

    pub fn open_target(&mut self, url: &str) {
        self.renderer.open_target(url);
    }

    /// 应该可见却被改成不可见的区域，重新设为可见。返回修正的区域数。
    pub fn correct_visibility(&mut self) -> usize {
        let mut corrected = 0;
        for region in Region::ALL {
            if self.state.is_visible(region) && !self.renderer.is_visible(region) {
                warn!(region = region.element_id(), "container is not visible, correcting");
                if !self.renderer.has_region(region) {
                    self.renderer.create_region(region, self.z_index_of(region));
                    if let Some(ad) = self.slot_mut(region).clone() {
                        self.renderer.render(region, &ad);
                    }
                }
                self.renderer.set_visible(region, true);
                corrected += 1;
            }
        }
        corrected
    }
}
