// src/api/snapshot.rs

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::model::ad::AdRecord;
use crate::overlay::display::{AdRenderer, Region};

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegionSnapshot {
    pub created: bool,
    pub z_index: i32,
    pub visible: bool,
    pub ad: Option<AdRecord>,
}

/// 最近一次要求页面打开的落地页；`seq` 每次递增，页面据此判断是否为新跳转
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigation {
    pub url: String,
    pub seq: u64,
}

/// **浮层画面快照**：页面适配层轮询它来绘制两个容器
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlaySnapshot {
    pub banner: RegionSnapshot,
    pub fullscreen: RegionSnapshot,
    pub navigation: Option<Navigation>,
}

impl OverlaySnapshot {
    pub fn region(&self, region: Region) -> &RegionSnapshot {
        match region {
            Region::Banner => &self.banner,
            Region::Fullscreen => &self.fullscreen,
        }
    }

    pub fn region_mut(&mut self, region: Region) -> &mut RegionSnapshot {
        match region {
            Region::Banner => &mut self.banner,
            Region::Fullscreen => &mut self.fullscreen,
        }
    }
}

/// 把渲染指令写进 watch 通道的渲染器
pub struct SnapshotRenderer {
    snapshot: Arc<watch::Sender<OverlaySnapshot>>,
}

impl SnapshotRenderer {
    pub fn new(snapshot: Arc<watch::Sender<OverlaySnapshot>>) -> Self {
        Self { snapshot }
    }

    fn update(&self, region: Region, apply: impl FnOnce(&mut RegionSnapshot)) {
        self.snapshot.send_modify(|snapshot| apply(snapshot.region_mut(region)));
    }
}

impl AdRenderer for SnapshotRenderer {
    fn has_region(&self, region: Region) -> bool {
        self.snapshot.borrow().region(region).created
    }

    fn create_region(&mut self, region: Region, z_index: i32) {
        self.update(region, |view| {
            *view = RegionSnapshot {
                created: true,
                z_index,
                ..RegionSnapshot::default()
            };
        });
    }

    fn render(&mut self, region: Region, ad: &AdRecord) {
        let ad = ad.clone();
        self.update(region, |view| view.ad = Some(ad));
    }

    fn clear(&mut self, region: Region) {
        self.update(region, |view| view.ad = None);
    }

    fn set_visible(&mut self, region: Region, visible: bool) {
        self.update(region, |view| view.visible = visible);
    }

    fn is_visible(&self, region: Region) -> bool {
        self.snapshot.borrow().region(region).visible
    }

    fn open_target(&mut self, url: &str) {
        let url = url.to_string();
        self.snapshot.send_modify(|snapshot| {
            let seq = snapshot.navigation.as_ref().map(|n| n.seq + 1).unwrap_or(1);
            snapshot.navigation = Some(Navigation { url, seq });
        });
    }
}
