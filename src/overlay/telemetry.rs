// src/overlay/telemetry.rs

use serde::Serialize;

use crate::config::OverlayConfig;
use crate::model::ad::{AdRecord, AdType};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AdEventKind {
    Impression,
    Click,
}

impl AdEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdEventKind::Impression => "impression",
            AdEventKind::Click => "click",
        }
    }

    pub fn endpoint<'a>(&self, config: &'a OverlayConfig) -> &'a str {
        match self {
            AdEventKind::Impression => &config.endpoints.impression,
            AdEventKind::Click => &config.endpoints.click,
        }
    }
}

/// 上报给后端的事件，序列化后即请求体 `{"adId", "type"}`
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdEvent {
    #[serde(skip)]
    pub kind: AdEventKind,
    pub ad_id: String,
    #[serde(rename = "type")]
    pub ad_type: AdType,
}

impl AdEvent {
    pub fn impression(ad: &AdRecord) -> Self {
        Self {
            kind: AdEventKind::Impression,
            ad_id: ad.id.clone(),
            ad_type: ad.ad_type,
        }
    }

    pub fn click(ad: &AdRecord) -> Self {
        Self {
            kind: AdEventKind::Click,
            ad_id: ad.id.clone(),
            ad_type: ad.ad_type,
        }
    }
}

/// 展示 / 点击上报。发出即忘：失败只记日志，不重试，也不阻塞展示。
pub trait AdTelemetry {
    fn report(&self, event: AdEvent);
}
