// src/model/ad.rs

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::OverlayConfig;
use crate::error::FetchError;

/// 广告类型：横幅 / 全屏插屏
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AdType {
    Banner,
    Fullscreen,
}

impl AdType {
    pub const ALL: [AdType; 2] = [AdType::Banner, AdType::Fullscreen];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdType::Banner => "banner",
            AdType::Fullscreen => "fullscreen",
        }
    }
}

impl fmt::Display for AdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 后端返回的原始广告记录。
/// 老版本后端用 `linkUrl`，新版本用 `targetUrl`，两者都可能缺失。
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawAdRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub ad_type: Option<String>,
}

/// 列表接口的两种返回格式：裸数组，或 `{"ads": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum AdListPayload {
    Bare(Vec<RawAdRecord>),
    Wrapped { ads: Vec<RawAdRecord> },
}

/// 解析列表接口的响应体（simd-json 会原地改写缓冲区）
pub fn decode_ad_list(body: &mut [u8]) -> Result<Vec<RawAdRecord>, FetchError> {
    let payload: AdListPayload =
        simd_json::serde::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))?;
    Ok(match payload {
        AdListPayload::Bare(ads) => ads,
        AdListPayload::Wrapped { ads } => ads,
    })
}

/// **规范化后的广告记录**，拉取之后不可变
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdRecord {
    pub id: String,
    pub image_url: String,
    pub target_url: String,
    #[serde(rename = "type")]
    pub ad_type: AdType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl AdRecord {
    /// 缺图片或跳转地址时用配置里的兜底值；缺 id 的记录直接丢弃
    pub fn from_raw(raw: RawAdRecord, ad_type: AdType, config: &OverlayConfig) -> Option<Self> {
        let id = non_empty(raw.id)?;
        let image_url =
            non_empty(raw.image_url).unwrap_or_else(|| config.fallback_image_url.clone());
        let target_url = non_empty(raw.target_url)
            .or_else(|| non_empty(raw.link_url))
            .unwrap_or_else(|| config.fallback_target_url.clone());
        Some(Self {
            id,
            image_url,
            target_url,
            ad_type,
            title: non_empty(raw.title),
        })
    }

    /// 重试耗尽后使用的占位广告
    pub fn fallback(ad_type: AdType, config: &OverlayConfig) -> Self {
        Self {
            id: format!("fallback-{}", ad_type),
            image_url: config.fallback_image_url.clone(),
            target_url: config.fallback_target_url.clone(),
            ad_type,
            title: None,
        }
    }
}

/// 批量规范化，被丢弃的记录记一条 warn
pub fn normalize_ads(raw: Vec<RawAdRecord>, ad_type: AdType, config: &OverlayConfig) -> Vec<AdRecord> {
    let total = raw.len();
    let ads: Vec<AdRecord> = raw
        .into_iter()
        .filter_map(|r| AdRecord::from_raw(r, ad_type, config))
        .collect();
    if ads.len() < total {
        warn!(
            ad_type = %ad_type,
            dropped = total - ads.len(),
            "discarded ad records without an id"
        );
    }
    ads
}

/// 内存中的两份广告列表，每次加载整体替换
#[derive(Debug, Clone, Default)]
pub struct AdInventory {
    pub banners: Vec<AdRecord>,
    pub fullscreen: Vec<AdRecord>,
}

impl AdInventory {
    pub fn replace(&mut self, ad_type: AdType, ads: Vec<AdRecord>) {
        match ad_type {
            AdType::Banner => self.banners = ads,
            AdType::Fullscreen => self.fullscreen = ads,
        }
    }
}
