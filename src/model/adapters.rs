// src/model/adapters.rs

use crate::model::ad::RawAdRecord;
use std::fs;
use serde_json::Result as JsonResult;
use tracing::warn;

/// mock 后端的广告库存来源
pub trait InventoryAdapter: Send + Sync {
    fn banner_ads(&self) -> Vec<RawAdRecord>;
    fn fullscreen_ads(&self) -> Vec<RawAdRecord>;
}

/// 从 JSON 文件读取广告库存（文件内容为 RawAdRecord 数组）
pub struct FileInventoryAdapter {
    pub banner_file: String,
    pub fullscreen_file: String,
}

impl FileInventoryAdapter {
    pub fn new(banner_file: &str, fullscreen_file: &str) -> Self {
        Self {
            banner_file: banner_file.to_string(),
            fullscreen_file: fullscreen_file.to_string(),
        }
    }

    fn read(path: &str) -> Vec<RawAdRecord> {
        let content = fs::read_to_string(path).unwrap_or_else(|e| {
            warn!("unable to read inventory file {}: {}", path, e);
            "[]".to_string()
        });
        let ads: JsonResult<Vec<RawAdRecord>> = serde_json::from_str(&content);
        ads.unwrap_or_else(|e| {
            warn!("unable to parse inventory file {}: {}", path, e);
            Vec::new()
        })
    }
}

impl InventoryAdapter for FileInventoryAdapter {
    fn banner_ads(&self) -> Vec<RawAdRecord> {
        Self::read(&self.banner_file)
    }

    fn fullscreen_ads(&self) -> Vec<RawAdRecord> {
        Self::read(&self.fullscreen_file)
    }
}
