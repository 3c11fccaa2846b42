use serde::{Serialize, Deserialize};
use chrono::Utc;
use tracing::{info, warn};

use crate::model::ad::AdType;
use crate::overlay::telemetry::AdEvent;

/// **广告事件日志**：每次展示 / 点击上报对应一条
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AdEventLog {
    pub timestamp: String,               // 记录时间
    pub log_type: String,                // "ad_impression" / "ad_click"
    pub ad_id: String,
    pub ad_type: AdType,
    pub endpoint: String,                // 上报地址
    pub status: String,                  // "pending" / "delivered" / "failed"
    pub http_status: Option<u16>,
    pub failure_reason: Option<String>,
    pub elapsed_ms: u128,
}

impl AdEventLog {
    pub fn new(event: &AdEvent, endpoint: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            log_type: format!("ad_{}", event.kind.as_str()),
            ad_id: event.ad_id.clone(),
            ad_type: event.ad_type,
            endpoint: endpoint.to_string(),
            status: "pending".to_string(),
            http_status: None,
            failure_reason: None,
            elapsed_ms: 0,
        }
    }

    pub fn delivered(&mut self, http_status: u16, elapsed_ms: u128) {
        self.status = "delivered".to_string();
        self.http_status = Some(http_status);
        self.elapsed_ms = elapsed_ms;
    }

    pub fn failed(&mut self, reason: &str, http_status: Option<u16>, elapsed_ms: u128) {
        self.status = "failed".to_string();
        self.http_status = http_status;
        self.failure_reason = Some(reason.to_string());
        self.elapsed_ms = elapsed_ms;
    }

    /// 写到 `ad_event` target 上，便于单独过滤
    pub fn emit(&self) {
        let line = match serde_json::to_string(self) {
            Ok(line) => line,
            Err(e) => {
                warn!(target: "ad_event", "unable to serialize ad event log: {}", e);
                return;
            }
        };
        if self.status == "failed" {
            warn!(target: "ad_event", "{}", line);
        } else {
            info!(target: "ad_event", "{}", line);
        }
    }
}
