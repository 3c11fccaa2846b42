// src/config/overlay_config.rs

use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 后端接口路径
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Endpoints {
    pub banners: String,
    pub fullscreen: String,
    pub impression: String,
    pub click: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            banners: "/api/banners".to_string(),
            fullscreen: "/api/fullscreen".to_string(),
            impression: "/api/impression".to_string(),
            click: "/api/click".to_string(),
        }
    }
}

/// 两个展示区域的层级。全屏区域必须盖住横幅。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ZIndexConfig {
    pub banner: i32,
    pub fullscreen: i32,
}

impl Default for ZIndexConfig {
    fn default() -> Self {
        Self {
            banner: i32::MAX - 1,
            fullscreen: i32::MAX,
        }
    }
}

/// Unity `SendMessage` 的接收者与指令名
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct HostConfig {
    pub receiver: String,
    pub pause_command: String,
    pub resume_command: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            receiver: "GameManager".to_string(),
            pause_command: "PauseGame".to_string(),
            resume_command: "ResumeGame".to_string(),
        }
    }
}

/// **广告浮层配置**
///
/// 所有时间字段以毫秒为单位，通过对应的 `*()` 方法取 `Duration`。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct OverlayConfig {
    pub api_url: String,
    pub endpoints: Endpoints,
    pub banner_rotation_interval_ms: u64,
    pub fullscreen_duration_ms: u64,
    pub game_over_threshold: u32,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub request_timeout_ms: u64,
    pub visibility_check_interval_ms: u64,
    pub fallback_image_url: String,
    pub fallback_target_url: String,
    pub z_index: ZIndexConfig,
    pub host: HostConfig,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            api_url: "https://ads-system-backend.onrender.com".to_string(),
            endpoints: Endpoints::default(),
            banner_rotation_interval_ms: 7000,
            fullscreen_duration_ms: 5000,
            game_over_threshold: 5,
            retry_attempts: 3,
            retry_delay_ms: 3000,
            request_timeout_ms: 10_000,
            visibility_check_interval_ms: 5000,
            fallback_image_url: "https://via.placeholder.com/1080x140".to_string(),
            fallback_target_url: "https://alexlealdigital.github.io".to_string(),
            z_index: ZIndexConfig::default(),
            host: HostConfig::default(),
        }
    }
}

impl OverlayConfig {
    /// 从 JSON 文件读取配置，缺省字段沿用默认值
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// 拼接完整的接口地址，容忍 api_url 末尾多余的 `/`
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), path)
    }

    pub fn banner_rotation_interval(&self) -> Duration {
        Duration::from_millis(self.banner_rotation_interval_ms)
    }

    pub fn fullscreen_duration(&self) -> Duration {
        Duration::from_millis(self.fullscreen_duration_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn visibility_check_interval(&self) -> Duration {
        Duration::from_millis(self.visibility_check_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_url.trim().is_empty() {
            return Err(invalid("apiUrl", "must not be empty"));
        }
        if self.game_over_threshold == 0 {
            return Err(invalid("gameOverThreshold", "must be at least 1"));
        }
        if self.retry_attempts == 0 {
            return Err(invalid("retryAttempts", "must be at least 1"));
        }
        let timings = [
            ("bannerRotationIntervalMs", self.banner_rotation_interval_ms),
            ("fullscreenDurationMs", self.fullscreen_duration_ms),
            ("retryDelayMs", self.retry_delay_ms),
            ("requestTimeoutMs", self.request_timeout_ms),
            ("visibilityCheckIntervalMs", self.visibility_check_interval_ms),
        ];
        for (field, value) in timings {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }
        if self.fallback_image_url.is_empty() || self.fallback_target_url.is_empty() {
            return Err(invalid("fallback", "fallback image and target URLs are required"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = OverlayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.game_over_threshold, 5);
        assert!(config.z_index.fullscreen > config.z_index.banner);
    }

    #[test]
    fn endpoint_url_trims_trailing_slash() {
        let config = OverlayConfig {
            api_url: "http://localhost:5000/".to_string(),
            ..OverlayConfig::default()
        };
        assert_eq!(
            config.endpoint_url(&config.endpoints.banners),
            "http://localhost:5000/api/banners"
        );
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let config = OverlayConfig {
            game_over_threshold: 0,
            ..OverlayConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "gameOverThreshold", .. })
        ));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: OverlayConfig =
            serde_json::from_str(r#"{"apiUrl": "http://ads.local", "retryAttempts": 5}"#).unwrap();
        assert_eq!(config.api_url, "http://ads.local");
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.banner_rotation_interval_ms, 7000);
        assert_eq!(config.host.receiver, "GameManager");
    }
}
