// src/error.rs

use thiserror::Error;

/// 拉取广告列表失败的原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {0} ms")]
    Timeout(u64),
    #[error("HTTP error! status: {0}")]
    Status(u16),
    #[error("malformed ad list: {0}")]
    Decode(String),
}

/// 调用宿主游戏（Unity）失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("invalid host endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("host rejected {command} for {receiver}: {reason}")]
    Send {
        receiver: String,
        command: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("unable to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
