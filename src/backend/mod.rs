// src/backend/mod.rs

//! 与广告后端、宿主页面之间的 HTTP 交互，以及开发用的模拟后端。

pub mod client;
pub mod host_webhook;
pub mod mock;
