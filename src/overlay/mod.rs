// src/overlay/mod.rs

//! 横幅轮播 + 全屏插屏的展示状态机，以及它依赖的协作方接口。

pub mod context;
pub mod controller;
pub mod display;
pub mod host_bridge;
pub mod interstitial;
pub mod rotator;
pub mod source;
pub mod telemetry;

#[cfg(test)]
pub mod testing;

pub use controller::{AdOverlay, Diagnostics};
