// src/logging/mod.rs

pub mod ad_event_log;
pub mod runtime_logger;
