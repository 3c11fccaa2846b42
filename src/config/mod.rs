pub mod overlay_config;

pub use overlay_config::OverlayConfig;
