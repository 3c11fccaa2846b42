// src/overlay/host_bridge.rs

use tracing::{info, warn};

use crate::config::overlay_config::HostConfig;
use crate::error::BridgeError;

/// 宿主游戏运行时句柄，等价于 Unity 的 `SendMessage(receiver, command)`
pub trait HostBridge {
    fn name(&self) -> &str;
    fn send_message(&self, receiver: &str, command: &str) -> Result<(), BridgeError>;
}

/// 一次暂停 / 恢复请求最终走了哪条路
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCall {
    Runtime,
    GlobalCallback,
    Unavailable,
    /// 已经处于目标状态，没有发送
    Skipped,
}

/// **宿主桥接**
///
/// 先尝试已挂载的运行时句柄，再尝试全局回调；两者都不可用时只记 warn，
/// 广告照常展示。
pub struct HostLink {
    config: HostConfig,
    runtime: Option<Box<dyn HostBridge>>,
    global: Option<Box<dyn HostBridge>>,
    paused: bool,
}

impl HostLink {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            runtime: None,
            global: None,
            paused: false,
        }
    }

    pub fn with_global_callback(mut self, bridge: Box<dyn HostBridge>) -> Self {
        self.global = Some(bridge);
        self
    }

    /// 宿主运行时就绪
    pub fn attach_runtime(&mut self, bridge: Box<dyn HostBridge>) {
        info!(bridge = bridge.name(), "host runtime detected");
        self.runtime = Some(bridge);
    }

    pub fn is_runtime_attached(&self) -> bool {
        self.runtime.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// 只有暂停真正送达宿主才记为已暂停，之后的恢复才会发出
    pub fn pause_game(&mut self) -> HostCall {
        if self.paused {
            return HostCall::Skipped;
        }
        let command = self.config.pause_command.clone();
        let call = self.deliver(&command);
        self.paused = matches!(call, HostCall::Runtime | HostCall::GlobalCallback);
        call
    }

    pub fn resume_game(&mut self) -> HostCall {
        if !self.paused {
            return HostCall::Skipped;
        }
        self.paused = false;
        let command = self.config.resume_command.clone();
        self.deliver(&command)
    }

    fn deliver(&self, command: &str) -> HostCall {
        let receiver = self.config.receiver.as_str();
        if let Some(runtime) = &self.runtime {
            match runtime.send_message(receiver, command) {
                Ok(()) => {
                    info!(receiver, command, via = runtime.name(), "host command sent");
                    return HostCall::Runtime;
                }
                Err(e) => warn!(receiver, command, "host runtime call failed: {}", e),
            }
        }
        if let Some(global) = &self.global {
            match global.send_message(receiver, command) {
                Ok(()) => {
                    info!(receiver, command, via = global.name(), "host command sent through global callback");
                    return HostCall::GlobalCallback;
                }
                Err(e) => warn!(receiver, command, "global callback failed: {}", e),
            }
        }
        warn!(command, "unable to reach the host game, continuing without it");
        HostCall::Unavailable
    }
}
