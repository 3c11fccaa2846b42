// src/backend/host_webhook.rs

use once_cell::sync::OnceCell;
use reqwest::{Client, Url};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::backend::client::HTTP_CLIENT;
use crate::error::BridgeError;
use crate::overlay::host_bridge::HostBridge;

#[derive(Serialize, Debug, Clone)]
struct HostMessage {
    receiver: String,
    command: String,
}

/// 通过回调地址把 `SendMessage(receiver, command)` 转发给宿主页面。
///
/// 所有命令进同一个队列，由一个后台任务逐条 POST，
/// 宿主看到的顺序与发送顺序一致（PauseGame 一定先于 ResumeGame）。
pub struct HttpHostBridge {
    client: Client,
    url: Url,
    /// 首次发送时才启动投递任务，构造时可以没有 tokio 运行时
    queue: OnceCell<UnboundedSender<HostMessage>>,
}

impl HttpHostBridge {
    pub fn new(callback_url: &str) -> Result<Self, BridgeError> {
        let url = Url::parse(callback_url)
            .map_err(|e| BridgeError::InvalidEndpoint(format!("{}: {}", callback_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(BridgeError::InvalidEndpoint(format!(
                "{}: unsupported scheme {}",
                callback_url,
                url.scheme()
            )));
        }
        Ok(Self {
            client: HTTP_CLIENT.clone(),
            url,
            queue: OnceCell::new(),
        })
    }

    fn queue(&self) -> Result<&UnboundedSender<HostMessage>, String> {
        self.queue.get_or_try_init(|| {
            let handle = Handle::try_current().map_err(|e| e.to_string())?;
            let (sender, receiver) = mpsc::unbounded_channel();
            handle.spawn(Self::delivery_loop(self.client.clone(), self.url.clone(), receiver));
            Ok(sender)
        })
    }

    /// 串行投递：上一条请求结束后才发下一条
    async fn delivery_loop(client: Client, url: Url, mut receiver: UnboundedReceiver<HostMessage>) {
        while let Some(message) = receiver.recv().await {
            match client.post(url.clone()).json(&message).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(%url, command = %message.command, "host callback delivered");
                }
                Ok(resp) => warn!(
                    %url,
                    command = %message.command,
                    status = resp.status().as_u16(),
                    "host callback rejected"
                ),
                Err(e) => warn!(%url, command = %message.command, "host callback failed: {}", e),
            }
        }
        debug!(%url, "host callback queue closed");
    }
}

impl HostBridge for HttpHostBridge {
    fn name(&self) -> &str {
        self.url.as_str()
    }

    fn send_message(&self, receiver: &str, command: &str) -> Result<(), BridgeError> {
        let send_error = |reason: String| BridgeError::Send {
            receiver: receiver.to_string(),
            command: command.to_string(),
            reason,
        };
        let queue = self.queue().map_err(send_error)?;
        let message = HostMessage {
            receiver: receiver.to_string(),
            command: command.to_string(),
        };
        queue
            .send(message)
            .map_err(|_| send_error("host callback queue is closed".to_string()))
    }
}
