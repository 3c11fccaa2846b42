// src/backend/client.rs

use std::time::Instant;

use once_cell::sync::Lazy;
use reqwest::Client;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::config::OverlayConfig;
use crate::error::FetchError;
use crate::logging::ad_event_log::AdEventLog;
use crate::model::ad::{decode_ad_list, AdType, RawAdRecord};
use crate::overlay::source::{AdFetcher, FetchTicket};
use crate::overlay::telemetry::{AdEvent, AdEventKind, AdTelemetry};
use crate::runtime::FetchCompletion;

/// 进程内共享的 HTTP 客户端（连接池复用）
pub static HTTP_CLIENT: Lazy<Client> = Lazy::new(Client::new);

/// 拉取一份广告列表。整次请求（含读 body）受 `limit` 约束。
pub async fn fetch_ad_list(
    client: &Client,
    url: &str,
    limit: Duration,
) -> Result<Vec<RawAdRecord>, FetchError> {
    let request = async {
        let response = client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let mut body = body.to_vec();
        decode_ad_list(&mut body)
    };
    match timeout(limit, request).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(limit.as_millis() as u64)),
    }
}

/// **HTTP 列表拉取器**：每张票一个后台任务，结果送回浮层主循环
pub struct HttpAdFetcher {
    client: Client,
    banners_url: String,
    fullscreen_url: String,
    request_timeout: Duration,
    results: UnboundedSender<FetchCompletion>,
}

impl HttpAdFetcher {
    pub fn new(config: &OverlayConfig, results: UnboundedSender<FetchCompletion>) -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
            banners_url: config.endpoint_url(&config.endpoints.banners),
            fullscreen_url: config.endpoint_url(&config.endpoints.fullscreen),
            request_timeout: config.request_timeout(),
            results,
        }
    }

    fn url_for(&self, ad_type: AdType) -> &str {
        match ad_type {
            AdType::Banner => &self.banners_url,
            AdType::Fullscreen => &self.fullscreen_url,
        }
    }
}

impl AdFetcher for HttpAdFetcher {
    fn request(&mut self, ticket: FetchTicket) {
        let client = self.client.clone();
        let url = self.url_for(ticket.ad_type).to_string();
        let limit = self.request_timeout;
        let results = self.results.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            let result = fetch_ad_list(&client, &url, limit).await;
            debug!(
                ad_type = %ticket.ad_type,
                attempt = ticket.attempt,
                elapsed_ms = start.elapsed().as_millis() as u64,
                ok = result.is_ok(),
                "ad list request finished"
            );
            if results.send((ticket, result)).is_err() {
                debug!("overlay loop is gone, dropping fetch result");
            }
        });
    }
}

/// **HTTP 上报**：POST `{adId, type}`，发出即忘
pub struct HttpTelemetry {
    client: Client,
    impression_url: String,
    click_url: String,
    request_timeout: Duration,
}

impl HttpTelemetry {
    pub fn new(config: &OverlayConfig) -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
            impression_url: config.endpoint_url(AdEventKind::Impression.endpoint(config)),
            click_url: config.endpoint_url(AdEventKind::Click.endpoint(config)),
            request_timeout: config.request_timeout(),
        }
    }
}

impl AdTelemetry for HttpTelemetry {
    fn report(&self, event: AdEvent) {
        let url = match event.kind {
            AdEventKind::Impression => self.impression_url.clone(),
            AdEventKind::Click => self.click_url.clone(),
        };
        let client = self.client.clone();
        let limit = self.request_timeout;
        tokio::spawn(async move {
            let mut log = AdEventLog::new(&event, &url);
            let start = Instant::now();
            let response = timeout(limit, client.post(&url).json(&event).send()).await;
            let elapsed = start.elapsed().as_millis();
            match response {
                Ok(Ok(resp)) if resp.status().is_success() => {
                    log.delivered(resp.status().as_u16(), elapsed);
                }
                Ok(Ok(resp)) => {
                    let status = resp.status().as_u16();
                    warn!(ad_id = %event.ad_id, kind = event.kind.as_str(), status, "ad event rejected");
                    log.failed(&format!("HTTP error! status: {}", status), Some(status), elapsed);
                }
                Ok(Err(e)) => {
                    warn!(ad_id = %event.ad_id, kind = event.kind.as_str(), "ad event delivery failed: {}", e);
                    log.failed(&e.to_string(), None, elapsed);
                }
                Err(_) => {
                    warn!(ad_id = %event.ad_id, kind = event.kind.as_str(), "ad event delivery timed out");
                    log.failed("timeout", None, elapsed);
                }
            }
            log.emit();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{serve_on, EventCounter, MockBackend};
    use crate::model::ad::AdRecord;
    use crate::overlay::testing::raw_ads;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::time::sleep;

    async fn spawn_backend(backend: Arc<MockBackend>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_on(listener, backend));
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn fetches_and_decodes_ad_list() {
        let backend = Arc::new(MockBackend::with_ads(raw_ads(&["A", "B"]), raw_ads(&["F"]), 0));
        let base = spawn_backend(backend).await;

        let ads = fetch_ad_list(&HTTP_CLIENT, &format!("{}/api/banners", base), Duration::from_secs(5))
            .await
            .unwrap();
        let ids: Vec<_> = ads.iter().filter_map(|a| a.id.clone()).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn unavailable_backend_maps_to_status_error() {
        let backend = Arc::new(MockBackend::with_ads(raw_ads(&["A"]), Vec::new(), 1));
        let base = spawn_backend(backend).await;
        let url = format!("{}/api/banners", base);

        let first = fetch_ad_list(&HTTP_CLIENT, &url, Duration::from_secs(5)).await;
        assert_eq!(first, Err(FetchError::Status(503)));
        let second = fetch_ad_list(&HTTP_CLIENT, &url, Duration::from_secs(5)).await;
        assert_eq!(second.map(|ads| ads.len()), Ok(1));
    }

    #[tokio::test]
    async fn fetcher_sends_result_back_with_ticket() {
        let backend = Arc::new(MockBackend::with_ads(Vec::new(), raw_ads(&["F"]), 0));
        let base = spawn_backend(backend).await;
        let config = OverlayConfig {
            api_url: base,
            ..OverlayConfig::default()
        };
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut fetcher = HttpAdFetcher::new(&config, tx);
        let ticket = FetchTicket {
            ad_type: AdType::Fullscreen,
            attempt: 1,
            generation: 4,
        };
        fetcher.request(ticket);

        let (returned, result) = rx.recv().await.unwrap();
        assert_eq!(returned, ticket);
        assert_eq!(result.unwrap().len(), 1);
    }

    fn banner(id: &str) -> AdRecord {
        AdRecord {
            id: id.to_string(),
            image_url: format!("https://cdn.test/{id}.png"),
            target_url: format!("https://shop.test/{id}"),
            ad_type: AdType::Banner,
            title: None,
        }
    }

    async fn wait_for_counter(backend: &MockBackend, ad_id: &str, expected: EventCounter) -> bool {
        for _ in 0..200 {
            if backend.counters().get(ad_id) == Some(&expected) {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn telemetry_posts_impressions_and_clicks() {
        let backend = Arc::new(MockBackend::with_ads(raw_ads(&["A"]), Vec::new(), 0));
        let base = spawn_backend(backend.clone()).await;
        let telemetry = HttpTelemetry::new(&OverlayConfig {
            api_url: base,
            ..OverlayConfig::default()
        });

        let ad = banner("A");
        telemetry.report(AdEvent::impression(&ad));
        telemetry.report(AdEvent::click(&ad));

        let expected = EventCounter { impressions: 1, clicks: 1 };
        assert!(wait_for_counter(&backend, "A", expected).await);
    }

    #[tokio::test]
    async fn unreachable_backend_does_not_disturb_later_events() {
        let dead = HttpTelemetry::new(&OverlayConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            request_timeout_ms: 200,
            ..OverlayConfig::default()
        });
        let ad = banner("A");
        dead.report(AdEvent::impression(&ad));
        dead.report(AdEvent::click(&ad));
        sleep(Duration::from_millis(300)).await;

        let backend = Arc::new(MockBackend::with_ads(raw_ads(&["A"]), Vec::new(), 0));
        let base = spawn_backend(backend.clone()).await;
        let live = HttpTelemetry::new(&OverlayConfig {
            api_url: base,
            ..OverlayConfig::default()
        });
        live.report(AdEvent::impression(&ad));

        let expected = EventCounter { impressions: 1, clicks: 0 };
        assert!(wait_for_counter(&backend, "A", expected).await);
    }
}
