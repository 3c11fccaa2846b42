// src/backend/mock.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{serve, Json, Router};
use proptest::prelude::*;
use proptest::strategy::ValueTree;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};
use uuid::Uuid;

use crate::model::ad::{AdType, RawAdRecord};
use crate::model::adapters::InventoryAdapter;

/// 单个广告的事件计数
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct EventCounter {
    pub impressions: u64,
    pub clicks: u64,
}

/// 带计数的广告，指标接口按广告列出
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdMetrics {
    #[serde(flatten)]
    pub ad: RawAdRecord,
    pub impressions: u64,
    pub clicks: u64,
}

/// 某一类广告的汇总指标
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypeMetrics {
    pub ads_count: usize,
    pub total_impressions: u64,
    pub total_clicks: u64,
    /// 点击率（百分比，保留两位小数），没有展示时为 0
    pub ctr: f64,
    pub ads: Vec<AdMetrics>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Metrics {
    pub banner: TypeMetrics,
    pub fullscreen: TypeMetrics,
}

fn click_through_rate(clicks: u64, impressions: u64) -> f64 {
    if impressions == 0 {
        return 0.0;
    }
    let ctr = clicks as f64 / impressions as f64 * 100.0;
    (ctr * 100.0).round() / 100.0
}

#[derive(Debug, Default)]
struct MockInventory {
    banners: Vec<RawAdRecord>,
    fullscreen: Vec<RawAdRecord>,
}

impl MockInventory {
    fn list(&self, ad_type: AdType) -> &Vec<RawAdRecord> {
        match ad_type {
            AdType::Banner => &self.banners,
            AdType::Fullscreen => &self.fullscreen,
        }
    }

    fn list_mut(&mut self, ad_type: AdType) -> &mut Vec<RawAdRecord> {
        match ad_type {
            AdType::Banner => &mut self.banners,
            AdType::Fullscreen => &mut self.fullscreen,
        }
    }
}

/// **模拟广告后端**：列表接口、展示 / 点击上报、指标汇总和广告增删改
pub struct MockBackend {
    inventory: RwLock<MockInventory>,
    counters: Mutex<HashMap<String, EventCounter>>,
    /// 前 N 次列表请求直接返回 503
    failures_remaining: AtomicU32,
}

impl MockBackend {
    pub fn new(inventory: &dyn InventoryAdapter, failures: u32) -> Self {
        Self::with_ads(inventory.banner_ads(), inventory.fullscreen_ads(), failures)
    }

    pub fn with_ads(banners: Vec<RawAdRecord>, fullscreen: Vec<RawAdRecord>, failures: u32) -> Self {
        Self {
            inventory: RwLock::new(MockInventory { banners, fullscreen }),
            counters: Mutex::new(HashMap::new()),
            failures_remaining: AtomicU32::new(failures),
        }
    }

    fn read_inventory(&self) -> std::sync::RwLockReadGuard<'_, MockInventory> {
        self.inventory.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_inventory(&self) -> std::sync::RwLockWriteGuard<'_, MockInventory> {
        self.inventory.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn list(&self, ad_type: AdType) -> Vec<RawAdRecord> {
        self.read_inventory().list(ad_type).clone()
    }

    /// 新增广告，返回生成的 id
    pub fn add_ad(&self, ad_type: AdType, form: AdForm) -> String {
        let id = Uuid::new_v4().to_string();
        let record = form.into_record(id.clone(), ad_type);
        self.write_inventory().list_mut(ad_type).push(record);
        info!(ad_type = %ad_type, ad_id = %id, "mock backend added ad");
        id
    }

    /// 更新已有广告的图片、落地页和标题；不存在时返回 false
    pub fn update_ad(&self, ad_type: AdType, ad_id: &str, form: AdForm) -> bool {
        let mut inventory = self.write_inventory();
        let Some(slot) = inventory
            .list_mut(ad_type)
            .iter_mut()
            .find(|ad| ad.id.as_deref() == Some(ad_id))
        else {
            return false;
        };
        *slot = form.into_record(ad_id.to_string(), ad_type);
        info!(ad_type = %ad_type, ad_id, "mock backend updated ad");
        true
    }

    pub fn delete_ad(&self, ad_type: AdType, ad_id: &str) -> bool {
        let mut inventory = self.write_inventory();
        let ads = inventory.list_mut(ad_type);
        let before = ads.len();
        ads.retain(|ad| ad.id.as_deref() != Some(ad_id));
        let removed = ads.len() != before;
        if removed {
            info!(ad_type = %ad_type, ad_id, "mock backend deleted ad");
        }
        removed
    }

    /// 还有待消耗的失败次数时返回 true 并减一
    fn take_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn counters(&self) -> HashMap<String, EventCounter> {
        match self.counters.lock() {
            Ok(counters) => counters.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, ad_id: &str, kind: EventKind) {
        let mut counters = match self.counters.lock() {
            Ok(counters) => counters,
            Err(poisoned) => poisoned.into_inner(),
        };
        let counter = counters.entry(ad_id.to_string()).or_default();
        match kind {
            EventKind::Impression => counter.impressions += 1,
            EventKind::Click => counter.clicks += 1,
        }
    }

    /// 按类型汇总当前库存里每个广告的计数
    pub fn metrics(&self) -> Metrics {
        let counters = self.counters();
        let summarize = |ad_type: AdType| {
            let ads: Vec<AdMetrics> = self
                .list(ad_type)
                .into_iter()
                .map(|ad| {
                    let counter = ad
                        .id
                        .as_ref()
                        .and_then(|id| counters.get(id))
                        .cloned()
                        .unwrap_or_default();
                    AdMetrics {
                        ad,
                        impressions: counter.impressions,
                        clicks: counter.clicks,
                    }
                })
                .collect();
            let total_impressions = ads.iter().map(|a| a.impressions).sum();
            let total_clicks = ads.iter().map(|a| a.clicks).sum();
            TypeMetrics {
                ads_count: ads.len(),
                total_impressions,
                total_clicks,
                ctr: click_through_rate(total_clicks, total_impressions),
                ads,
            }
        };
        Metrics {
            banner: summarize(AdType::Banner),
            fullscreen: summarize(AdType::Fullscreen),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum EventKind {
    Impression,
    Click,
}

/// 上报请求体，字段缺失时由校验给出 400
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct EventBody {
    #[serde(default)]
    ad_id: Option<String>,
    #[serde(default, rename = "type")]
    ad_type: Option<String>,
}

/// 新增 / 编辑广告的表单，落地页可以用 `targetUrl` 或旧字段 `linkUrl`
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AdForm {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub link_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl AdForm {
    fn validate(&self) -> Result<(), &'static str> {
        let filled = |v: &Option<String>| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
        if !filled(&self.image_url) {
            return Err("imageUrl is required");
        }
        if !filled(&self.target_url) && !filled(&self.link_url) {
            return Err("targetUrl is required");
        }
        Ok(())
    }

    fn into_record(self, id: String, ad_type: AdType) -> RawAdRecord {
        RawAdRecord {
            id: Some(id),
            image_url: self.image_url,
            target_url: self.target_url.or(self.link_url),
            link_url: None,
            title: self.title,
            ad_type: Some(ad_type.as_str().to_string()),
        }
    }
}

type ApiError = (StatusCode, Json<Value>);

fn bad_request(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "success": false, "error": message })))
}

fn not_found(ad_id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": format!("ad {} not found", ad_id) })),
    )
}

async fn serve_list(backend: &MockBackend, ad_type: AdType) -> Result<Json<Vec<RawAdRecord>>, ApiError> {
    // 模拟后端处理延迟（50 ~ 200 毫秒）
    let delay_ms = rand::thread_rng().gen_range(50..200);
    sleep(Duration::from_millis(delay_ms)).await;

    if backend.take_failure() {
        warn!(ad_type = %ad_type, "mock backend failing list request on purpose");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "success": false, "error": "backend warming up" })),
        ));
    }
    let ads = backend.list(ad_type);
    info!(ad_type = %ad_type, count = ads.len(), "mock backend served ad list");
    Ok(Json(ads))
}

async fn list_banners(State(backend): State<Arc<MockBackend>>) -> Result<Json<Vec<RawAdRecord>>, ApiError> {
    serve_list(&backend, AdType::Banner).await
}

async fn list_fullscreen(State(backend): State<Arc<MockBackend>>) -> Result<Json<Vec<RawAdRecord>>, ApiError> {
    serve_list(&backend, AdType::Fullscreen).await
}

fn track(backend: &MockBackend, body: EventBody, kind: EventKind) -> Result<Json<Value>, ApiError> {
    let ad_id = match body.ad_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return Err(bad_request("adId is required")),
    };
    match body.ad_type.as_deref() {
        Some("banner") | Some("fullscreen") => {}
        _ => return Err(bad_request("type must be banner or fullscreen")),
    }
    backend.record(&ad_id, kind);
    info!(ad_id = %ad_id, kind = ?kind, "mock backend recorded ad event");
    Ok(Json(json!({ "success": true })))
}

async fn track_impression(
    State(backend): State<Arc<MockBackend>>,
    Json(body): Json<EventBody>,
) -> Result<Json<Value>, ApiError> {
    track(&backend, body, EventKind::Impression)
}

async fn track_click(
    State(backend): State<Arc<MockBackend>>,
    Json(body): Json<EventBody>,
) -> Result<Json<Value>, ApiError> {
    track(&backend, body, EventKind::Click)
}

async fn metrics(State(backend): State<Arc<MockBackend>>) -> Json<Metrics> {
    Json(backend.metrics())
}

async fn add_ad(
    State(backend): State<Arc<MockBackend>>,
    Path(ad_type): Path<AdType>,
    Json(form): Json<AdForm>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    form.validate().map_err(bad_request)?;
    let id = backend.add_ad(ad_type, form);
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "id": id }))))
}

async fn update_ad(
    State(backend): State<Arc<MockBackend>>,
    Path((ad_type, ad_id)): Path<(AdType, String)>,
    Json(form): Json<AdForm>,
) -> Result<Json<Value>, ApiError> {
    form.validate().map_err(bad_request)?;
    if !backend.update_ad(ad_type, &ad_id, form) {
        return Err(not_found(&ad_id));
    }
    Ok(Json(json!({ "success": true })))
}

async fn delete_ad(
    State(backend): State<Arc<MockBackend>>,
    Path((ad_type, ad_id)): Path<(AdType, String)>,
) -> Result<Json<Value>, ApiError> {
    if !backend.delete_ad(ad_type, &ad_id) {
        return Err(not_found(&ad_id));
    }
    Ok(Json(json!({ "success": true })))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub fn router(backend: Arc<MockBackend>) -> Router {
    Router::new()
        .route("/api/banners", get(list_banners))
        .route("/api/fullscreen", get(list_fullscreen))
        .route("/api/impression", post(track_impression))
        .route("/api/click", post(track_click))
        .route("/api/metrics", get(metrics))
        .route("/api/ads/{ad_type}", post(add_ad))
        .route("/api/ads/{ad_type}/{ad_id}", put(update_ad).delete(delete_ad))
        .route("/health", get(health))
        .with_state(backend)
}

/// 在已绑定的监听器上提供服务
pub async fn serve_on(listener: TcpListener, backend: Arc<MockBackend>) -> std::io::Result<()> {
    serve(listener, router(backend)).await
}

/// 使用 proptest 生成随机的广告记录；约三分之一使用旧字段 `linkUrl`
fn generate_ad(ad_type: AdType) -> impl Strategy<Value = RawAdRecord> {
    ("[A-Z][a-z]{4,10}", 0u8..3).prop_map(move |(title, legacy)| {
        let id = Uuid::new_v4().to_string();
        let size = match ad_type {
            AdType::Banner => "1080x140",
            AdType::Fullscreen => "1080x1920",
        };
        let target = format!("https://shop.example.com/{}", title.to_lowercase());
        let (target_url, link_url) = if legacy == 0 {
            (None, Some(target))
        } else {
            (Some(target), None)
        };
        RawAdRecord {
            id: Some(id),
            image_url: Some(format!("https://via.placeholder.com/{}?text={}", size, title)),
            target_url,
            link_url,
            title: Some(title),
            ad_type: Some(ad_type.as_str().to_string()),
        }
    })
}

fn generate_ads(ad_type: AdType, count: std::ops::Range<usize>) -> impl Strategy<Value = Vec<RawAdRecord>> {
    proptest::collection::vec(generate_ad(ad_type), count)
}

/// 随机生成的库存
pub struct GeneratedInventory {
    banners: Vec<RawAdRecord>,
    fullscreen: Vec<RawAdRecord>,
}

impl GeneratedInventory {
    pub fn new() -> Self {
        let mut runner = proptest::test_runner::TestRunner::default();
        let banners = generate_ads(AdType::Banner, 3..6)
            .new_tree(&mut runner)
            .map(|tree| tree.current())
            .unwrap_or_default();
        let fullscreen = generate_ads(AdType::Fullscreen, 1..4)
            .new_tree(&mut runner)
            .map(|tree| tree.current())
            .unwrap_or_default();
        info!(banners = banners.len(), fullscreen = fullscreen.len(), "generated mock ad inventory");
        Self { banners, fullscreen }
    }
}

impl Default for GeneratedInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl InventoryAdapter for GeneratedInventory {
    fn banner_ads(&self) -> Vec<RawAdRecord> {
        self.banners.clone()
    }

    fn fullscreen_ads(&self) -> Vec<RawAdRecord> {
        self.fullscreen.clone()
    }
}
