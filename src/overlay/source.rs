// src/overlay/source.rs

use tracing::{debug, error, info, warn};

use crate::error::FetchError;
use crate::model::ad::{normalize_ads, AdRecord, AdType, RawAdRecord};
use crate::overlay::context::OverlayContext;
use crate::scheduler::{Task, TimerId};

/// 一次列表拉取的凭据。回包必须带回同一张票，过期的票会被丢弃。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub ad_type: AdType,
    pub attempt: u32,
    pub generation: u64,
}

/// 发起列表拉取。实现方异步执行请求，
/// 完成后把 `(ticket, result)` 交回 `AdOverlay::on_ads_fetched`。
pub trait AdFetcher {
    fn request(&mut self, ticket: FetchTicket);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(usize),
    Retrying { next_attempt: u32 },
    FellBack,
    Stale,
}

#[derive(Debug, Default)]
struct LoadSlot {
    generation: u64,
    attempt: u32,
    in_flight: bool,
    retry_timer: Option<TimerId>,
}

/// **广告数据源**：固定间隔重试，重试耗尽后换成占位广告。
/// 横幅和全屏各有一份独立的重试计数。
pub struct AdDataSource {
    fetcher: Box<dyn AdFetcher>,
    banner: LoadSlot,
    fullscreen: LoadSlot,
    next_generation: u64,
}

impl AdDataSource {
    pub fn new(fetcher: Box<dyn AdFetcher>) -> Self {
        Self {
            fetcher,
            banner: LoadSlot::default(),
            fullscreen: LoadSlot::default(),
            next_generation: 0,
        }
    }

    fn slot_mut(&mut self, ad_type: AdType) -> &mut LoadSlot {
        match ad_type {
            AdType::Banner => &mut self.banner,
            AdType::Fullscreen => &mut self.fullscreen,
        }
    }

    fn slot(&self, ad_type: AdType) -> &LoadSlot {
        match ad_type {
            AdType::Banner => &self.banner,
            AdType::Fullscreen => &self.fullscreen,
        }
    }

    /// 请求还在路上，或正在等下一次重试
    pub fn is_loading(&self, ad_type: AdType) -> bool {
        let slot = self.slot(ad_type);
        slot.in_flight || slot.retry_timer.is_some()
    }

    /// 开始新一轮加载；之前挂起的重试作废
    pub fn load(&mut self, ctx: &mut OverlayContext, ad_type: AdType) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let slot = self.slot_mut(ad_type);
        if let Some(timer) = slot.retry_timer.take() {
            ctx.scheduler.cancel(timer);
        }
        slot.generation = generation;
        slot.attempt = 1;
        self.issue(ad_type);
    }

    fn issue(&mut self, ad_type: AdType) {
        let slot = self.slot_mut(ad_type);
        slot.in_flight = true;
        let ticket = FetchTicket {
            ad_type,
            attempt: slot.attempt,
            generation: slot.generation,
        };
        info!(ad_type = %ad_type, attempt = ticket.attempt, "loading ads");
        self.fetcher.request(ticket);
    }

    pub fn on_fetched(
        &mut self,
        ctx: &mut OverlayContext,
        ticket: FetchTicket,
        result: Result<Vec<RawAdRecord>, FetchError>,
    ) -> LoadOutcome {
        let ad_type = ticket.ad_type;
        let slot = self.slot_mut(ad_type);
        if !slot.in_flight || slot.generation != ticket.generation || slot.attempt != ticket.attempt {
            debug!(ad_type = %ad_type, generation = ticket.generation, "dropping stale fetch result");
            return LoadOutcome::Stale;
        }
        slot.in_flight = false;

        match result {
            Ok(raw) => {
                let ads = normalize_ads(raw, ad_type, &ctx.config);
                let count = ads.len();
                ctx.inventory.replace(ad_type, ads);
                info!(ad_type = %ad_type, count, "ads loaded");
                LoadOutcome::Loaded(count)
            }
            Err(e) if slot.attempt < ctx.config.retry_attempts => {
                let next_attempt = slot.attempt + 1;
                warn!(
                    ad_type = %ad_type,
                    "failed to load ads: {}, retrying in {} ms ({}/{})",
                    e,
                    ctx.config.retry_delay_ms,
                    slot.attempt,
                    ctx.config.retry_attempts
                );
                let timer = ctx
                    .scheduler
                    .schedule_once(ctx.config.retry_delay(), Task::RetryFetch(ad_type));
                slot.retry_timer = Some(timer);
                LoadOutcome::Retrying { next_attempt }
            }
            Err(e) => {
                error!(
                    ad_type = %ad_type,
                    attempts = slot.attempt,
                    "failed to load ads: {}, using fallback ad",
                    e
                );
                ctx.inventory
                    .replace(ad_type, vec![AdRecord::fallback(ad_type, &ctx.config)]);
                LoadOutcome::FellBack
            }
        }
    }

    /// 重试定时器到期
    pub fn retry(&mut self, ad_type: AdType, timer: TimerId) {
        let slot = self.slot_mut(ad_type);
        if slot.retry_timer != Some(timer) {
            return;
        }
        slot.retry_timer = None;
        slot.attempt += 1;
        self.issue(ad_type);
    }
}
