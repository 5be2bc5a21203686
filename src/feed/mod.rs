//! One controller per report type, all built from the same parts: a period
//! key function, a prompt, a response layout and a retention policy.
//!
//! A controller owns the in-memory state the presentation layer renders and
//! decides when to serve from the cache and when to query the model.

pub mod cache;
pub mod period;

use std::collections::HashSet;
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::time::Instant;

use crate::date_util::{self, date_key};
use crate::error::{Error, Result};
use crate::llm::RiskQueryApi;
use crate::query::{self, BlockFormat};
use crate::storage::KeyValueStore;
use crate::types::{DailyBrief, DisplayRisk, ReportKind, Risk};

use period::CachePeriod;

/// How long a `Found`/`NotFound` status stays visible.
pub const SEARCH_STATUS_TTL: Duration = Duration::from_secs(4);

/// Days of headlines the daily brief keeps, today included.
pub const DAILY_RETENTION_DAYS: u32 = 7;

/// What a fetch does to the data already held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// The new list replaces the old one.
    Replace,
    /// Results are filed under today's date; older days are kept up to the
    /// given window.
    TrailingDays(u32),
    /// Only titles not already held are added, newest first.
    Accumulate,
}

/// Everything that distinguishes one report type from another.
#[derive(Clone, Copy)]
pub struct FeedConfig {
    pub kind: ReportKind,
    pub period: fn(ReportKind, NaiveDate) -> CachePeriod,
    pub prompt: fn(ReportKind, &[String]) -> String,
    pub format: BlockFormat,
    pub retention: Retention,
}

impl FeedConfig {
    pub fn for_kind(kind: ReportKind) -> Self {
        let retention = match kind {
            ReportKind::Daily => Retention::TrailingDays(DAILY_RETENTION_DAYS),
            ReportKind::Weekly | ReportKind::Monthly | ReportKind::Yearly => Retention::Replace,
            ReportKind::Fraud | ReportKind::Cyber => Retention::Accumulate,
        };
        Self {
            kind,
            period: CachePeriod::current,
            prompt: query::build_prompt,
            format: query::block_format(kind),
            retention,
        }
    }
}

/// Outcome of the last search on an accumulating feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Idle,
    Found,
    NotFound,
}

/// Data held by a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FeedData {
    Risks(Vec<DisplayRisk>),
    Daily(DailyBrief),
}

impl FeedData {
    fn empty_for(retention: Retention) -> Self {
        match retention {
            Retention::TrailingDays(_) => FeedData::Daily(DailyBrief::new()),
            _ => FeedData::Risks(Vec::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FeedData::Risks(r) => r.is_empty(),
            FeedData::Daily(d) => d.is_empty(),
        }
    }

    fn risks(&self) -> &[DisplayRisk] {
        match self {
            FeedData::Risks(r) => r,
            FeedData::Daily(_) => &[],
        }
    }
}

/// What the presentation layer renders.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub kind: ReportKind,
    pub data: FeedData,
    pub loading: bool,
    pub error: Option<String>,
    /// Present only for accumulating feeds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_status: Option<SearchStatus>,
}

struct FeedState {
    data: FeedData,
    initialized: bool,
    in_flight: u32,
    error: Option<String>,
    status: SearchStatus,
    status_at: Option<Instant>,
}

impl FeedState {
    fn search_status(&self) -> SearchStatus {
        match self.status_at {
            Some(at) if at.elapsed() < SEARCH_STATUS_TTL => self.status,
            _ => SearchStatus::Idle,
        }
    }

    fn set_status(&mut self, status: SearchStatus) {
        self.status = status;
        self.status_at = Some(Instant::now());
    }
}

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

pub struct FeedController {
    config: FeedConfig,
    store: Arc<dyn KeyValueStore>,
    api: Rc<dyn RiskQueryApi>,
    clock: Clock,
    state: Mutex<FeedState>,
}

impl FeedController {
    pub fn new(config: FeedConfig, store: Arc<dyn KeyValueStore>, api: Rc<dyn RiskQueryApi>) -> Self {
        Self {
            state: Mutex::new(FeedState {
                data: FeedData::empty_for(config.retention),
                initialized: false,
                in_flight: 0,
                error: None,
                status: SearchStatus::Idle,
                status_at: None,
            }),
            config,
            store,
            api,
            clock: Arc::new(date_util::today),
        }
    }

    /// Replace the source of "today" used for period keys.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn kind(&self) -> ReportKind {
        self.config.kind
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let st = self.lock();
        FeedSnapshot {
            kind: self.config.kind,
            data: st.data.clone(),
            loading: st.in_flight > 0,
            error: st.error.clone(),
            search_status: (self.config.retention == Retention::Accumulate)
                .then(|| st.search_status()),
        }
    }

    /// Load from cache or network the first time the feed is shown.
    /// Does nothing once data or an error is held.
    pub async fn ensure_loaded(&self) {
        {
            let mut st = self.lock();
            if st.initialized || !st.data.is_empty() || st.error.is_some() {
                return;
            }
            st.initialized = true;
        }
        self.run(self.load()).await;
    }

    /// Query the model regardless of what the cache holds.
    pub async fn refresh(&self) {
        self.lock().initialized = true;
        self.run(self.fetch()).await;
    }

    async fn run(&self, op: impl std::future::Future<Output = Result<()>>) {
        {
            let mut st = self.lock();
            st.in_flight += 1;
            st.error = None;
        }
        let result = op.await;
        let mut st = self.lock();
        st.in_flight = st.in_flight.saturating_sub(1);
        if let Err(e) = result {
            log::error!("{} feed failed: {e}", self.config.kind);
            st.error = Some(format!("{}: {e}", query::failure_context(self.config.kind)));
        }
    }

    fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    fn current_key(&self) -> String {
        cache::cache_key(self.config.kind, &(self.config.period)(self.config.kind, self.today()))
    }

    async fn query(&self, known_titles: &[String]) -> Result<Vec<Risk>> {
        let prompt = (self.config.prompt)(self.config.kind, known_titles);
        query::run_query(self.api.as_ref(), &prompt, self.config.format).await
    }

    /// Read the current entry, dropping it if it cannot be decoded.
    async fn read_cached<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match cache::read_entry(self.store.as_ref(), key).await {
            Err(Error::CacheCorruption { key, message }) => {
                log::warn!("Discarding corrupt cache entry {key}: {message}");
                self.store.remove(&key).await?;
                Ok(None)
            }
            other => other,
        }
    }

    async fn load(&self) -> Result<()> {
        match self.config.retention {
            Retention::TrailingDays(days) => self.load_daily(days).await,
            Retention::Replace | Retention::Accumulate => {
                let key = self.current_key();
                let cached: Option<Vec<Risk>> = self.read_cached(&key).await?;
                match cached {
                    Some(risks) if !risks.is_empty() => {
                        log::debug!("Serving {} {} items from {key}", risks.len(), self.config.kind);
                        self.lock().data =
                            FeedData::Risks(risks.into_iter().map(DisplayRisk::new).collect());
                        Ok(())
                    }
                    _ => {
                        log::debug!("Cache miss for {key}");
                        self.fetch().await
                    }
                }
            }
        }
    }

    async fn fetch(&self) -> Result<()> {
        match self.config.retention {
            Retention::Replace => {
                let risks = self.query(&[]).await?;
                let key = self.current_key();
                self.lock().data =
                    FeedData::Risks(risks.iter().cloned().map(DisplayRisk::new).collect());
                cache::write_entry(self.store.as_ref(), self.config.kind, &key, &risks).await?;
                Ok(())
            }
            Retention::TrailingDays(days) => self.fetch_daily(days).await,
            Retention::Accumulate => self.merge_new().await,
        }
    }

    /// The cached daily map, pruned to the window. Falls back to the newest
    /// earlier entry so history survives the day rolling over.
    async fn cached_daily(&self, days: u32) -> Result<DailyBrief> {
        let key = self.current_key();
        let mut brief: Option<DailyBrief> = self.read_cached(&key).await?;
        if brief.is_none() {
            if let Some(prev) = cache::latest_key(self.store.as_ref(), self.config.kind, &key).await? {
                log::debug!("Carrying daily history forward from {prev}");
                brief = self.read_cached(&prev).await?;
            }
        }
        let mut brief = brief.unwrap_or_default();
        brief.prune(self.today(), days);
        Ok(brief)
    }

    async fn load_daily(&self, days: u32) -> Result<()> {
        let brief = self.cached_daily(days).await?;
        let today = date_key(self.today());
        if brief.get(&today).is_some_and(|r| !r.is_empty()) {
            log::debug!("Serving daily brief for {today} from cache");
            let key = self.current_key();
            self.lock().data = FeedData::Daily(brief.clone());
            // Persist the pruned map
            cache::write_entry(self.store.as_ref(), self.config.kind, &key, &brief).await?;
            return Ok(());
        }
        self.fetch_daily(days).await
    }

    async fn fetch_daily(&self, days: u32) -> Result<()> {
        let risks = self.query(&[]).await?;
        let mut brief = self.cached_daily(days).await?;
        brief.insert(date_key(self.today()), risks);
        let key = self.current_key();
        self.lock().data = FeedData::Daily(brief.clone());
        cache::write_entry(self.store.as_ref(), self.config.kind, &key, &brief).await?;
        Ok(())
    }

    /// Search for items not yet held and prepend them, flagged as new.
    async fn merge_new(&self) -> Result<()> {
        let mut existing: Vec<Risk> = self
            .lock()
            .data
            .risks()
            .iter()
            .map(|d| d.risk.clone())
            .collect();
        if existing.is_empty() {
            // Nothing shown yet; what is held lives in the cache.
            let key = self.current_key();
            if let Some(cached) = self.read_cached::<Vec<Risk>>(&key).await? {
                log::debug!("Merging against {} cached {} items", cached.len(), self.config.kind);
                self.lock().data =
                    FeedData::Risks(cached.iter().cloned().map(DisplayRisk::new).collect());
                existing = cached;
            }
        }
        let initial = existing.is_empty();
        let known: Vec<String> = existing.iter().map(|r| r.title.clone()).collect();

        let fetched = self.query(&known).await?;

        // Title is the identity; repeated titles are dropped unseen.
        let mut seen: HashSet<String> = known.into_iter().collect();
        let unique: Vec<Risk> = fetched
            .into_iter()
            .filter(|r| seen.insert(r.title.clone()))
            .collect();

        if unique.is_empty() {
            log::info!("No new {} items found", self.config.kind);
            let mut st = self.lock();
            if !initial {
                st.set_status(SearchStatus::NotFound);
            }
            if let FeedData::Risks(held) = &mut st.data {
                for d in held.iter_mut() {
                    d.is_new = false;
                }
            }
            return Ok(());
        }

        log::info!("Found {} new {} items", unique.len(), self.config.kind);
        let persisted: Vec<Risk> = unique.iter().chain(existing.iter()).cloned().collect();
        let key = self.current_key();
        {
            let mut st = self.lock();
            st.data = FeedData::Risks(
                unique
                    .into_iter()
                    .map(DisplayRisk::fresh)
                    .chain(existing.into_iter().map(DisplayRisk::new))
                    .collect(),
            );
            st.set_status(SearchStatus::Found);
        }
        cache::write_entry(self.store.as_ref(), self.config.kind, &key, &persisted).await?;
        Ok(())
    }
}
