pub mod date_util;
pub mod error;
pub mod feed;
pub mod llm;
pub mod query;
pub mod storage;
pub mod types;

use std::rc::Rc;
use std::sync::Arc;

use chrono::NaiveDate;

pub use error::{Error, Result};
pub use feed::cache::CacheKeyInfo;
pub use feed::period::CachePeriod;
pub use feed::{FeedConfig, FeedController, FeedData, FeedSnapshot, Retention, SearchStatus};
pub use llm::{create_client, QueryResponse, RiskQueryApi};
pub use storage::{Database, KeyValueStore, MemoryStore};
pub use types::{DailyBrief, DisplayRisk, ReportKind, Risk, Source};

/// Main entry point: one feed per report type over a shared store and client.
pub struct RiskBrief {
    store: Arc<dyn KeyValueStore>,
    feeds: Vec<FeedController>,
}

impl RiskBrief {
    pub fn new(store: Arc<dyn KeyValueStore>, api: Rc<dyn RiskQueryApi>) -> Self {
        let feeds = ReportKind::ALL
            .iter()
            .map(|&kind| FeedController::new(FeedConfig::for_kind(kind), store.clone(), api.clone()))
            .collect();
        Self { store, feeds }
    }

    /// Pin every feed's notion of "today" (for testing).
    pub fn with_clock(self, clock: fn() -> NaiveDate) -> Self {
        Self {
            store: self.store,
            feeds: self.feeds.into_iter().map(|f| f.with_clock(clock)).collect(),
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn feed(&self, kind: ReportKind) -> &FeedController {
        // `feeds` is built from `ReportKind::ALL`, in order.
        let idx = ReportKind::ALL.iter().position(|k| *k == kind).unwrap_or(0);
        &self.feeds[idx]
    }

    // ── Feed commands ──────────────────────────────────────────────

    /// Show a feed, loading it from cache or network on first use.
    pub async fn show(&self, kind: ReportKind) -> FeedSnapshot {
        let feed = self.feed(kind);
        feed.ensure_loaded().await;
        feed.snapshot()
    }

    /// Force a network fetch for one feed.
    pub async fn refresh(&self, kind: ReportKind) -> FeedSnapshot {
        let feed = self.feed(kind);
        feed.refresh().await;
        feed.snapshot()
    }

    /// Load every feed concurrently. Each feed's outcome is independent.
    pub async fn load_all(&self) -> Vec<FeedSnapshot> {
        use ReportKind::*;
        tokio::join!(
            self.feed(Daily).ensure_loaded(),
            self.feed(Weekly).ensure_loaded(),
            self.feed(Monthly).ensure_loaded(),
            self.feed(Yearly).ensure_loaded(),
            self.feed(Fraud).ensure_loaded(),
            self.feed(Cyber).ensure_loaded(),
        );
        self.feeds.iter().map(|f| f.snapshot()).collect()
    }
}
