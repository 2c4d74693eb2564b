//! Time-boxed cache of FX rate tables, keyed by uppercase base currency.
//!
//! Clock and fetcher are injected so tests run on fake time and canned
//! tables; production wiring supplies the system clock and the HTTP fetcher.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// One fetched rate table: target currency code (uppercase) to rate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateTable {
    pub base: String,
    pub rates: HashMap<String, Decimal>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RateFetchError {
    #[error("rate request failed for base {base}: {detail}")]
    Transport { base: String, detail: String },
    #[error("rate request timed out for base {base}")]
    Timeout { base: String },
    #[error("malformed rate response for base {base}: {detail}")]
    Malformed { base: String, detail: String },
}

#[async_trait::async_trait]
pub trait RateFetcher: Send + Sync {
    async fn fetch(&self, base: &str) -> Result<RateTable, RateFetchError>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FxError {
    #[error("no rate available from {from} to {to}")]
    NoRate { from: String, to: String },
    #[error(transparent)]
    Fetch(#[from] RateFetchError),
}

struct CacheEntry {
    table: RateTable,
    expires_at: DateTime<Utc>,
}

/// Shared, process-wide rate cache with a fixed freshness window.
///
/// A live entry is served without fetching; an expired or missing entry is
/// refetched synchronously and replaced. Concurrent refreshes of the same
/// base may fetch redundantly; the last write wins and a stale table is
/// never served past its window.
pub struct FxCache {
    fetcher: Arc<dyn RateFetcher>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl FxCache {
    pub fn new(fetcher: Arc<dyn RateFetcher>, clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(fetcher, clock, Duration::hours(1))
    }

    pub fn with_ttl(fetcher: Arc<dyn RateFetcher>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { fetcher, clock, ttl, entries: Mutex::new(HashMap::new()) }
    }

    /// The rate table for `base`, from cache when live.
    pub async fn rates(&self, base: &str) -> Result<RateTable, RateFetchError> {
        let key = base.to_ascii_uppercase();
        let now = self.clock.now();

        if let Some(table) = self.live_entry(&key, now) {
            return Ok(table);
        }

        let table = self.fetcher.fetch(&key).await?;
        let expires_at = self.clock.now() + self.ttl;
        self.store(key, table.clone(), expires_at);
        Ok(table)
    }

    /// Convert `amount` from one currency into another via the base table.
    ///
    /// A target currency absent from the table is an error; callers abort
    /// the surrounding submission rather than persisting a partial claim.
    pub async fn convert(&self, amount: Decimal, from: &str, to: &str) -> Result<Decimal, FxError> {
        let table = self.rates(from).await?;
        let to_key = to.to_ascii_uppercase();
        let Some(rate) = table.rates.get(&to_key) else {
            return Err(FxError::NoRate { from: from.to_ascii_uppercase(), to: to_key });
        };
        Ok(amount * *rate)
    }

    fn live_entry(&self, key: &str, now: DateTime<Utc>) -> Option<RateTable> {
        let entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.get(key).filter(|entry| entry.expires_at > now).map(|entry| entry.table.clone())
    }

    fn store(&self, key: String, table: RateTable, expires_at: DateTime<Utc>) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(key, CacheEntry { table, expires_at });
    }
}
