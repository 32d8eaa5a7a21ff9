//! Orchestration over the cache and the remote store.
//!
//! [`SalesEngine`] is the only entry point callers get: reads go through
//! [`SalesEngine::query`], writes through [`SalesEngine::mutate`] and
//! [`SalesEngine::mutate_batch`]. Edits land in the cache synchronously
//! (the evaluator and the monthly rollup run before the remote write is
//! even sent), so a read issued right after a mutation sees the new value.
//! The remote write then either commits (flagging the entry stale so the
//! next read reconciles with the server) or rolls the key back to its exact
//! pre-mutation state.

use crate::cache::{CacheEntry, MonthCache, MonthKey};
use crate::error::{Result, SalesEngineError};
use crate::record::{DailyRecord, DayPatch, RecordPatch};
use crate::schema::{FieldDefinition, FieldSchemaRegistry};
use crate::utils::{next_month, prev_month, validate_month};
use chrono::NaiveDate;
use futures::future::join_all;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);

/// The remote persistence collaborator. Both writes are idempotent upserts
/// keyed by store, year, month, and date.
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// `Ok(None)` means the server has no row for the month yet, which the
    /// engine renders as a fully-formed empty month.
    async fn fetch_month(
        &self,
        key: &MonthKey,
    ) -> Result<Option<BTreeMap<NaiveDate, DailyRecord>>>;

    async fn write_day(&self, key: &MonthKey, date: NaiveDate, record: &DailyRecord)
        -> Result<()>;

    async fn write_days(
        &self,
        key: &MonthKey,
        records: &[(NaiveDate, DailyRecord)],
    ) -> Result<()>;
}

pub struct SalesEngine<S> {
    remote: S,
    registry: FieldSchemaRegistry,
    store_types: HashMap<String, String>,
    cache: MonthCache,
    max_age: Duration,
}

impl<S: RemoteStore> SalesEngine<S> {
    pub fn new(remote: S, registry: FieldSchemaRegistry) -> Self {
        Self {
            remote,
            registry,
            store_types: HashMap::new(),
            cache: MonthCache::new(),
            max_age: DEFAULT_MAX_AGE,
        }
    }

    /// How long a settled entry answers reads before a background refetch.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn assign_business_type(
        &mut self,
        store_id: impl Into<String>,
        business_type_id: impl Into<String>,
    ) {
        self.store_types
            .insert(store_id.into(), business_type_id.into());
    }

    pub fn registry(&self) -> &FieldSchemaRegistry {
        &self.registry
    }

    pub fn remote(&self) -> &S {
        &self.remote
    }

    /// The store's field catalog; empty (and logged) when the store has no
    /// business type or the type has no schema. Callers treat an empty
    /// catalog as a displayable state, not a fault.
    pub fn schema_for_store(&self, store_id: &str) -> Vec<FieldDefinition> {
        match self.store_types.get(store_id) {
            Some(business_type_id) => self.registry.fields(business_type_id).to_vec(),
            None => {
                warn!("store '{}' has no business type assigned", store_id);
                Vec::new()
            }
        }
    }

    /// Reads a month, fetching it when absent, stale, or past `max_age`.
    /// A month the server has never seen comes back as a fully-formed empty
    /// month, never as an error or an absent value.
    pub async fn query(&mut self, store_id: &str, year: i32, month: u32) -> Result<&CacheEntry> {
        validate_month(month)?;
        let key = MonthKey::new(store_id, year, month);

        if !self.cache.is_fresh(&key, self.max_age) && !self.cache.is_mutating(&key) {
            let fields = self.schema_for_store(store_id);
            let ticket = self.cache.begin_fetch(&key);
            let fetched = self
                .remote
                .fetch_month(&key)
                .await
                .map_err(|e| SalesEngineError::RemoteFetch {
                    key: key.to_string(),
                    message: e.to_string(),
                })?;
            if !self
                .cache
                .complete_fetch(ticket, fetched.unwrap_or_default(), &fields)
            {
                debug!("fetch for {} superseded by a local mutation", key);
            }
        }

        self.cache
            .entry(&key)
            .ok_or_else(|| SalesEngineError::CacheMiss(key.to_string()))
    }

    /// Read-only peek at whatever the cache currently holds, without
    /// triggering any fetch. A mutation is visible here the moment
    /// `mutate` begins its remote write.
    pub fn cached(&self, store_id: &str, year: i32, month: u32) -> Option<&CacheEntry> {
        self.cache.entry(&MonthKey::new(store_id, year, month))
    }

    pub async fn mutate(
        &mut self,
        store_id: &str,
        year: i32,
        month: u32,
        date: NaiveDate,
        patch: RecordPatch,
    ) -> Result<()> {
        self.mutate_batch(store_id, year, month, vec![DayPatch::new(date, patch)])
            .await
    }

    /// Applies a list of day patches as one optimistic transaction: all of
    /// them land in the cache together (evaluated and re-aggregated) before
    /// the remote write, and a failure rolls all of them back together.
    pub async fn mutate_batch(
        &mut self,
        store_id: &str,
        year: i32,
        month: u32,
        patches: Vec<DayPatch>,
    ) -> Result<()> {
        validate_month(month)?;
        if patches.is_empty() {
            return Ok(());
        }

        let key = MonthKey::new(store_id, year, month);

        // Mutating an unseen month starts from server state, so the merge
        // has a baseline to patch into.
        if self.cache.entry(&key).is_none() {
            self.query(store_id, year, month).await?;
        }

        let fields = self.schema_for_store(store_id);
        let snapshot = self.cache.apply_mutation(&key, &patches, &fields)?;

        // From here on the edit is visible to every local read.

        let payload = self.merged_records(&key, &patches)?;
        let write_result = if let [(date, record)] = payload.as_slice() {
            self.remote.write_day(&key, *date, record).await
        } else {
            self.remote.write_days(&key, &payload).await
        };

        match write_result {
            Ok(()) => {
                self.cache.commit_mutation(&key);
                Ok(())
            }
            Err(e) => {
                self.cache.rollback_mutation(snapshot);
                Err(SalesEngineError::MutationFailed {
                    key: key.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Advisory warm-up of the two neighboring months. Skips keys that are
    /// fresh or mid-mutation, runs the remaining fetches concurrently, and
    /// swallows failures: a missed prefetch costs a later fetch, nothing
    /// else.
    pub async fn prefetch_adjacent(&mut self, store_id: &str, year: i32, month: u32) {
        if validate_month(month).is_err() {
            return;
        }
        let fields = self.schema_for_store(store_id);

        let (prev_year, prev_mo) = prev_month(year, month);
        let (next_year, next_mo) = next_month(year, month);

        let mut targets = Vec::new();
        for key in [
            MonthKey::new(store_id, prev_year, prev_mo),
            MonthKey::new(store_id, next_year, next_mo),
        ] {
            if self.cache.is_mutating(&key) || self.cache.is_fresh(&key, self.max_age) {
                continue;
            }
            let ticket = self.cache.begin_fetch(&key);
            targets.push((ticket, key));
        }

        let fetches = targets.iter().map(|(_, key)| self.remote.fetch_month(key));
        let results = join_all(fetches).await;

        for ((ticket, key), result) in targets.into_iter().zip(results) {
            match result {
                Ok(data) => {
                    if !self
                        .cache
                        .complete_fetch(ticket, data.unwrap_or_default(), &fields)
                    {
                        debug!("prefetch for {} superseded, discarded", key);
                    }
                }
                Err(e) => debug!("prefetch for {} failed: {}", key, e),
            }
        }
    }

    /// Entry point for the best-effort push-update channel: flags the key
    /// stale so the next read refetches. Never writes data directly.
    pub fn invalidate(&mut self, store_id: &str, year: i32, month: u32) {
        self.cache.invalidate(&MonthKey::new(store_id, year, month));
    }

    /// The post-merge optimistic records for the patched dates: the upsert
    /// payload the remote receives.
    fn merged_records(
        &self,
        key: &MonthKey,
        patches: &[DayPatch],
    ) -> Result<Vec<(NaiveDate, DailyRecord)>> {
        let entry = self
            .cache
            .entry(key)
            .ok_or_else(|| SalesEngineError::CacheMiss(key.to_string()))?;
        Ok(patches
            .iter()
            .filter_map(|p| entry.daily_data.get(&p.date).map(|r| (p.date, r.clone())))
            .collect())
    }
}
