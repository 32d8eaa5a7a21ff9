//! The client-side month cache and its mutation state machine.
//!
//! Every entry moves through `fetch -> settled -> mutating -> settled`
//! transitions driven by the orchestration layer; this module owns the maps
//! and is the only place allowed to touch them, which is what makes the
//! monthly-aggregate invariant enforceable: whenever an entry is settled,
//! its summary equals a fresh aggregation of its daily data.
//!
//! Fetches are cancelled by versioning, not by aborting futures: a mutation
//! bumps the key's epoch, and a fetch completing against an older epoch is
//! discarded so a slow background refetch can never clobber a newer
//! optimistic write.

use crate::aggregation::aggregate_all;
use crate::error::{Result, SalesEngineError};
use crate::evaluator::evaluate;
use crate::record::{empty_month, DailyRecord, DayPatch, MonthlySummary};
use crate::schema::FieldDefinition;
use chrono::{Datelike, NaiveDate};
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

/// Cache key: one store's one month.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    pub store_id: String,
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(store_id: impl Into<String>, year: i32, month: u32) -> Self {
        Self {
            store_id: store_id.into(),
            year,
            month,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:04}-{:02}", self.store_id, self.year, self.month)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// The summary invariant holds and the entry may be replaced by a fetch.
    Settled,
    /// An optimistic write is in flight; fetches must not replace the entry.
    Mutating,
}

/// One cached month. Handed out read-only; all writes go through
/// [`MonthCache`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub daily_data: BTreeMap<NaiveDate, DailyRecord>,
    pub summary: MonthlySummary,
    pub state: EntryState,
    /// Set after a successful mutation (the optimistic value is provisional)
    /// or by a push notification; a stale entry answers reads but triggers a
    /// refetch.
    pub is_stale: bool,
    pub fetched_at: Option<Instant>,
}

/// Permission to install a fetch result, valid only while no mutation has
/// touched the key since the fetch began.
#[derive(Debug)]
pub struct FetchTicket {
    key: MonthKey,
    epoch: u64,
}

impl FetchTicket {
    pub fn key(&self) -> &MonthKey {
        &self.key
    }
}

/// Exact pre-mutation state of one key, restored verbatim on rollback.
#[derive(Debug, Clone)]
pub struct Snapshot {
    key: MonthKey,
    entry: CacheEntry,
}

#[derive(Debug, Default)]
pub struct MonthCache {
    entries: HashMap<MonthKey, CacheEntry>,
    epochs: HashMap<MonthKey, u64>,
}

impl MonthCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, key: &MonthKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn is_mutating(&self, key: &MonthKey) -> bool {
        self.entries
            .get(key)
            .map(|e| e.state == EntryState::Mutating)
            .unwrap_or(false)
    }

    /// Settled, not stale-flagged, and fetched within `max_age`.
    pub fn is_fresh(&self, key: &MonthKey, max_age: Duration) -> bool {
        match self.entries.get(key) {
            Some(entry) => {
                entry.state == EntryState::Settled
                    && !entry.is_stale
                    && entry
                        .fetched_at
                        .map(|at| at.elapsed() <= max_age)
                        .unwrap_or(false)
            }
            None => false,
        }
    }

    pub fn begin_fetch(&mut self, key: &MonthKey) -> FetchTicket {
        FetchTicket {
            key: key.clone(),
            epoch: self.epochs.get(key).copied().unwrap_or(0),
        }
    }

    /// Installs a fetch result. Returns `false` (leaving the cache
    /// untouched) when the ticket's epoch has been superseded by a mutation
    /// or the entry is currently mutating. The fetch lost the race and its
    /// data must not clobber the optimistic state.
    ///
    /// Days the server does not know about are filled in, so a settled
    /// entry always holds the full calendar month.
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        daily_data: BTreeMap<NaiveDate, DailyRecord>,
        fields: &[FieldDefinition],
    ) -> bool {
        let key = ticket.key;
        let current_epoch = self.epochs.get(&key).copied().unwrap_or(0);
        if ticket.epoch != current_epoch || self.is_mutating(&key) {
            debug!("discarding superseded fetch for {}", key);
            return false;
        }

        let mut full_month = empty_month(key.year, key.month);
        for (date, record) in daily_data {
            if key.contains(date) {
                full_month.insert(date, record);
            } else {
                debug!("dropping out-of-month record {} from fetch for {}", date, key);
            }
        }

        let summary = aggregate_all(&full_month, fields);
        self.entries.insert(
            key,
            CacheEntry {
                daily_data: full_month,
                summary,
                state: EntryState::Settled,
                is_stale: false,
                fetched_at: Some(Instant::now()),
            },
        );
        true
    }

    /// Applies a batch of patches optimistically: merge, re-run the
    /// evaluator on each touched day, recompute the monthly summary, and
    /// leave the entry `Mutating`. The returned snapshot restores the exact
    /// prior state on rollback.
    ///
    /// Bumps the key's epoch first, so any refetch already in flight is
    /// cancelled rather than allowed to overwrite the optimistic value.
    pub fn apply_mutation(
        &mut self,
        key: &MonthKey,
        patches: &[DayPatch],
        fields: &[FieldDefinition],
    ) -> Result<Snapshot> {
        for patch in patches {
            if !key.contains(patch.date) {
                return Err(SalesEngineError::Date(format!(
                    "patch date {} is outside {}",
                    patch.date, key
                )));
            }
        }

        *self.epochs.entry(key.clone()).or_insert(0) += 1;

        let entry = self.entries.entry(key.clone()).or_insert_with(|| {
            let daily_data = empty_month(key.year, key.month);
            let summary = aggregate_all(&daily_data, fields);
            CacheEntry {
                daily_data,
                summary,
                state: EntryState::Settled,
                is_stale: false,
                fetched_at: None,
            }
        });

        let snapshot = Snapshot {
            key: key.clone(),
            entry: entry.clone(),
        };

        for patch in patches {
            let day = entry
                .daily_data
                .entry(patch.date)
                .or_insert_with(|| DailyRecord::new(patch.date));
            day.merge(&patch.values);
            if patch.mark_predicted {
                day.is_predicted = true;
            }
            *day = evaluate(fields, day);
        }

        entry.summary = aggregate_all(&entry.daily_data, fields);
        entry.state = EntryState::Mutating;

        Ok(snapshot)
    }

    /// The remote write succeeded: settle, and flag the entry stale so the
    /// next read reconciles with authoritative server state.
    pub fn commit_mutation(&mut self, key: &MonthKey) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.state = EntryState::Settled;
            entry.is_stale = true;
        }
    }

    /// The remote write failed: restore the exact pre-mutation state.
    pub fn rollback_mutation(&mut self, snapshot: Snapshot) {
        self.entries.insert(snapshot.key, snapshot.entry);
    }

    /// Marks a key stale without touching its data. This is all a push
    /// notification is ever allowed to do.
    pub fn invalidate(&mut self, key: &MonthKey) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.is_stale = true;
        }
    }
}
