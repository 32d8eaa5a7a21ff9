use crate::utils::{month_dates, weekday_label};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single metric value as stored in a daily record.
///
/// The remote store keeps a day's metrics as a loose JSON object, so values
/// arrive as numbers, strings, or null. The untagged representation keeps the
/// wire format while giving the rest of the crate a closed union to dispatch
/// on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    #[default]
    Empty,
}

impl FieldValue {
    /// Strict numeric view: `None` for empty, non-numeric text, and
    /// non-finite numbers. This is the aggregation path, which drops
    /// invalid values instead of padding with zeros.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) if n.is_finite() => Some(*n),
            FieldValue::Number(_) => None,
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            FieldValue::Empty => None,
        }
    }

    /// Lenient numeric view: anything that is not a finite number becomes
    /// `0.0`. This is the evaluator path, which never rejects an input.
    pub fn to_input(&self) -> f64 {
        self.as_number().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Empty)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// A field-level patch to one day's record. Merge is last-writer-wins per
/// field key.
pub type RecordPatch = BTreeMap<String, FieldValue>;

/// One day's metrics for a store.
///
/// Records are created on first save for a date and then only overwritten,
/// never deleted. Metric values for untouched fields stay absent rather than
/// defaulting to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub day_of_week: String,
    #[serde(default)]
    pub is_predicted: bool,
    #[serde(default)]
    pub values: BTreeMap<String, FieldValue>,
}

impl DailyRecord {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            day_of_week: weekday_label(date).to_string(),
            is_predicted: false,
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    /// Strict numeric read (aggregation semantics).
    pub fn number(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(FieldValue::as_number)
    }

    /// Lenient numeric read (evaluator semantics): absent fields are `0.0`.
    pub fn input(&self, key: &str) -> f64 {
        self.values.get(key).map(FieldValue::to_input).unwrap_or(0.0)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Merges a patch into this record, last-writer-wins per field.
    pub fn merge(&mut self, patch: &RecordPatch) {
        for (key, value) in patch {
            self.values.insert(key.clone(), value.clone());
        }
    }
}

/// A dated patch, the unit of a batch mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct DayPatch {
    pub date: NaiveDate,
    pub values: RecordPatch,
    /// Marks the day as written by the prediction service rather than a
    /// person or an import.
    pub mark_predicted: bool,
}

impl DayPatch {
    pub fn new(date: NaiveDate, values: RecordPatch) -> Self {
        Self {
            date,
            values,
            mark_predicted: false,
        }
    }
}

/// Monthly rollup per field key. `None` means zero valid daily values, which
/// is distinct from a zero total.
pub type MonthlySummary = BTreeMap<String, Option<f64>>;

/// A fully-formed month with every calendar day present and no metric values.
/// Consumers never see an absent month, only an empty one.
pub fn empty_month(year: i32, month: u32) -> BTreeMap<NaiveDate, DailyRecord> {
    month_dates(year, month)
        .into_iter()
        .map(|date| (date, DailyRecord::new(date)))
        .collect()
}
