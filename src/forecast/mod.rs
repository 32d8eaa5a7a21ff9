//! Client for the external prediction service.
//!
//! The service is opaque: it takes a store and a horizon and returns dated
//! sales predictions. Write-back is just another bulk write source: each
//! predicted day goes through the same batch mutation path as interactive
//! edits and CSV imports, flagged `is_predicted` so the UI can style it.

mod client;
mod types;

pub use client::PredictionClient;
pub use types::{PredictedDay, PredictionRequest, PredictionResponse};

use crate::engine::{RemoteStore, SalesEngine};
use crate::error::Result;
use crate::record::{DayPatch, FieldValue, RecordPatch};
use chrono::Datelike;
use std::collections::BTreeMap;

/// Writes a prediction response into the engine, one batch mutation per
/// month. Returns the number of predicted days written.
pub async fn apply_predictions<S: RemoteStore>(
    engine: &mut SalesEngine<S>,
    store_id: &str,
    response: &PredictionResponse,
) -> Result<usize> {
    let mut grouped: BTreeMap<(i32, u32), Vec<DayPatch>> = BTreeMap::new();

    for prediction in &response.predictions {
        let mut values = RecordPatch::new();
        values.insert(
            "edw_net_sales".to_string(),
            FieldValue::Number(prediction.edw_sales),
        );
        values.insert(
            "ohb_net_sales".to_string(),
            FieldValue::Number(prediction.ohb_sales),
        );

        let mut patch = DayPatch::new(prediction.date, values);
        patch.mark_predicted = prediction.is_predicted;

        grouped
            .entry((prediction.date.year(), prediction.date.month()))
            .or_default()
            .push(patch);
    }

    let mut written = 0;
    for ((year, month), patches) in grouped {
        written += patches.len();
        engine.mutate_batch(store_id, year, month, patches).await?;
    }
    Ok(written)
}
