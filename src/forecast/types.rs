use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub store_id: String,
    pub predict_days: u32,
    pub start_date: NaiveDate,
}

/// One predicted day as the service returns it. Percentages and units match
/// the daily record contract, so values can be written back verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictedDay {
    pub date: NaiveDate,
    pub edw_sales: f64,
    pub ohb_sales: f64,
    pub is_predicted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Vec<PredictedDay>,
    /// Model quality metrics, passed through untyped for display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<serde_json::Value>,
}
