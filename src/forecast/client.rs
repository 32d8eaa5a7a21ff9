use crate::error::{Result, SalesEngineError};
use crate::forecast::types::{PredictionRequest, PredictionResponse};
use reqwest::Client;

#[derive(Clone)]
pub struct PredictionClient {
    client: Client,
    base_url: String,
}

impl PredictionClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResponse> {
        let url = format!("{}/predict", self.base_url.trim_end_matches('/'));

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(SalesEngineError::Prediction(format!(
                "prediction request failed (status {}): {}",
                status, error_text
            )));
        }

        let parsed: PredictionResponse = response.json().await?;
        Ok(parsed)
    }
}
