//! NLU server client
//!
//! Calls the `/model/parse` endpoint of the NLU server and turns the parse
//! result into a [`Classification`]. Uses a long-lived reqwest::Client for
//! connection pooling. The timeout is enforced here, the extractor decides
//! what a failure means.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::classifier::{Classification, IntentClassifier, RankedIntent, UNKNOWN_INTENT};
use crate::error::BookingError;
use crate::Result;

/// Reusable NLU client (connection-pooled)
pub struct NluClient {
    client: Client,
    base_url: String,
}

impl NluClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Raw parse call
    pub async fn parse(&self, text: &str) -> Result<ParseResponse> {
        let url = format!("{}/model/parse", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&ParseRequest { text })
            .send()
            .await
            .map_err(|e| {
                error!("NLU request failed: {}", e);
                BookingError::ClassificationUnavailable(format!("NLU request error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, "NLU error response: {}", body);
            return Err(BookingError::ClassificationUnavailable(format!(
                "NLU returned {}",
                status
            )));
        }

        response.json::<ParseResponse>().await.map_err(|e| {
            error!("Failed to parse NLU response: {}", e);
            BookingError::ClassificationUnavailable(format!("NLU parse error: {}", e))
        })
    }
}

#[async_trait]
impl IntentClassifier for NluClient {
    async fn classify(&self, text: &str) -> Result<Classification> {
        let parsed = self.parse(text).await?;
        let classification = parsed.into_classification();
        debug!(
            label = %classification.label,
            confidence = classification.confidence,
            alternatives = classification.ranking.len(),
            "NLU classification"
        );
        Ok(classification)
    }
}

//
// ================= Wire types =================
//

#[derive(Serialize)]
struct ParseRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParseResponse {
    #[serde(default)]
    pub intent: Option<IntentScore>,
    #[serde(default)]
    pub intent_ranking: Vec<IntentScore>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentScore {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub confidence: f32,
}

impl ParseResponse {
    pub fn into_classification(self) -> Classification {
        let ranking = self
            .intent_ranking
            .into_iter()
            .filter_map(|score| {
                score.name.map(|label| RankedIntent {
                    label,
                    confidence: score.confidence,
                })
            })
            .collect();

        let (label, confidence) = match self.intent {
            Some(IntentScore { name: Some(name), confidence }) => (name, confidence),
            _ => (UNKNOWN_INTENT.to_string(), 0.0),
        };

        Classification::new(label, confidence).with_ranking(ranking)
    }
}
