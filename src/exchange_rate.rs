use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::numeric::decimal_from_json;
use crate::upstream::{UpstreamError, load_text};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Multiplier converting an amount in `base` into `target`.
    async fn conversion_rate(&self, base: &str, target: &str) -> Result<Decimal, UpstreamError>;
}

#[derive(Debug, Deserialize)]
struct LatestRates {
    rates: HashMap<String, Value>,
}

pub struct ExchangeRateClient {
    http_client: Client,
    base_url: String,
}

impl ExchangeRateClient {
    pub fn new(http_client: Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
        }
    }

    fn url_for(&self, base: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), base)
    }
}

#[async_trait]
impl RateSource for ExchangeRateClient {
    async fn conversion_rate(&self, base: &str, target: &str) -> Result<Decimal, UpstreamError> {
        let url = self.url_for(base);
        debug!("Requesting {} rates from {}", base, url);

        let text = load_text(&self.http_client, &url).await?;
        rate_from_body(&text, target)
    }
}

fn rate_from_body(text: &str, target: &str) -> Result<Decimal, UpstreamError> {
    let latest: LatestRates =
        serde_json::from_str(text).map_err(|err| UpstreamError::InvalidData(err.to_string()))?;

    latest
        .rates
        .get(target)
        .and_then(decimal_from_json)
        .ok_or_else(|| UpstreamError::InvalidData(format!("no rate for {}", target)))
}
