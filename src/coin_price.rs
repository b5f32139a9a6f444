use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::numeric::decimal_from_json;
use crate::upstream::{UpstreamError, load_text};

/// CoinGecko ids refreshed by a price update, paired with the stored symbol.
pub const TRACKED_COINS: [(&str, &str); 2] = [("bitcoin", "BTC"), ("ethereum", "ETH")];

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// USD price per coin id. Ids the source has no USD quote for are absent from the map.
    async fn usd_prices(
        &self,
        coin_ids: &[String],
    ) -> Result<HashMap<String, Decimal>, UpstreamError>;
}

pub struct CoinGeckoClient {
    http_client: Client,
    base_url: String,
}

impl CoinGeckoClient {
    pub fn new(http_client: Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
        }
    }

    fn url_for(&self, coin_ids: &[String]) -> String {
        format!(
            "{}?ids={}&vs_currencies=usd",
            self.base_url,
            coin_ids.join(",")
        )
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    async fn usd_prices(
        &self,
        coin_ids: &[String],
    ) -> Result<HashMap<String, Decimal>, UpstreamError> {
        let url = self.url_for(coin_ids);
        debug!("Requesting prices from {}", url);

        let text = load_text(&self.http_client, &url).await?;
        parse_simple_price(&text)
    }
}

/// Parses `{ "<coin-id>": {"usd": number}, ... }`.
fn parse_simple_price(text: &str) -> Result<HashMap<String, Decimal>, UpstreamError> {
    let table: Map<String, Value> =
        serde_json::from_str(text).map_err(|err| UpstreamError::InvalidData(err.to_string()))?;
    if table.is_empty() {
        return Err(UpstreamError::InvalidData("empty price table".to_string()));
    }

    Ok(table
        .into_iter()
        .filter_map(|(id, quote)| {
            let usd = quote.get("usd").and_then(decimal_from_json)?;
            Some((id, usd))
        })
        .collect())
}
