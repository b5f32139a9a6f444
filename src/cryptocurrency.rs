use chrono::Utc;
use log::{error, info, warn};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::coin_price::{PriceSource, TRACKED_COINS};
use crate::exchange_rate::RateSource;
use crate::numeric::decimal_from_json;
use crate::response::{ApiResponse, ResponseBody};
use crate::store::{CryptocurrencyStore, StoreError};
use crate::upstream::UpstreamError;

pub const BASE_CURRENCY: &str = "USD";

/// One stored row. Columns other than `price_usd` are passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CryptocurrencyRecord {
    #[serde(skip)]
    pub price_usd: Decimal,
    #[serde(flatten)]
    pub columns: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Valuation {
    pub amount: Decimal,
    pub symbol: String,
    pub price_per_unit: Decimal,
    pub currency: String,
    pub total_price: Decimal,
}

/// Body of a calculate request once every field is known to be present.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculateRequest {
    pub symbol: String,
    pub amount: Value,
    pub currency: String,
}

impl CalculateRequest {
    /// `None` when the body is not a JSON object or a field is missing or null.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        let Ok(Value::Object(mut fields)) = serde_json::from_slice::<Value>(body) else {
            return None;
        };

        let amount = fields.remove("amount").filter(|amount| !amount.is_null())?;
        let symbol = fields.remove("symbol").and_then(scalar_text)?;
        let currency = fields.remove("currency").and_then(scalar_text)?;

        Some(Self {
            symbol,
            amount,
            currency,
        })
    }
}

/// Text form of a scalar field, rendered the way a query parameter would be.
fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(true) => Some("1".to_string()),
        Value::Bool(false) => Some(String::new()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

pub struct CryptocurrencyService {
    store: Box<dyn CryptocurrencyStore>,
    prices: Box<dyn PriceSource>,
    rates: Box<dyn RateSource>,
}

impl CryptocurrencyService {
    pub fn new(
        store: Box<dyn CryptocurrencyStore>,
        prices: Box<dyn PriceSource>,
        rates: Box<dyn RateSource>,
    ) -> Self {
        Self {
            store,
            prices,
            rates,
        }
    }

    pub async fn list_all(&self) -> ApiResponse {
        match self.store.list_all().await {
            Ok(records) => ApiResponse::ok(ResponseBody::Records(records)),
            Err(err) => store_failure(err),
        }
    }

    pub async fn get_by_symbol(&self, symbol: &str) -> ApiResponse {
        match self.store.find_by_symbol(symbol).await {
            Ok(Some(record)) => ApiResponse::ok(ResponseBody::Record(record)),
            Ok(None) => ApiResponse::not_found("Cryptocurrency not found"),
            Err(err) => store_failure(err),
        }
    }

    pub async fn calculate_value(
        &self,
        symbol: &str,
        amount: &Value,
        currency: &str,
    ) -> ApiResponse {
        let amount = match decimal_from_json(amount) {
            Some(amount) if amount > Decimal::ZERO => amount,
            _ => return ApiResponse::bad_request("Invalid amount"),
        };

        let record = match self.store.find_by_symbol(symbol).await {
            Ok(Some(record)) => record,
            Ok(None) => return ApiResponse::not_found("Cryptocurrency not found"),
            Err(err) => return store_failure(err),
        };

        let Some(mut total_price) = record.price_usd.checked_mul(amount) else {
            return ApiResponse::bad_request("Invalid amount");
        };

        if currency != BASE_CURRENCY {
            let rate = match self.rates.conversion_rate(BASE_CURRENCY, currency).await {
                Ok(rate) => rate,
                Err(err) => {
                    warn!("No {} -> {} rate available: {}", BASE_CURRENCY, currency, err);
                    return ApiResponse::bad_request("Unsupported currency");
                }
            };
            let Some(converted) = total_price.checked_mul(rate) else {
                return ApiResponse::bad_request("Invalid amount");
            };
            total_price = converted;
        }

        ApiResponse::ok(ResponseBody::Valuation(Valuation {
            amount,
            symbol: symbol.to_string(),
            price_per_unit: record.price_usd,
            currency: currency.to_string(),
            total_price,
        }))
    }

    pub async fn update_prices(&self) -> ApiResponse {
        let coin_ids: Vec<String> = TRACKED_COINS.iter().map(|(id, _)| id.to_string()).collect();

        let prices = match self.prices.usd_prices(&coin_ids).await {
            Ok(prices) => prices,
            Err(UpstreamError::Unreachable(reason)) => {
                error!("Price API unreachable: {}", reason);
                return ApiResponse::internal_error("Failed to retrieve data from API");
            }
            Err(UpstreamError::InvalidData(reason)) => {
                error!("Price API returned unusable data: {}", reason);
                return ApiResponse::internal_error("Invalid data from API");
            }
        };

        let updated_at = Utc::now();
        for (coin_id, symbol) in TRACKED_COINS {
            let Some(price) = prices.get(coin_id) else {
                continue;
            };

            match self.store.update_price(symbol, *price, updated_at).await {
                Ok(rows) => info!("Updated {} to {} USD ({} rows)", symbol, price, rows),
                // The store being unreachable ends the request; anything else only skips the row.
                Err(err @ StoreError::Connection(_)) => return store_failure(err),
                Err(err) => warn!("Skipping price update for {}: {}", symbol, err),
            }
        }

        ApiResponse::message("Cryptocurrency prices updated successfully")
    }
}

fn store_failure(err: StoreError) -> ApiResponse {
    error!("Store failure: {}", err);
    ApiResponse::from(err)
}
