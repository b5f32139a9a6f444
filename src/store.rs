use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::{
    Connection, FromRow, PgConnection, PgPool, Row,
    postgres::{PgConnectOptions, PgPoolOptions, PgRow},
    types::Json,
};

use crate::config::{DatabaseSettings, POSTGRES_PORT};
use crate::cryptocurrency::CryptocurrencyRecord;

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const DIRECT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

// Every column rides along as JSON; price_usd is read again as NUMERIC for arithmetic.
const SELECT_ALL: &str = "SELECT c.price_usd, to_jsonb(c) AS record FROM cryptocurrency c";
const SELECT_BY_SYMBOL: &str =
    "SELECT c.price_usd, to_jsonb(c) AS record FROM cryptocurrency c WHERE c.symbol = $1";
const UPDATE_PRICE: &str =
    "UPDATE cryptocurrency SET price_usd = $1, updated_at = $2 WHERE symbol = $3";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let is_connection = match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => true,
            // 08: connection exception, 28: invalid authorization, 3D: unknown database
            sqlx::Error::Database(db_err) => db_err
                .code()
                .is_some_and(|code| ["08", "28", "3D"].iter().any(|class| code.starts_with(class))),
            _ => false,
        };

        if is_connection {
            Self::Connection(err.to_string())
        } else {
            Self::Query(err.to_string())
        }
    }
}

#[async_trait]
pub trait CryptocurrencyStore: Send + Sync {
    async fn list_all(&self) -> Result<Vec<CryptocurrencyRecord>, StoreError>;

    async fn find_by_symbol(
        &self,
        symbol: &str,
    ) -> Result<Option<CryptocurrencyRecord>, StoreError>;

    /// Overwrites the price of one symbol, returning the number of rows touched.
    async fn update_price(
        &self,
        symbol: &str,
        price_usd: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

impl<'r> FromRow<'r, PgRow> for CryptocurrencyRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let Json(columns) = row.try_get::<Json<Map<String, Value>>, _>("record")?;

        Ok(Self {
            price_usd: row.try_get("price_usd")?,
            columns,
        })
    }
}

pub struct PgCryptocurrencyStore {
    pool: PgPool,
    options: PgConnectOptions,
}

impl PgCryptocurrencyStore {
    /// Builds the pool without opening a connection; the first query connects.
    pub fn connect_lazy(settings: &DatabaseSettings) -> Self {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(POSTGRES_PORT)
            .database(&settings.name)
            .username(&settings.user)
            .password(&settings.password);

        Self::with_options(options, ACQUIRE_TIMEOUT)
    }

    fn with_options(options: PgConnectOptions, acquire_timeout: Duration) -> Self {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(acquire_timeout)
            .connect_lazy_with(options.clone());

        Self { pool, options }
    }

    /// The pool hides the driver's reason behind `PoolTimedOut`; one direct attempt recovers it.
    async fn failure(&self, err: sqlx::Error) -> StoreError {
        if !matches!(err, sqlx::Error::PoolTimedOut) {
            return err.into();
        }

        let attempt = tokio::time::timeout(
            DIRECT_CONNECT_TIMEOUT,
            PgConnection::connect_with(&self.options),
        );
        match attempt.await {
            Err(_) => err.into(),
            Ok(Err(reason)) => {
                let cause = StoreError::from(reason);
                match cause {
                    StoreError::Connection(_) => cause,
                    StoreError::Query(reason) => StoreError::Connection(reason),
                }
            }
            Ok(Ok(conn)) => {
                let _ = conn.close().await;
                err.into()
            }
        }
    }
}

#[async_trait]
impl CryptocurrencyStore for PgCryptocurrencyStore {
    async fn list_all(&self) -> Result<Vec<CryptocurrencyRecord>, StoreError> {
        match sqlx::query_as::<_, CryptocurrencyRecord>(SELECT_ALL)
            .fetch_all(&self.pool)
            .await
        {
            Ok(records) => Ok(records),
            Err(err) => Err(self.failure(err).await),
        }
    }

    async fn find_by_symbol(
        &self,
        symbol: &str,
    ) -> Result<Option<CryptocurrencyRecord>, StoreError> {
        match sqlx::query_as::<_, CryptocurrencyRecord>(SELECT_BY_SYMBOL)
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(record) => Ok(record),
            Err(err) => Err(self.failure(err).await),
        }
    }

    async fn update_price(
        &self,
        symbol: &str,
        price_usd: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        match sqlx::query(UPDATE_PRICE)
            .bind(price_usd)
            .bind(updated_at)
            .bind(symbol)
            .execute(&self.pool)
            .await
        {
            Ok(result) => Ok(result.rows_affected()),
            Err(err) => Err(self.failure(err).await),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_connection_failures() {
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::Connection(_)
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused"
            ))),
            StoreError::Connection(reason) if reason.contains("connection refused")
        ));
    }

    #[test]
    fn statement_errors_are_query_failures() {
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::Query(_)
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::ColumnNotFound("price_usd".to_string())),
            StoreError::Query(_)
        ));
    }

    #[tokio::test]
    async fn refused_connection_reports_the_driver_message() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let options = PgConnectOptions::new()
            .host("127.0.0.1")
            .port(port)
            .database("crypto")
            .username("nobody")
            .password("nothing");
        let store = PgCryptocurrencyStore::with_options(options, Duration::from_millis(200));

        match store.list_all().await {
            Err(StoreError::Connection(reason)) => {
                assert!(!reason.contains("pool timed out"), "got {:?}", reason);
            }
            other => panic!("expected a connection failure, got {:?}", other),
        }
    }
}
