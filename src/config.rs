use std::{env, fmt, str::FromStr, time::Duration};

use anyhow::{Context, Result, anyhow};

pub const POSTGRES_PORT: u16 = 5432;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PRICE_API_URL: &str = "https://api.coingecko.com/api/v3/simple/price";
const DEFAULT_RATE_API_URL: &str = "https://api.exchangerate-api.com/v4/latest";

#[derive(Clone)]
pub struct DatabaseSettings {
    pub host: String,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub bind_address: String,
    pub port: u16,
    /// Applied to every outbound call to the price and rate services.
    pub upstream_timeout: Duration,
    pub price_api_url: String,
    pub rate_api_url: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database = DatabaseSettings {
            host: required(&lookup, "DB_HOST")?,
            name: required(&lookup, "DB_NAME")?,
            user: required(&lookup, "DB_USER")?,
            password: required(&lookup, "DB_PASS")?,
        };

        let timeout_secs = parsed_or(
            &lookup,
            "UPSTREAM_TIMEOUT_SECS",
            DEFAULT_UPSTREAM_TIMEOUT_SECS,
        )?;

        Ok(Self {
            database,
            bind_address: lookup("BIND_ADDRESS")
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            port: parsed_or(&lookup, "PORT", DEFAULT_PORT)?,
            upstream_timeout: Duration::from_secs(timeout_secs),
            price_api_url: lookup("PRICE_API_URL")
                .unwrap_or_else(|| DEFAULT_PRICE_API_URL.to_string()),
            rate_api_url: lookup("RATE_API_URL")
                .unwrap_or_else(|| DEFAULT_RATE_API_URL.to_string()),
        })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key).ok_or_else(|| anyhow!("{} must be set in environment variables", key))
}

fn parsed_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    const DB_VARS: [(&str, &str); 4] = [
        ("DB_HOST", "localhost"),
        ("DB_NAME", "crypto"),
        ("DB_USER", "postgres"),
        ("DB_PASS", "secret"),
    ];

    #[test]
    fn defaults_apply_when_only_database_is_configured() {
        let settings = Settings::from_lookup(lookup_from(&DB_VARS)).unwrap();

        assert_eq!(settings.database.host, "localhost");
        assert_eq!(settings.database.name, "crypto");
        assert_eq!(settings.bind_address, "0.0.0.0");
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.upstream_timeout, Duration::from_secs(10));
        assert_eq!(settings.price_api_url, DEFAULT_PRICE_API_URL);
        assert_eq!(settings.rate_api_url, DEFAULT_RATE_API_URL);
    }

    #[test]
    fn optional_values_override_defaults() {
        let mut vars = DB_VARS.to_vec();
        vars.extend([
            ("PORT", "9000"),
            ("UPSTREAM_TIMEOUT_SECS", " 3 "),
            ("RATE_API_URL", "http://rates.local/latest"),
        ]);

        let settings = Settings::from_lookup(lookup_from(&vars)).unwrap();

        assert_eq!(settings.port, 9000);
        assert_eq!(settings.upstream_timeout, Duration::from_secs(3));
        assert_eq!(settings.rate_api_url, "http://rates.local/latest");
    }

    #[test]
    fn missing_database_variable_is_reported_by_name() {
        let err = Settings::from_lookup(lookup_from(&DB_VARS[..3])).unwrap_err();
        assert!(err.to_string().contains("DB_PASS"));
    }

    #[test]
    fn unparseable_port_fails() {
        let mut vars = DB_VARS.to_vec();
        vars.push(("PORT", "eighty"));

        let err = Settings::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn debug_output_hides_the_password() {
        let settings = Settings::from_lookup(lookup_from(&DB_VARS)).unwrap();
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("secret"));
    }
}
