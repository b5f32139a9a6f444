use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::{Context, Result};
use log::info;

use coin_price::CoinGeckoClient;
use config::Settings;
use cryptocurrency::CryptocurrencyService;
use exchange_rate::ExchangeRateClient;
use store::PgCryptocurrencyStore;

mod coin_price;
mod config;
mod cryptocurrency;
mod exchange_rate;
mod numeric;
mod response;
mod router;
mod store;
mod upstream;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let settings = Settings::from_env()?;
    info!(
        "Using database {} at {}:{}",
        settings.database.name,
        settings.database.host,
        config::POSTGRES_PORT
    );

    let http_client = upstream::build_client(settings.upstream_timeout)
        .context("Failed to build HTTP client")?;
    let service = web::Data::new(CryptocurrencyService::new(
        Box::new(PgCryptocurrencyStore::connect_lazy(&settings.database)),
        Box::new(CoinGeckoClient::new(
            http_client.clone(),
            settings.price_api_url.clone(),
        )),
        Box::new(ExchangeRateClient::new(
            http_client,
            settings.rate_api_url.clone(),
        )),
    ));

    info!(
        "Listening on {}:{} (upstream timeout {:?})",
        settings.bind_address, settings.port, settings.upstream_timeout
    );
    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .wrap(Logger::default())
            .default_service(web::to(router::dispatch))
    })
    .bind((settings.bind_address.as_str(), settings.port))
    .with_context(|| format!("Can't bind {}:{}", settings.bind_address, settings.port))?
    .run()
    .await?;

    Ok(())
}
