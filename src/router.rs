use actix_web::{HttpRequest, http::Method, web};
use log::debug;

use crate::cryptocurrency::{CalculateRequest, CryptocurrencyService};
use crate::response::ApiResponse;

pub const COLLECTION: &str = "cryptocurrencies";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    ListAll,
    BySymbol(String),
    Calculate,
    UpdatePrices,
    RouteNotFound,
    MethodNotFound,
    NotFound,
}

/// Top-level segment first, then method, then the remaining segments.
pub fn resolve(method: &Method, path: &str) -> Route {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    if segments.first() != Some(&COLLECTION) {
        return Route::NotFound;
    }

    let sub_route = segments.get(1).copied();
    match *method {
        Method::GET => match segments.as_slice() {
            [_] => Route::ListAll,
            [_, symbol] => Route::BySymbol(symbol.to_string()),
            _ => Route::RouteNotFound,
        },
        Method::POST => match sub_route {
            Some("calculate") => Route::Calculate,
            Some("update") => Route::UpdatePrices,
            _ => Route::RouteNotFound,
        },
        Method::PUT => match sub_route {
            Some("update") => Route::UpdatePrices,
            _ => Route::RouteNotFound,
        },
        _ => Route::MethodNotFound,
    }
}

/// Catch-all handler: every request lands here and is answered by exactly one service call.
pub async fn dispatch(
    req: HttpRequest,
    body: web::Bytes,
    service: web::Data<CryptocurrencyService>,
) -> ApiResponse {
    let route = resolve(req.method(), req.path());
    debug!("{} {} -> {:?}", req.method(), req.path(), route);

    match route {
        Route::ListAll => service.list_all().await,
        Route::BySymbol(symbol) => service.get_by_symbol(&symbol).await,
        Route::Calculate => match CalculateRequest::from_body(&body) {
            Some(input) => {
                service
                    .calculate_value(&input.symbol, &input.amount, &input.currency)
                    .await
            }
            None => ApiResponse::bad_request("Invalid input"),
        },
        Route::UpdatePrices => service.update_prices().await,
        Route::RouteNotFound => ApiResponse::not_found("Route not found"),
        Route::MethodNotFound => ApiResponse::not_found("Method not found"),
        Route::NotFound => ApiResponse::not_found("Not Found"),
    }
}
