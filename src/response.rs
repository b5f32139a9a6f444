use actix_web::{HttpRequest, HttpResponse, Responder, body::BoxBody, http::StatusCode};
use serde::Serialize;

use crate::cryptocurrency::{CryptocurrencyRecord, Valuation};
use crate::store::StoreError;

/// JSON payload of every reply. Untagged, so each variant keeps its own wire shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Records(Vec<CryptocurrencyRecord>),
    Record(CryptocurrencyRecord),
    Valuation(Valuation),
    Message { message: String },
    Error { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: ResponseBody,
}

impl ApiResponse {
    pub fn ok(body: ResponseBody) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::ok(ResponseBody::Message {
            message: message.into(),
        })
    }

    pub fn error(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ResponseBody::Error {
                error: error.into(),
            },
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::error(StatusCode::BAD_REQUEST, error)
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self::error(StatusCode::NOT_FOUND, error)
    }

    pub fn internal_error(error: impl Into<String>) -> Self {
        Self::error(StatusCode::INTERNAL_SERVER_ERROR, error)
    }
}

impl From<StoreError> for ApiResponse {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection(reason) => {
                Self::internal_error(format!("Connection failed: {}", reason))
            }
            StoreError::Query(reason) => Self::internal_error(format!("Query failed: {}", reason)),
        }
    }
}

impl Responder for ApiResponse {
    type Body = BoxBody;

    fn respond_to(self, _req: &HttpRequest) -> HttpResponse<Self::Body> {
        HttpResponse::build(self.status).json(&self.body)
    }
}
