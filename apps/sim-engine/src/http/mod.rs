//! HTTP adapter: authentication, wire types, and routes.

pub mod api_types;
pub mod auth;
pub mod routes;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::SimError;

pub use auth::{ApiKey, ApiKeySet, basic_header};
pub use routes::{AppState, create_router};

impl IntoResponse for SimError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = api_types::ErrorBody {
            code: self.wire_code(),
            message: self.to_string(),
            field: self.field().map(str::to_string),
        };
        (status, Json(body)).into_response()
    }
}
