pub mod health;
pub mod jobs;
pub mod rates;
pub mod symbols;

use std::sync::Arc;
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::http::header::{CACHE_CONTROL, ETAG, IF_NONE_MATCH};
use actix_web::{HttpRequest, HttpResponse, ResponseError, web};
use log::error;
use serde::Serialize;
use thiserror::Error;

use crate::config::Config;
use crate::error::QueryError;
use crate::etag::{Conditional, cache_control};
use crate::query::QueryService;
use crate::sync::{SyncError, SyncReport, SyncService, SyncStatus};

/// Shared by every worker through `web::Data`.
pub struct AppState {
    pub query: QueryService,
    pub sync: Arc<SyncService>,
    pub config: Arc<Config>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health::health)
        .service(rates::latest_rates)
        .service(symbols::latest_symbols)
        .service(jobs::sync);
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("no data available")]
    NoDataAvailable,
    #[error("missing or invalid API key")]
    Forbidden,
    #[error("every provider failed")]
    TotalSyncFailure(SyncReport),
    #[error("internal error")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

/// Body of `POST /jobs/sync`, for success and total failure alike.
#[derive(Serialize)]
pub struct SyncBody<'a> {
    pub status: SyncStatus,
    #[serde(flatten)]
    pub report: &'a SyncReport,
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::NoDataAvailable => "NoDataAvailable",
            ApiError::Forbidden => "Forbidden",
            ApiError::TotalSyncFailure(_) => "TotalSyncFailure",
            ApiError::Internal(_) => "Internal",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NoDataAvailable => StatusCode::NOT_FOUND,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::TotalSyncFailure(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::Internal(detail) = self {
            error!("Request failed: {}", detail);
        }

        let mut response = HttpResponse::build(self.status_code());
        match self {
            ApiError::TotalSyncFailure(report) => response.json(SyncBody {
                status: SyncStatus::Failed,
                report,
            }),
            _ => response.json(ErrorBody {
                error: self.code(),
                message: self.to_string(),
            }),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NoDataAvailable => ApiError::NoDataAvailable,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::TotalFailure(report) => ApiError::TotalSyncFailure(report),
        }
    }
}

pub(crate) fn client_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
}

/// 200 with the payload or 304, both carrying the validator and cache policy.
pub(crate) fn conditional_response<T: Serialize>(
    result: Conditional<T>,
    ttl: Duration,
) -> HttpResponse {
    let cache_control = cache_control(ttl);
    match result {
        Conditional::Modified { payload, etag } => HttpResponse::Ok()
            .insert_header((ETAG, etag))
            .insert_header((CACHE_CONTROL, cache_control))
            .json(payload),
        Conditional::NotModified { etag } => HttpResponse::NotModified()
            .insert_header((ETAG, etag))
            .insert_header((CACHE_CONTROL, cache_control))
            .finish(),
    }
}
