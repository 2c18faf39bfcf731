use actix_web::{HttpRequest, HttpResponse, post, web};
use log::{info, warn};
use serde::Deserialize;
use tokio::time::Instant;

use super::{ApiError, ApiResult, AppState, SyncBody};

pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    #[serde(default)]
    pub force: bool,
}

/// Requests without a configured secret are always rejected.
fn authorize(req: &HttpRequest, expected: Option<&str>) -> ApiResult<()> {
    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match (expected, presented) {
        (Some(expected), Some(presented)) if expected == presented => Ok(()),
        (None, _) => {
            warn!("Sync requested but no sync API key is configured");
            Err(ApiError::Forbidden)
        }
        _ => Err(ApiError::Forbidden),
    }
}

#[post("/jobs/sync")]
pub async fn sync(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<SyncQuery>,
) -> ApiResult<HttpResponse> {
    authorize(&req, state.config.sync_api_key.as_deref())?;

    info!("Manual sync requested: force={}", query.force);
    let deadline = Instant::now() + state.config.sync_deadline;
    let report = state.sync.sync_all(query.force, Some(deadline)).await?;

    Ok(HttpResponse::Ok().json(SyncBody {
        status: report.status(),
        report: &report,
    }))
}
