use actix_web::{HttpRequest, HttpResponse, get, web};
use serde::Deserialize;

use super::{ApiResult, AppState, client_token, conditional_response};

#[derive(Debug, Deserialize)]
pub struct ProviderQuery {
    pub provider: Option<String>,
}

impl ProviderQuery {
    /// `?provider=` with an empty value selects the default.
    pub fn provider(&self) -> Option<&str> {
        self.provider
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// Latest merged rates, or one provider's latest run when `provider` is given.
#[get("/rates/latest")]
pub async fn latest_rates(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<ProviderQuery>,
) -> ApiResult<HttpResponse> {
    let result = state
        .query
        .get_latest_rates(query.provider(), client_token(&req))
        .await?;
    Ok(conditional_response(result, state.config.rates_ttl))
}
