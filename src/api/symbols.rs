use actix_web::{HttpRequest, HttpResponse, get, web};

use super::rates::ProviderQuery;
use super::{ApiResult, AppState, client_token, conditional_response};

#[get("/symbols/latest")]
pub async fn latest_symbols(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<ProviderQuery>,
) -> ApiResult<HttpResponse> {
    let result = state
        .query
        .get_latest_symbols(query.provider(), client_token(&req))
        .await?;
    Ok(conditional_response(result, state.config.symbols_ttl))
}
