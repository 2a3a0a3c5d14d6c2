//! Metrics endpoint

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use tracing::instrument;

use crate::aggregator::{AggregateQuery, DEFAULT_LOOKBACK_HOURS};
use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::MetricsResponse,
};

/// Raw query parameters
///
/// `hours` is taken as a string so a malformed value produces the structured
/// error body instead of axum's plain-text rejection.
#[derive(Debug, Default, Deserialize)]
pub struct MetricsParams {
    pub hours: Option<String>,
    pub api: Option<String>,
}

impl MetricsParams {
    fn into_query(self) -> ApiResult<AggregateQuery> {
        let hours = match self.hours.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_LOOKBACK_HOURS,
            Some(raw) => raw
                .parse()
                .map_err(|_| ApiError::InvalidRequest(format!("hours must be an integer, got `{raw}`")))?,
        };
        let api = self.api.filter(|api| !api.trim().is_empty());
        Ok(AggregateQuery::new(hours, api))
    }
}

/// GET /metrics?hours=<int>&api=<hostname>
#[instrument(skip(state))]
pub async fn get_metrics(
    State(state): State<ApiState>,
    Query(params): Query<MetricsParams>,
) -> ApiResult<Json<MetricsResponse>> {
    let query = params.into_query()?;
    let (report, window) = state.aggregator.aggregate(&query).await?;

    Ok(Json(MetricsResponse::new(
        report,
        window,
        query.hours,
        query.api,
    )))
}
