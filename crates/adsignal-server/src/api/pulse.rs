use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;

use adsignal_engine::{run_pulse, PulseReport, PulseResponse, PulseServices};

use crate::middleware::RequestId;

use super::{map_engine_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct ReportsQuery {
    pub limit: Option<i64>,
}

pub(super) async fn run_pulse_pass(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<PulseResponse>, ApiError> {
    let services = PulseServices {
        records: state.records.as_ref(),
        reports: state.reports.as_ref(),
        embedder: state.embedder.as_ref(),
        webhooks: state.webhooks.as_ref(),
        narrator: state.narrator.as_ref(),
    };
    let response = run_pulse(services, state.detector, Utc::now())
        .await
        .map_err(|e| map_engine_error(req_id.0, &e))?;
    Ok(Json(response))
}

pub(super) async fn list_pulse_reports(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ReportsQuery>,
) -> Result<Json<ApiResponse<Vec<PulseReport>>>, ApiError> {
    let data = state
        .reports
        .recent_pulse_reports(normalize_limit(query.limit))
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}
