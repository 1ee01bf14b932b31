use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;

use adsignal_engine::{run_radar, RadarParams, RadarReport};

use crate::middleware::RequestId;

use super::{map_engine_error, ApiError, AppState};

/// Raw query params; anything unparsable falls back to the default.
#[derive(Debug, Default, Deserialize)]
pub(super) struct RadarQuery {
    pub days: Option<String>,
    pub category: Option<String>,
    pub top: Option<String>,
}

impl RadarQuery {
    pub(super) fn params(&self) -> RadarParams {
        RadarParams::new(
            self.days.as_deref().and_then(parse_int_prefix),
            self.category.clone(),
            self.top.as_deref().and_then(parse_int_prefix),
        )
    }
}

/// Leading optional sign and digits, so `"14.5"` reads as 14 and `"30d"` as 30.
///
/// Digit runs beyond `i64` saturate, so huge values still clamp downstream.
pub(super) fn parse_int_prefix(raw: &str) -> Option<i64> {
    let s = raw.trim();
    let negative = s.starts_with('-');
    let sign_len = usize::from(s.starts_with(['-', '+']));
    let digits = s[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    let saturated = if negative { i64::MIN } else { i64::MAX };
    Some(s[..sign_len + digits].parse().unwrap_or(saturated))
}

pub(super) async fn get_radar(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RadarQuery>,
) -> Result<Json<RadarReport>, ApiError> {
    let params = query.params();
    let report = run_radar(state.records.as_ref(), &params, Utc::now())
        .await
        .map_err(|e| map_engine_error(req_id.0, &e))?;
    Ok(Json(report))
}
