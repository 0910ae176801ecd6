use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use jiff::SignedDuration;

use crate::error::{AppError, Result};
use crate::extract::Owner;
use crate::model::{OwnerLinksResponse, RemovedResponse, UnusedLinksQuery};
use crate::state::AppState;

const MAX_HOURS: u32 = 24;

pub async fn owner_links_handler(
    State(state): State<AppState>,
    Owner(owner): Owner,
) -> Result<Json<OwnerLinksResponse>> {
    let report = state.links().owner_links(&owner).await?;
    Ok(Json(report.into()))
}

pub async fn remove_unused_handler(
    State(state): State<AppState>,
    Owner(owner): Owner,
    query: std::result::Result<Query<UnusedLinksQuery>, QueryRejection>,
) -> Result<Json<RemovedResponse>> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    if query.hours > MAX_HOURS {
        return Err(AppError::BadRequest(format!(
            "hours must be at most {MAX_HOURS}, got {}",
            query.hours
        )));
    }

    let hours = i64::from(query.days) * 24 + i64::from(query.hours);
    let removed = state
        .links()
        .remove_unused(&owner, SignedDuration::from_hours(hours))
        .await?;
    Ok(Json(RemovedResponse { removed }))
}
