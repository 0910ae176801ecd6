use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use snaplink_core::ServiceError;
use snaplink_resolver::Resolution;
use snaplink_shortener::CreateLink;
use tracing::debug;

use super::parse_code;
use crate::error::{AppError, Result};
use crate::extract::Requester;
use crate::model::{
    CreateLinkRequest, CreateLinkResponse, DeleteLinkResponse, LinkStatsResponse, SearchQuery,
    SearchResult, UpdateLinkRequest,
};
use crate::state::AppState;

pub async fn create_link_handler(
    State(state): State<AppState>,
    Requester(owner): Requester,
    request: std::result::Result<Json<CreateLinkRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = request.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let record = state
        .links()
        .create(
            CreateLink {
                original_url: request.original_url,
                custom_alias: request.custom_alias,
                expires_at: request.expires_at,
            },
            owner,
        )
        .await?;

    let body = CreateLinkResponse::new(&record, state.base_url());
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub async fn resolve_handler(
    Path(short_code): Path<String>,
    State(state): State<AppState>,
) -> Result<Response> {
    let code = parse_code(short_code)?;

    match state.resolver().resolve(&code).await? {
        // Redirect::to would answer 303; clients expect a plain 302 here.
        Resolution::Redirect(target) => {
            Ok((StatusCode::FOUND, [(header::LOCATION, target)]).into_response())
        }
        Resolution::NotFound => Err(ServiceError::NotFound(code.into()).into()),
        Resolution::Gone => Err(ServiceError::Gone(code.into()).into()),
    }
}

pub async fn update_link_handler(
    Path(short_code): Path<String>,
    State(state): State<AppState>,
    Requester(requester): Requester,
    request: std::result::Result<Json<UpdateLinkRequest>, JsonRejection>,
) -> Result<Json<LinkStatsResponse>> {
    let code = parse_code(short_code)?;
    let Json(request) = request.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let record = state
        .links()
        .update(&code, &request.original_url, requester)
        .await?;
    Ok(Json(record.into()))
}

pub async fn delete_link_handler(
    Path(short_code): Path<String>,
    State(state): State<AppState>,
    Requester(requester): Requester,
) -> Result<Json<DeleteLinkResponse>> {
    let code = parse_code(short_code)?;
    state.links().delete(&code, requester).await?;

    Ok(Json(DeleteLinkResponse {
        short_code: code.into(),
        deleted: true,
    }))
}

pub async fn link_stats_handler(
    Path(short_code): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<LinkStatsResponse>> {
    let code = parse_code(short_code)?;
    let record = state.links().stats(&code).await?;
    Ok(Json(record.into()))
}

pub async fn search_handler(
    State(state): State<AppState>,
    query: std::result::Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Vec<SearchResult>>> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let found = state.links().search(&query.original_url).await?;
    debug!(matches = found.len(), "Search served");

    let base_url = state.base_url();
    Ok(Json(
        found
            .iter()
            .map(|record| SearchResult::new(record, base_url))
            .collect(),
    ))
}
