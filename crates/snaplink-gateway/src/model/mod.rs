mod account;
mod link;

pub use account::{OwnerLinksResponse, RemovedResponse, UnusedLinksQuery};
pub use link::{
    CreateLinkRequest, CreateLinkResponse, DeleteLinkResponse, LinkStatsResponse, SearchQuery,
    SearchResult, UpdateLinkRequest,
};

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}
