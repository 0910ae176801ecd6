mod account;
mod health;
mod links;

pub use account::{owner_links_handler, remove_unused_handler};
pub use health::health_handler;
pub use links::{
    create_link_handler, delete_link_handler, link_stats_handler, resolve_handler,
    search_handler, update_link_handler,
};

use snaplink_core::{ServiceError, ShortCode};

use crate::error::AppError;

/// A path segment that is not a well-formed code cannot name a link.
fn parse_code(raw: String) -> Result<ShortCode, AppError> {
    ShortCode::new(raw.as_str()).map_err(|_| AppError::Service(ServiceError::NotFound(raw)))
}
