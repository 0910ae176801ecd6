use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    create_link_handler, delete_link_handler, health_handler, link_stats_handler,
    owner_links_handler, remove_unused_handler, resolve_handler, search_handler,
    update_link_handler,
};
use crate::state::AppState;

pub struct App {}

impl App {
    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .nest(
                "/links",
                Router::new()
                    .route("/shorten", post(create_link_handler))
                    .route("/search", get(search_handler))
                    .route(
                        "/{short_code}",
                        get(resolve_handler)
                            .put(update_link_handler)
                            .delete(delete_link_handler),
                    )
                    .route("/{short_code}/stats", get(link_stats_handler)),
            )
            .nest(
                "/account",
                Router::new()
                    .route("/links", get(owner_links_handler))
                    .route("/links/unused", delete(remove_unused_handler)),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}
