use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::auth::require_auth;
use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_size as usize;

    let protected = Router::new()
        // Users
        .route("/users/me", get(handlers::me))
        // Files
        .route("/files", get(handlers::list_files))
        .route("/files/upload", post(handlers::upload_file))
        .route("/files/saved", get(handlers::list_saved_maps))
        .route("/files/save", post(handlers::save_map))
        .route("/files/update/:id", put(handlers::update_map))
        .route("/files/download/:file_id", get(handlers::download_file))
        .route("/files/map/:id", get(handlers::get_map))
        .route("/files/:id", get(handlers::get_file))
        // Annotations
        .route("/shapes/save", post(handlers::save_shape))
        .route("/shapes/getShapes", get(handlers::list_shapes))
        .route("/markers/add", post(handlers::add_marker))
        .route("/markers", get(handlers::list_markers))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let mut router = Router::new()
        .route("/users/register", post(handlers::register))
        .route("/users/login", post(handlers::login))
        // Internal
        .route("/_internal/health", get(handlers::health))
        .merge(protected);

    if state.config.storage.public_uploads {
        router = router.route("/uploads/*key", get(handlers::serve_upload));
    } else {
        tracing::info!("Public uploads disabled; content is served through /files/download only.");
    }

    router
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
