use crate::{handlers, AppState};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::{path::PathBuf, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

/// Request bodies are small JSON documents.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Creates the Axum router and associates routes with handlers.
///
/// `media_root` is served at `/media` when images are stored locally.
pub fn create_router(state: Arc<AppState>, media_root: Option<PathBuf>) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .route("/register", post(handlers::register))
        .route("/token", post(handlers::obtain_token))
        .route("/token/refresh", post(handlers::refresh_token))
        .route("/templates", get(handlers::list_templates))
        .route("/memes", get(handlers::list_memes).post(handlers::create_meme))
        // Static segments take precedence over the `{id}` capture.
        .route("/memes/random", get(handlers::random_meme))
        .route("/memes/top", get(handlers::top_memes))
        .route("/memes/surprise-me", get(handlers::surprise_me))
        .route("/memes/{id}", get(handlers::get_meme))
        .route("/memes/{id}/rate", post(handlers::rate_meme));

    if let Some(root) = media_root {
        router = router.nest_service("/media", ServeDir::new(root));
    }

    router
        // Middleware Layers
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
