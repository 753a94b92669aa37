use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};

use crate::cors::{CorsSettings, cors_layer};
use crate::handlers::records::{Resource, routes};
use crate::handlers::{
    delete_image_handler, email_handler, health_handler, list_images_handler, login_handler,
    me_handler, metrics_handler, refresh_handler, upload_handler,
};
use crate::middleware::rate_limit_middleware;
use crate::state::SharedState;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn router(state: SharedState, cors: &CorsSettings) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/refresh", post(refresh_handler))
        .route("/auth/me", get(me_handler))
        .route("/email", post(email_handler))
        .route(
            "/upload",
            post(upload_handler)
                .get(list_images_handler)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/upload/{*path}", delete(delete_image_handler))
        .merge(routes(Resource::Posts))
        .merge(routes(Resource::Categories))
        .merge(routes(Resource::Consultations))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(cors_layer(cors))
        .with_state(state)
}
