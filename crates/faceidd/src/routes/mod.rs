use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::AppState;

mod health;
mod people;
mod users;

/// Build the full HTTP surface.
pub fn router(state: Arc<AppState>, cors_origin: Option<&str>) -> Router {
    let api = Router::new()
        .route("/signup", post(users::signup))
        .route("/login", post(users::login))
        .route("/logout", get(users::logout))
        .route("/google-auth", post(users::google_auth))
        .route("/me", get(users::me))
        .route(
            "/people",
            post(people::create).get(people::list).delete(people::remove),
        )
        .route("/people/match", post(people::match_descriptor));

    let app = Router::new()
        .route("/health", get(health::health))
        .nest("/api/users", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    match cors_origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_credentials(true)
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        ),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "ignoring invalid FACEID_CORS_ORIGIN");
            app
        }
        None => app,
    }
}

/// Unwrap a JSON body, turning malformed input into a 400.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(ApiError::from)
}

/// A required, non-blank string field (trimmed).
fn required(value: Option<String>, message: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(message))
}
