use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    state.store.ping().await?;
    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::{send, test_app};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health() {
        let app = test_app().await;
        let resp = send(&app, "GET", "/health", None, None).await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body["status"], "ok");
    }
}
