use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use faceid_core::{Descriptor, Matcher};
use faceid_store::{NewPerson, StoreError};
use serde::Deserialize;
use serde_json::{json, Value};

use super::json_body;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Pull a descriptor out of an untyped body, with field-specific messages.
fn parse_descriptor(value: Option<&Value>) -> Result<Descriptor, ApiError> {
    let items = value
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::bad_request("Descriptor is required and must be an array"))?;
    let values = items
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| ApiError::bad_request("Descriptor must contain only numbers"))?;
    Descriptor::new(values).map_err(|e| ApiError::bad_request(e.to_string()))
}

fn non_empty_str<'a>(body: &'a Value, field: &str, message: &str) -> Result<&'a str, ApiError> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request(message))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let body = json_body(payload)?;
    let name = non_empty_str(&body, "name", "Name is required and must be a non-empty string")?;
    let info = non_empty_str(
        &body,
        "info",
        "Info/description is required and must be a non-empty string",
    )?;
    let descriptor = parse_descriptor(body.get("descriptor"))?;

    let person = state
        .store
        .insert_person(
            &claims.id,
            NewPerson {
                name: name.to_string(),
                info: info.to_string(),
                descriptor,
            },
        )
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => {
                ApiError::Conflict("Person with this name already exists".into())
            }
            other => other.into(),
        })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Person registered successfully",
            "person": { "id": person.id, "name": person.name, "info": person.info },
        })),
    ))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> ApiResult<Json<Value>> {
    let people = state.store.list_people(&claims.id).await?;
    tracing::debug!(user_id = %claims.id, count = people.len(), "listed people");
    Ok(Json(json!({ "success": true, "users": people })))
}

#[derive(Debug, Deserialize)]
pub struct RemoveQuery {
    name: Option<String>,
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Query(query): Query<RemoveQuery>,
) -> ApiResult<Json<Value>> {
    let name = query
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Name parameter is required"))?;

    if !state.store.delete_person_by_name(&claims.id, &name).await? {
        return Err(ApiError::NotFound("Person not found".into()));
    }
    let remaining = state.store.count_people(&claims.id).await?;
    tracing::debug!(user_id = %claims.id, remaining, "gallery shrank");
    Ok(Json(json!({
        "success": true,
        "message": "Person deleted successfully",
    })))
}

pub async fn match_descriptor(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let body = json_body(payload)?;
    let query = parse_descriptor(body.get("descriptor"))?;
    let gallery = state.store.list_people(&claims.id).await?;
    let result = state.matcher.best_match(&query, &gallery);
    tracing::debug!(
        user_id = %claims.id,
        matched = result.matched,
        distance = ?result.distance,
        "descriptor matched"
    );
    Ok(Json(json!({ "success": true, "match": result })))
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::{descriptor, send, signup, test_app};
    use axum::http::StatusCode;
    use serde_json::json;

    async fn add(app: &axum::Router, token: &str, name: &str, hot: usize) -> StatusCode {
        send(
            app,
            "POST",
            "/api/users/people",
            Some(token),
            Some(json!({ "name": name, "info": "friend", "descriptor": descriptor(hot, 1.0) })),
        )
        .await
        .status
    }

    #[tokio::test]
    async fn test_people_require_auth() {
        let app = test_app().await;
        let resp = send(&app, "GET", "/api/users/people", None, None).await;
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
        assert_eq!(resp.body["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_create_validation_messages() {
        let app = test_app().await;
        let token = signup(&app, "ada@example.com").await;

        let cases = [
            (
                json!({ "name": "  ", "info": "x", "descriptor": descriptor(0, 1.0) }),
                "Name is required and must be a non-empty string",
            ),
            (
                json!({ "name": "Bob", "info": 5, "descriptor": descriptor(0, 1.0) }),
                "Info/description is required and must be a non-empty string",
            ),
            (
                json!({ "name": "Bob", "info": "x", "descriptor": "nope" }),
                "Descriptor is required and must be an array",
            ),
            (
                json!({ "name": "Bob", "info": "x", "descriptor": [0.1, 0.2] }),
                "Invalid descriptor length. Expected 128, got 2",
            ),
            (
                json!({ "name": "Bob", "info": "x", "descriptor": ["a"] }),
                "Descriptor must contain only numbers",
            ),
        ];
        for (body, message) in cases {
            let resp = send(&app, "POST", "/api/users/people", Some(&token), Some(body)).await;
            assert_eq!(resp.status, StatusCode::BAD_REQUEST);
            assert_eq!(resp.body["error"], message);
        }
    }

    #[tokio::test]
    async fn test_create_list_delete() {
        let app = test_app().await;
        let token = signup(&app, "ada@example.com").await;

        let resp = send(
            &app,
            "POST",
            "/api/users/people",
            Some(&token),
            Some(json!({ "name": " Bob ", "info": " neighbour ", "descriptor": descriptor(1, 1.0) })),
        )
        .await;
        assert_eq!(resp.status, StatusCode::CREATED);
        assert_eq!(resp.body["person"]["name"], "Bob");
        assert_eq!(resp.body["person"]["info"], "neighbour");

        assert_eq!(add(&app, &token, "bob", 2).await, StatusCode::CONFLICT);
        assert_eq!(add(&app, &token, "Carol", 3).await, StatusCode::CREATED);

        let resp = send(&app, "GET", "/api/users/people", Some(&token), None).await;
        let users = resp.body["users"].as_array().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0]["name"], "Bob");
        assert_eq!(users[0]["descriptor"].as_array().unwrap().len(), 128);
        assert!(users[0]["createdAt"].is_string());
        assert!(users.iter().all(|u| u["ownerId"] == users[0]["ownerId"]));
        assert!(users[0]["ownerId"].as_str().is_some_and(|id| !id.is_empty()));

        let resp = send(&app, "DELETE", "/api/users/people", Some(&token), None).await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.body["error"], "Name parameter is required");

        let resp = send(&app, "DELETE", "/api/users/people?name=BOB", Some(&token), None).await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body["message"], "Person deleted successfully");

        let resp = send(&app, "DELETE", "/api/users/people?name=Bob", Some(&token), None).await;
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        assert_eq!(resp.body["error"], "Person not found");
    }

    #[tokio::test]
    async fn test_galleries_are_per_owner() {
        let app = test_app().await;
        let ada = signup(&app, "ada@example.com").await;
        let grace = signup(&app, "grace@example.com").await;

        assert_eq!(add(&app, &ada, "Bob", 1).await, StatusCode::CREATED);
        assert_eq!(add(&app, &grace, "Bob", 1).await, StatusCode::CREATED);

        let resp = send(&app, "DELETE", "/api/users/people?name=Bob", Some(&grace), None).await;
        assert_eq!(resp.status, StatusCode::OK);

        let resp = send(&app, "GET", "/api/users/people", Some(&ada), None).await;
        assert_eq!(resp.body["users"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_match_against_gallery() {
        let app = test_app().await;
        let token = signup(&app, "ada@example.com").await;

        let query = |hot: usize, value: f32| Some(json!({ "descriptor": descriptor(hot, value) }));

        let resp = send(&app, "POST", "/api/users/people/match", Some(&token), query(1, 1.0)).await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body["match"]["matched"], false);
        assert!(resp.body["match"]["distance"].is_null());

        add(&app, &token, "Bob", 1).await;
        add(&app, &token, "Carol", 2).await;

        let resp = send(&app, "POST", "/api/users/people/match", Some(&token), query(1, 0.75)).await;
        assert_eq!(resp.body["match"]["matched"], true);
        assert_eq!(resp.body["match"]["personName"], "Bob");
        assert_eq!(resp.body["match"]["distance"], 0.25);

        let resp = send(&app, "POST", "/api/users/people/match", Some(&token), query(5, 1.0)).await;
        assert_eq!(resp.body["match"]["matched"], false);
        assert!(resp.body["match"]["personName"].is_null());
    }
}
