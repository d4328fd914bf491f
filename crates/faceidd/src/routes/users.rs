use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use faceid_store::{AuthProvider, NewUser, StoreError, User};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{json_body, required};
use crate::auth::{self, claims_from_jar};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

type Reply = (StatusCode, CookieJar, Json<Value>);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleAuthRequest {
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    google_id: Option<String>,
    profile_picture: Option<String>,
}

fn user_json(user: &User) -> Value {
    json!({
        "id": user.id,
        "firstName": user.first_name,
        "lastName": user.last_name,
        "email": user.email,
    })
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> ApiResult<Reply> {
    let req = json_body(payload)?;
    const MISSING: &str = "All fields are required";
    let first_name = required(req.first_name, MISSING)?;
    let last_name = required(req.last_name, MISSING)?;
    let email = required(req.email, MISSING)?;
    let password = req
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request(MISSING))?;

    if state.store.user_by_email(&email).await?.is_some() {
        return Err(ApiError::bad_request("User already exists"));
    }

    let password_hash = auth::hash_password(password).await?;
    let user = state
        .store
        .create_user(NewUser {
            email,
            first_name,
            last_name,
            password_hash: Some(password_hash),
            google_id: None,
            profile_picture: None,
            auth_provider: AuthProvider::Local,
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => ApiError::bad_request("User already exists"),
            other => other.into(),
        })?;

    let token = state.sessions.issue(&user)?;
    let jar = jar
        .add(state.sessions.session_cookie(token))
        .add(state.sessions.just_signed_up_cookie());

    Ok((
        StatusCode::CREATED,
        jar,
        Json(json!({
            "success": true,
            "message": "User created successfully",
            "user": user_json(&user),
        })),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Reply> {
    let req = json_body(payload)?;
    const MISSING: &str = "Email and password are required";
    let email = required(req.email, MISSING)?;
    let password = req
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request(MISSING))?;

    let user = state
        .store
        .user_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::bad_request("User does not exist"))?;

    let hash = match (&user.auth_provider, &user.password_hash) {
        (AuthProvider::Local, Some(hash)) => hash.clone(),
        _ => {
            return Err(ApiError::bad_request(
                "Please use Google Sign-In for this account",
            ))
        }
    };

    if !auth::verify_password(password, hash).await? {
        tracing::debug!(user_id = %user.id, "password mismatch");
        return Err(ApiError::bad_request("Invalid password"));
    }

    let token = state.sessions.issue(&user)?;
    tracing::info!(user_id = %user.id, "user logged in");
    Ok((
        StatusCode::OK,
        jar.add(state.sessions.session_cookie(token)),
        Json(json!({ "message": "Login successful", "success": true })),
    ))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<Value>) {
    (
        state.sessions.clear(jar),
        Json(json!({ "message": "Logout successful", "success": true })),
    )
}

/// Sign in (or up) with an identity already verified by Google on the client.
pub async fn google_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: Result<Json<GoogleAuthRequest>, JsonRejection>,
) -> ApiResult<Reply> {
    if !state.google_auth_enabled {
        return Err(ApiError::NotFound("Not found".into()));
    }
    let req = json_body(payload)?;
    let email = required(req.email, "Email and Google ID are required")?;
    let google_id = required(req.google_id, "Email and Google ID are required")?;
    let picture = req.profile_picture.filter(|p| !p.trim().is_empty());

    let (user, status) = match state.store.user_by_email(&email).await? {
        Some(existing) => {
            let linked = existing.google_id.clone();
            let user = match linked.as_deref() {
                Some(linked) if linked == google_id => existing,
                Some(_) => {
                    tracing::warn!(user_id = %existing.id, "google id mismatch");
                    return Err(ApiError::Unauthorized);
                }
                None => {
                    state
                        .store
                        .link_google(&existing.id, &google_id, picture)
                        .await?;
                    tracing::info!(user_id = %existing.id, "linked google account");
                    state
                        .store
                        .user_by_id(&existing.id)
                        .await?
                        .ok_or_else(|| ApiError::Internal("linked user vanished".into()))?
                }
            };
            (user, StatusCode::OK)
        }
        None => {
            let user = state
                .store
                .create_user(NewUser {
                    email,
                    first_name: req.first_name.unwrap_or_default(),
                    last_name: req.last_name.unwrap_or_default(),
                    password_hash: None,
                    google_id: Some(google_id),
                    profile_picture: picture,
                    auth_provider: AuthProvider::Google,
                })
                .await?;
            (user, StatusCode::CREATED)
        }
    };

    let token = state.sessions.issue(&user)?;
    let mut jar = jar.add(state.sessions.session_cookie(token));
    let message = if status == StatusCode::CREATED {
        jar = jar.add(state.sessions.just_signed_up_cookie());
        "User created successfully with Google"
    } else {
        "Login successful"
    };

    let mut body = user_json(&user);
    body["profilePicture"] = json!(user.profile_picture);
    Ok((
        status,
        jar,
        Json(json!({ "message": message, "success": true, "user": body })),
    ))
}

pub async fn me(State(state): State<Arc<AppState>>, jar: CookieJar) -> ApiResult<Json<Value>> {
    let claims = claims_from_jar(&jar, &state.sessions).ok_or(ApiError::NotAuthenticated)?;
    let user = state
        .store
        .user_by_id(&claims.id)
        .await?
        .ok_or(ApiError::NotAuthenticated)?;
    Ok(Json(json!({
        "message": "User authenticated",
        "authenticated": true,
        "user": user_json(&user),
    })))
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::{send, signup, test_app, test_app_with, test_config};
    use axum::http::StatusCode;
    use serde_json::json;

    fn login_body(email: &str, password: &str) -> Option<serde_json::Value> {
        Some(json!({ "email": email, "password": password }))
    }

    #[tokio::test]
    async fn test_signup_sets_cookies() {
        let app = test_app().await;
        let resp = send(
            &app,
            "POST",
            "/api/users/signup",
            None,
            Some(json!({
                "firstName": "Ada",
                "lastName": "Lovelace",
                "email": "Ada@Example.com",
                "password": "pw",
            })),
        )
        .await;
        assert_eq!(resp.status, StatusCode::CREATED);
        assert_eq!(resp.body["success"], true);
        assert_eq!(resp.body["user"]["email"], "ada@example.com");
        assert!(resp.token().is_some());
        assert!(resp
            .set_cookies
            .iter()
            .any(|c| c.starts_with("justSignedUp=true") && c.contains("HttpOnly")));
    }

    #[tokio::test]
    async fn test_signup_duplicate_and_missing_fields() {
        let app = test_app().await;
        signup(&app, "ada@example.com").await;

        let resp = send(
            &app,
            "POST",
            "/api/users/signup",
            None,
            Some(json!({
                "firstName": "A",
                "lastName": "L",
                "email": "ADA@example.com",
                "password": "pw",
            })),
        )
        .await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.body["error"], "User already exists");
        assert_eq!(resp.body["success"], false);

        let resp = send(
            &app,
            "POST",
            "/api/users/signup",
            None,
            Some(json!({ "firstName": "A", "lastName": "", "email": "b@x.io", "password": "pw" })),
        )
        .await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let app = test_app().await;
        let resp = send(&app, "POST", "/api/users/login", None, Some(json!([1, 2]))).await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.body["success"], false);
    }

    #[tokio::test]
    async fn test_login_flow() {
        let app = test_app().await;
        signup(&app, "ada@example.com").await;

        let resp = send(
            &app,
            "POST",
            "/api/users/login",
            None,
            login_body("nobody@example.com", "x"),
        )
        .await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.body["error"], "User does not exist");

        let resp = send(
            &app,
            "POST",
            "/api/users/login",
            None,
            login_body("ada@example.com", "wrong"),
        )
        .await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.body["error"], "Invalid password");

        let resp = send(
            &app,
            "POST",
            "/api/users/login",
            None,
            login_body("ada@example.com", "correct horse"),
        )
        .await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body["message"], "Login successful");
        assert!(resp.token().is_some());
    }

    #[tokio::test]
    async fn test_me_requires_valid_token() {
        let app = test_app().await;
        let resp = send(&app, "GET", "/api/users/me", None, None).await;
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
        assert_eq!(resp.body["error"], "Not authenticated");

        let resp = send(&app, "GET", "/api/users/me", Some("forged"), None).await;
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

        let token = signup(&app, "ada@example.com").await;
        let resp = send(&app, "GET", "/api/users/me", Some(&token), None).await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body["authenticated"], true);
        assert_eq!(resp.body["user"]["firstName"], "Ada");
    }

    #[tokio::test]
    async fn test_logout_clears_cookies() {
        let app = test_app().await;
        let resp = send(&app, "GET", "/api/users/logout", None, None).await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body["message"], "Logout successful");
        assert_cleared(&resp.set_cookies);

        let token = signup(&app, "ada@example.com").await;
        let resp = send(&app, "GET", "/api/users/logout", Some(&token), None).await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_cleared(&resp.set_cookies);
    }

    fn assert_cleared(set_cookies: &[String]) {
        for name in ["token=", "justSignedUp="] {
            let cookie = set_cookies
                .iter()
                .find(|c| c.starts_with(name))
                .unwrap_or_else(|| panic!("no {name} cookie in {set_cookies:?}"));
            assert!(cookie.starts_with(&format!("{name};")), "{cookie}");
            assert!(cookie.contains("Max-Age=0"), "{cookie}");
            assert!(cookie.contains("Path=/"), "{cookie}");
        }
    }

    #[tokio::test]
    async fn test_google_auth_requires_email_and_google_id() {
        let app = test_app().await;
        let bodies = [
            json!({ "googleId": "g-1", "firstName": "Grace" }),
            json!({ "email": "grace@example.com", "firstName": "Grace" }),
            json!({ "email": "  ", "googleId": "g-1" }),
        ];
        for body in bodies {
            let resp = send(&app, "POST", "/api/users/google-auth", None, Some(body)).await;
            assert_eq!(resp.status, StatusCode::BAD_REQUEST);
            assert_eq!(resp.body["success"], false);
            assert_eq!(resp.body["error"], "Email and Google ID are required");
            assert!(resp.token().is_none());
        }
    }

    #[tokio::test]
    async fn test_google_auth_create_then_login() {
        let app = test_app().await;
        let body = json!({
            "email": "grace@example.com",
            "firstName": "Grace",
            "lastName": "Hopper",
            "googleId": "g-1",
            "profilePicture": "https://example.com/g.png",
        });

        let resp = send(&app, "POST", "/api/users/google-auth", None, Some(body.clone())).await;
        assert_eq!(resp.status, StatusCode::CREATED);
        assert_eq!(resp.body["user"]["profilePicture"], "https://example.com/g.png");
        assert!(resp.set_cookies.iter().any(|c| c.starts_with("justSignedUp=")));

        let resp = send(&app, "POST", "/api/users/google-auth", None, Some(body)).await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body["message"], "Login successful");
        assert!(!resp.set_cookies.iter().any(|c| c.starts_with("justSignedUp=")));

        let resp = send(
            &app,
            "POST",
            "/api/users/login",
            None,
            login_body("grace@example.com", "anything"),
        )
        .await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.body["error"], "Please use Google Sign-In for this account");
    }

    #[tokio::test]
    async fn test_google_auth_links_local_account() {
        let app = test_app().await;
        signup(&app, "ada@example.com").await;

        let link = |gid: &str| {
            Some(json!({ "email": "ada@example.com", "googleId": gid, "firstName": "Ada" }))
        };
        let resp = send(&app, "POST", "/api/users/google-auth", None, link("g-ada")).await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body["user"]["firstName"], "Ada");

        let resp = send(&app, "POST", "/api/users/google-auth", None, link("g-other")).await;
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_google_auth_disabled() {
        let mut config = test_config();
        config.google_auth_enabled = false;
        let app = test_app_with(config).await;
        let resp = send(
            &app,
            "POST",
            "/api/users/google-auth",
            None,
            Some(json!({ "email": "a@b.c", "googleId": "g" })),
        )
        .await;
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
    }
}
