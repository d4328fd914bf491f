//! Sessions: argon2 password hashes and HS256 JWTs carried in a `token` cookie.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use faceid_store::User;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

pub const TOKEN_COOKIE: &str = "token";
pub const JUST_SIGNED_UP_COOKIE: &str = "justSignedUp";

/// Lifetime of the onboarding marker cookie.
const JUST_SIGNED_UP_SECS: i64 = 10 * 60;

/// JWT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signing keys and cookie policy.
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
    secure_cookies: bool,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_days: i64, secure_cookies: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs: ttl_days.max(1) * 24 * 60 * 60,
            secure_cookies,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, ApiError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            id: user.id.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))
    }

    /// Decode and check signature and expiry. `None` for any invalid token.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        match decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256)) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!(error = %e, "rejected session token");
                None
            }
        }
    }

    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        self.cookie(TOKEN_COOKIE, token, self.ttl_secs)
    }

    pub fn just_signed_up_cookie(&self) -> Cookie<'static> {
        self.cookie(JUST_SIGNED_UP_COOKIE, "true".to_string(), JUST_SIGNED_UP_SECS)
    }

    fn cookie(&self, name: &'static str, value: String, max_age_secs: i64) -> Cookie<'static> {
        Cookie::build((name, value))
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(time::Duration::seconds(max_age_secs))
            .build()
    }

    /// Jar with both session cookies expired, whether or not the request carried them.
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        jar.add(self.cookie(TOKEN_COOKIE, String::new(), 0))
            .add(self.cookie(JUST_SIGNED_UP_COOKIE, String::new(), 0))
    }
}

/// Token from the request's `token` cookie, verified.
pub fn claims_from_jar(jar: &CookieJar, keys: &SessionKeys) -> Option<Claims> {
    jar.get(TOKEN_COOKIE).and_then(|c| keys.verify(c.value()))
}

/// Extractor for handlers that require a signed-in user.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        claims_from_jar(&jar, &state.sessions)
            .map(AuthUser)
            .ok_or(ApiError::Unauthorized)
    }
}

/// Hash a password on the blocking pool (argon2 is deliberately slow).
pub async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || -> Result<String, argon2::password_hash::Error> {
        let mut salt_bytes = [0u8; 16];
        OsRng.fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)?;
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
    })
    .await
    .map_err(|e| ApiError::Internal(format!("hash task failed: {e}")))?
    .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

/// Check a password against a stored PHC string on the blocking pool.
pub async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&hash)?;
        Ok::<_, argon2::password_hash::Error>(
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
        )
    })
    .await
    .map_err(|e| ApiError::Internal(format!("verify task failed: {e}")))?
    .map_err(|e| ApiError::Internal(format!("stored password hash is invalid: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use faceid_store::AuthProvider;

    fn user() -> User {
        User {
            id: "u-1".into(),
            email: "ada@example.com".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            password_hash: None,
            google_id: None,
            profile_picture: None,
            auth_provider: AuthProvider::Local,
            created_at: String::new(),
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let keys = SessionKeys::new("secret", 7, false);
        let token = keys.issue(&user()).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.id, "u-1");
        assert_eq!(claims.email, "ada@example.com");
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn test_verify_rejects_other_secret_and_garbage() {
        let token = SessionKeys::new("one", 7, false).issue(&user()).unwrap();
        assert!(SessionKeys::new("two", 7, false).verify(&token).is_none());
        assert!(SessionKeys::new("one", 7, false).verify("not.a.jwt").is_none());
    }

    #[test]
    fn test_verify_rejects_expired() {
        let keys = SessionKeys::new("secret", 7, false);
        let claims = Claims {
            id: "u-1".into(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            iat: 0,
            exp: 1,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).unwrap();
        assert!(keys.verify(&token).is_none());
    }

    #[test]
    fn test_session_cookie_attributes() {
        let keys = SessionKeys::new("secret", 7, true);
        let cookie = keys.session_cookie("abc".into());
        assert_eq!(cookie.name(), "token");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::days(7)));

        let marker = keys.just_signed_up_cookie();
        assert_eq!(marker.value(), "true");
        assert_eq!(marker.max_age(), Some(time::Duration::minutes(10)));
    }

    #[test]
    fn test_clear_expires_cookies_not_sent() {
        let keys = SessionKeys::new("secret", 7, false);
        let jar = keys.clear(CookieJar::new());
        for name in [TOKEN_COOKIE, JUST_SIGNED_UP_COOKIE] {
            let cookie = jar.get(name).unwrap();
            assert_eq!(cookie.value(), "");
            assert_eq!(cookie.path(), Some("/"));
            assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
        }
    }

    #[tokio::test]
    async fn test_password_hash_roundtrip() {
        let hash = hash_password("hunter22".into()).await.unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter22".into(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong".into(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_password_bad_hash() {
        assert!(verify_password("x".into(), "not-a-phc".into()).await.is_err());
    }
}
