//! HTTP client for the faceidd API.

use faceid_core::{Descriptor, MatchResult, Person};
use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message} (HTTP {status})")]
    Api { status: StatusCode, message: String },
    #[error("not logged in; run `faceid login` first")]
    NotLoggedIn,
    #[error("server did not return a session cookie")]
    NoSessionCookie,
}

#[derive(Debug, Deserialize)]
struct PeopleResponse {
    users: Vec<Person>,
}

#[derive(Debug, Deserialize)]
struct MatchResponse {
    #[serde(rename = "match")]
    result: MatchResult,
}

pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base: &str, token: Option<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("faceid-cli/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/users{path}", self.base)
    }

    fn authed(&self, req: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let token = self.token.as_deref().ok_or(ClientError::NotLoggedIn)?;
        Ok(req.header(COOKIE, format!("token={token}")))
    }

    /// Send and decode, turning non-2xx replies into [`ClientError::Api`].
    async fn send(req: RequestBuilder) -> Result<(HeaderMap, Value), ClientError> {
        let resp = req.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = body["error"]
                .as_str()
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed"))
                .to_string();
            return Err(ClientError::Api { status, message });
        }
        Ok((headers, body))
    }

    /// Create an account and return the session token the server issued.
    pub async fn signup(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        password: &str,
    ) -> Result<String, ClientError> {
        let req = self.http.post(self.url("/signup")).json(&json!({
            "firstName": first_name,
            "lastName": last_name,
            "email": email,
            "password": password,
        }));
        let (headers, _) = Self::send(req).await?;
        token_from_headers(&headers).ok_or(ClientError::NoSessionCookie)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<String, ClientError> {
        let req = self
            .http
            .post(self.url("/login"))
            .json(&json!({ "email": email, "password": password }));
        let (headers, _) = Self::send(req).await?;
        token_from_headers(&headers).ok_or(ClientError::NoSessionCookie)
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        Self::send(self.http.get(self.url("/logout"))).await?;
        Ok(())
    }

    /// The signed-in user's `{id, firstName, lastName, email}`.
    pub async fn me(&self) -> Result<Value, ClientError> {
        let (_, body) = Self::send(self.authed(self.http.get(self.url("/me")))?).await?;
        Ok(body["user"].clone())
    }

    pub async fn list_people(&self) -> Result<Vec<Person>, ClientError> {
        let (_, body) = Self::send(self.authed(self.http.get(self.url("/people")))?).await?;
        let parsed: PeopleResponse = serde_json::from_value(body).map_err(|e| ClientError::Api {
            status: StatusCode::OK,
            message: format!("unexpected people response: {e}"),
        })?;
        Ok(parsed.users)
    }

    pub async fn add_person(
        &self,
        name: &str,
        info: &str,
        descriptor: &Descriptor,
    ) -> Result<Value, ClientError> {
        let req = self.http.post(self.url("/people")).json(&json!({
            "name": name,
            "info": info,
            "descriptor": descriptor,
        }));
        let (_, body) = Self::send(self.authed(req)?).await?;
        Ok(body["person"].clone())
    }

    pub async fn remove_person(&self, name: &str) -> Result<(), ClientError> {
        let req = self.http.delete(self.url("/people")).query(&[("name", name)]);
        Self::send(self.authed(req)?).await?;
        Ok(())
    }

    pub async fn match_descriptor(&self, query: &Descriptor) -> Result<MatchResult, ClientError> {
        let req = self
            .http
            .post(self.url("/people/match"))
            .json(&json!({ "descriptor": query }));
        let (_, body) = Self::send(self.authed(req)?).await?;
        let parsed: MatchResponse = serde_json::from_value(body).map_err(|e| ClientError::Api {
            status: StatusCode::OK,
            message: format!("unexpected match response: {e}"),
        })?;
        Ok(parsed.result)
    }
}

/// Value of the `token` cookie in a response's `Set-Cookie` headers.
fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|c| c.split(';').next())
        .filter_map(|pair| pair.trim().strip_prefix("token="))
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_token_from_headers() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("justSignedUp=true; HttpOnly; Path=/"),
        );
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("token=abc.def.ghi; HttpOnly; SameSite=Lax; Path=/"),
        );
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_cleared_token_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("token=; Max-Age=0; Path=/"));
        assert!(token_from_headers(&headers).is_none());
    }

    #[test]
    fn test_url_joins_base() {
        let client = ApiClient::new("http://localhost:3000/", None).unwrap();
        assert_eq!(client.url("/me"), "http://localhost:3000/api/users/me");
    }

    #[test]
    fn test_authed_requires_token() {
        let client = ApiClient::new("http://localhost:3000", None).unwrap();
        let req = client.http.get(client.url("/me"));
        assert!(matches!(client.authed(req), Err(ClientError::NotLoggedIn)));
    }
}
