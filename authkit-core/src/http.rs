//! Default reqwest-backed implementation of [`NetworkClient`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;

use crate::identifier::{ConnectionType, Identifier, IdentifierKind};
use crate::network::{AccountStatus, ApiError, NetworkClient};
use crate::token::{PasswordlessHandle, Token};

/// A simple wrapper on an HTTP client for making requests. Sets sensible
/// defaults such as timeouts, user-agent & ensuring HTTPS, and applies retry
/// middleware for transient failures.
struct Request {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl Request {
    fn new() -> Self {
        let client = reqwest::Client::new();
        let timeout = Duration::from_secs(5);
        let max_retries = 3; // total attempts = 4
        Self {
            client,
            timeout,
            max_retries,
        }
    }

    /// Creates a request builder with defaults applied.
    fn req(&self, method: Method, url: &str) -> RequestBuilder {
        #[cfg(not(test))]
        assert!(url.starts_with("https"));

        self.client.request(method, url).timeout(self.timeout).header(
            "User-Agent",
            format!("authkit-core/{}", env!("CARGO_PKG_VERSION")),
        )
    }

    fn get(&self, url: &str) -> RequestBuilder {
        self.req(Method::GET, url)
    }

    fn post(&self, url: &str) -> RequestBuilder {
        self.req(Method::POST, url)
    }

    /// Sends a request built by `get`/`post`, retrying transient failures
    /// with exponential backoff.
    async fn handle(&self, request_builder: RequestBuilder) -> Result<Response, ApiError> {
        let Some(template) = request_builder.try_clone() else {
            return execute_request_builder(request_builder)
                .await
                .map_err(Into::into);
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries as usize);

        (|| async {
            let request_builder = template.try_clone().ok_or_else(|| {
                RequestHandleError::permanent(
                    None,
                    "request cannot be retried because it is not cloneable".to_string(),
                )
            })?;
            execute_request_builder(request_builder).await
        })
        .retry(backoff)
        .when(RequestHandleError::is_retryable)
        .await
        .map_err(Into::into)
    }
}

#[derive(Debug)]
struct RequestHandleError {
    status: Option<u16>,
    error: String,
    retryable: bool,
}

impl RequestHandleError {
    const fn retryable(status: Option<u16>, error: String) -> Self {
        Self {
            status,
            error,
            retryable: true,
        }
    }

    const fn permanent(status: Option<u16>, error: String) -> Self {
        Self {
            status,
            error,
            retryable: false,
        }
    }

    const fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl From<RequestHandleError> for ApiError {
    fn from(value: RequestHandleError) -> Self {
        match value.status {
            Some(status) => Self::Server {
                status,
                error: value.error,
            },
            None => Self::Network { error: value.error },
        }
    }
}

async fn execute_request_builder(
    request_builder: RequestBuilder,
) -> Result<Response, RequestHandleError> {
    let (client, request) = request_builder.build_split();
    let request = request.map_err(|err| {
        RequestHandleError::permanent(None, format!("request build failed: {err}"))
    })?;

    match client.execute(request).await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if status == 429 || (500..600).contains(&status) {
                return Err(RequestHandleError::retryable(
                    Some(status),
                    format!("request error with bad status code {status}"),
                ));
            }
            Ok(resp)
        }
        Err(err) => {
            if err.is_timeout() || err.is_connect() {
                return Err(RequestHandleError::retryable(
                    None,
                    format!("request timeout/connect error: {err}"),
                ));
            }
            Err(RequestHandleError::permanent(
                None,
                format!("request failed: {err}"),
            ))
        }
    }
}

/// [`NetworkClient`] speaking the passwordless HTTP API.
pub struct HttpNetworkClient {
    request: Request,
    base_url: String,
}

/// Responses from the status endpoint are wrapped in a `data` container.
#[derive(Deserialize)]
struct ApiContainer<T> {
    data: T,
}

/// Token payload as it appears on the wire; expiry is relative.
#[derive(Deserialize)]
struct TokenPayload {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user_id: String,
    expires_in: u64,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

impl TokenPayload {
    fn into_token(self, now: u64) -> Token {
        Token {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            user_id: self.user_id,
            expires_at: now.saturating_add(self.expires_in),
            scope: self.scope,
            token_type: self.token_type,
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status().as_u16();
    if !(200..300).contains(&status) {
        let error = response.text().await.unwrap_or_default();
        return Err(ApiError::Server { status, error });
    }
    response.json::<T>().await.map_err(|err| ApiError::Server {
        status,
        error: format!("malformed response body: {err}"),
    })
}

impl HttpNetworkClient {
    /// Creates a client against `base_url` (scheme and host, no trailing
    /// slash).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            request: Request::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl NetworkClient for HttpNetworkClient {
    async fn check_account_status(
        &self,
        identifier: &Identifier,
    ) -> Result<AccountStatus, ApiError> {
        let (path, param) = match identifier.kind {
            IdentifierKind::Email => ("/api/2/email_status", "email"),
            IdentifierKind::Phone => ("/api/2/phone_status", "phone"),
        };
        let builder = self
            .request
            .get(&self.url(path))
            .query(&[(param, identifier.value.as_str())]);
        let response = self.request.handle(builder).await?;
        let container: ApiContainer<AccountStatus> = parse_json(response).await?;
        Ok(container.data)
    }

    async fn request_code(
        &self,
        client_id: &str,
        identifier: &Identifier,
        connection: ConnectionType,
        locale: &str,
    ) -> Result<PasswordlessHandle, ApiError> {
        let identifier_param = match identifier.kind {
            IdentifierKind::Email => "email",
            IdentifierKind::Phone => "phone_number",
        };
        let builder = self.request.post(&self.url("/passwordless/start")).form(&[
            ("client_id", client_id),
            ("connection", &connection.to_string()),
            ("locale", locale),
            (identifier_param, identifier.value.as_str()),
        ]);
        let response = self.request.handle(builder).await?;
        parse_json(response).await
    }

    async fn resend_code(
        &self,
        client_id: &str,
        handle: &PasswordlessHandle,
    ) -> Result<PasswordlessHandle, ApiError> {
        let builder = self.request.post(&self.url("/passwordless/resend")).form(&[
            ("client_id", client_id),
            ("passwordless_token", handle.value.as_str()),
        ]);
        let response = self.request.handle(builder).await?;
        parse_json(response).await
    }

    async fn verify_code(
        &self,
        client_id: &str,
        identifier: &Identifier,
        code: &str,
        handle: &PasswordlessHandle,
    ) -> Result<Token, ApiError> {
        let builder = self.request.post(&self.url("/oauth/token")).form(&[
            ("client_id", client_id),
            ("grant_type", "passwordless"),
            ("identifier", identifier.value.as_str()),
            ("code", code),
            ("passwordless_token", handle.value.as_str()),
        ]);
        let response = self.request.handle(builder).await?;
        let payload: TokenPayload = parse_json(response).await?;
        Ok(payload.into_token(unix_now()))
    }

    async fn exchange_token(&self, client_id: &str, auth_code: &str) -> Result<Token, ApiError> {
        let builder = self.request.post(&self.url("/oauth/token")).form(&[
            ("client_id", client_id),
            ("grant_type", "authorization_code"),
            ("code", auth_code),
        ]);
        let response = self.request.handle(builder).await?;
        let payload: TokenPayload = parse_json(response).await?;
        Ok(payload.into_token(unix_now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_check_account_status_parses_container() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/2/email_status")
            .match_query(mockito::Matcher::UrlEncoded(
                "email".into(),
                "a@b.com".into(),
            ))
            .with_status(200)
            .with_body(r#"{"data":{"exists":true,"available":false,"verified":true}}"#)
            .create_async()
            .await;

        let client = HttpNetworkClient::new(server.url());
        let status = client
            .check_account_status(&Identifier::email("a@b.com"))
            .await
            .expect("status");
        assert!(status.exists);
        assert!(!status.available);
        assert!(status.verified);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_request_code_returns_handle() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/passwordless/start")
            .with_status(200)
            .with_body(r#"{"passwordless_token":"plt-1"}"#)
            .create_async()
            .await;

        let client = HttpNetworkClient::new(server.url());
        let handle = client
            .request_code("cid", &Identifier::email("a@b.com"), ConnectionType::Email, "en-US")
            .await
            .expect("handle");
        assert_eq!(handle, PasswordlessHandle::new("plt-1"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_verify_code_converts_relative_expiry() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(
                r#"{"access_token":"at","refresh_token":"rt","user_id":"u1","expires_in":600,"token_type":"Bearer"}"#,
            )
            .create_async()
            .await;

        let client = HttpNetworkClient::new(server.url());
        let before = unix_now();
        let token = client
            .verify_code(
                "cid",
                &Identifier::email("a@b.com"),
                "123456",
                &PasswordlessHandle::new("plt-1"),
            )
            .await
            .expect("token");
        assert_eq!(token.user_id, "u1");
        assert!(token.expires_at >= before + 600);
        assert!(token.is_valid(before));
    }

    #[tokio::test]
    async fn test_client_error_status_maps_to_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/passwordless/resend")
            .with_status(400)
            .with_body("bad request")
            .create_async()
            .await;

        let client = HttpNetworkClient::new(server.url());
        let err = client
            .resend_code("cid", &PasswordlessHandle::new("plt-1"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::Server {
                status: 400,
                error: "bad request".into()
            }
        );
    }
}
