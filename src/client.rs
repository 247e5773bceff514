//! HTTP request client with CSRF handling
//!
//! Every API response is an envelope: `{"data": T}` on success and
//! `{"error": {"code", "message"}}` on failure. [`RequestClient`] unwraps the
//! former and turns the latter into [`Error::Api`].
//!
//! Mutating calls (POST, PUT, PATCH, DELETE) carry an `X-CSRF-Token` header.
//! The token is fetched lazily on the first mutating call. When the server
//! answers 403, the token is refetched and the same request is sent exactly
//! once more; a second rejection is returned to the caller.

use crate::config::ApiConfig;
use crate::error::{ApiErrorBody, Error, Result};
use crate::types::MediaSource;
use reqwest::{Method, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_stream::StreamExt;
use tokio_util::io::ReaderStream;
use url::Url;

/// Header carrying the anti-forgery token
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Path of the token endpoint
pub const CSRF_PATH: &str = "/api/auth/csrf-token";

/// Called with the cumulative number of bytes handed to the connection
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

#[derive(serde::Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CsrfToken {
    csrf_token: String,
}

/// Shared API client
///
/// Cheap to clone; clones share the connection pool, the cookie jar and the
/// cached CSRF token.
#[derive(Clone, Debug)]
pub struct RequestClient {
    http: reqwest::Client,
    base_url: Url,
    upload_timeout: Duration,
    csrf_token: Arc<Mutex<Option<String>>>,
}

impl RequestClient {
    /// Build a client for the configured API
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = Url::parse(config.base_url.trim())?;
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            upload_timeout: config.upload_timeout,
            csrf_token: Arc::new(Mutex::new(None)),
        })
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET `path` and return the `data` payload
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        tracing::debug!(%url, "GET");
        let response = self.http.get(url).send().await?;
        decode(response).await
    }

    /// POST a JSON body
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_vec(body)?;
        self.mutating(Method::POST, path, Some(body)).await
    }

    /// PUT a JSON body
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_vec(body)?;
        self.mutating(Method::PUT, path, Some(body)).await
    }

    /// PATCH a JSON body
    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_vec(body)?;
        self.mutating(Method::PATCH, path, Some(body)).await
    }

    /// DELETE without a body
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.mutating(Method::DELETE, path, None).await
    }

    /// Stream a local file to a presigned storage URL
    ///
    /// Storage URLs live outside the API, so no CSRF header is sent and the
    /// response body is not an envelope. `on_progress` sees the running byte
    /// count as chunks are read off disk into the request body.
    pub async fn put_presigned(
        &self,
        presigned_url: &str,
        source: &MediaSource,
        on_progress: ProgressFn,
    ) -> Result<()> {
        let url = Url::parse(presigned_url)?;
        let file = tokio::fs::File::open(&source.path).await?;
        let mut sent = 0u64;
        let chunks = ReaderStream::new(file).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                sent += bytes.len() as u64;
                on_progress(sent);
            }
            chunk
        });
        let body = reqwest::Body::wrap_stream(chunks);

        tracing::debug!(
            file = %source.file_name,
            size = source.size_bytes,
            "uploading to presigned URL"
        );

        let response = self
            .http
            .put(url)
            .header(header::CONTENT_TYPE, &source.content_type)
            .header(header::CONTENT_LENGTH, source.size_bytes)
            .timeout(self.upload_timeout)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                code: "UPLOAD_FAILED".into(),
                message: String::new(),
            });
        }
        Ok(())
    }

    async fn mutating<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<T> {
        let url = self.url(path)?;
        let token = self.csrf_token(false).await?;
        let response = self
            .send_mutating(method.clone(), url.clone(), &token, body.clone())
            .await?;

        if response.status() != StatusCode::FORBIDDEN {
            return decode(response).await;
        }

        tracing::debug!(%url, "request rejected with 403, refreshing CSRF token");
        let token = self.csrf_token(true).await?;
        let response = self.send_mutating(method, url, &token, body).await?;
        decode(response).await
    }

    async fn send_mutating(
        &self,
        method: Method,
        url: Url,
        token: &str,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response> {
        tracing::debug!(%method, %url, "sending request");
        let mut request = self.http.request(method, url).header(CSRF_HEADER, token);
        if let Some(body) = body {
            request = request
                .header(header::CONTENT_TYPE, "application/json")
                .body(body);
        }
        Ok(request.send().await?)
    }

    /// Cached token, fetched when missing or when `refresh` is set
    async fn csrf_token(&self, refresh: bool) -> Result<String> {
        let mut cached = self.csrf_token.lock().await;
        if !refresh && let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let response = self.http.get(self.url(CSRF_PATH)?).send().await?;
        let token: CsrfToken = decode(response).await?;
        *cached = Some(token.csrf_token.clone());
        Ok(token.csrf_token)
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }
}

/// Unwrap a response envelope into its payload or an API error
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if status.is_success() {
        if bytes.is_empty() {
            return Ok(serde_json::from_value(serde_json::Value::Null)?);
        }
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;
        return Ok(envelope.data);
    }

    match serde_json::from_slice::<ApiErrorBody>(&bytes) {
        Ok(body) => Err(Error::api(status.as_u16(), body.error)),
        Err(_) => Err(Error::Api {
            status: status.as_u16(),
            code: "HTTP_ERROR".into(),
            message: status.canonical_reason().unwrap_or_default().to_string(),
        }),
    }
}
