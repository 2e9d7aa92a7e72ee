use std::{error::Error as StdError, io, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    header::{
        HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, AUTHORIZATION, CONTENT_TYPE, USER_AGENT,
    },
    Method, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use super::types::{ApiError, ApiResponse, ApiResult, ErrorKind, ResponseError, TransportError};
use crate::config::Settings;

/// Upper bound on attempts for one logical call, counting the first try.
pub const MAX_REQUEST_ATTEMPTS: usize = 5;

/// Builds the request URL for a resource path:
/// `{scheme}://{host}:{port}/{api_version}/projects/{project_id}/...`.
///
/// Every path segment is percent-encoded independently, so a `/` inside a
/// segment is data, never a separator. Pure; performs no I/O.
pub fn build_url(
    settings: &Settings,
    segments: &[&str],
    query: &[(&str, String)],
) -> Result<Url, ApiError> {
    let base = format!(
        "{}://{}:{}/{}/projects/{}/",
        settings.scheme, settings.host, settings.port, settings.api_version, settings.project_id
    );

    let mut url = Url::parse(&base).map_err(|err| ApiError::InvalidUrl {
        url: base.clone(),
        message: err.to_string(),
    })?;

    url.path_segments_mut()
        .map_err(|_| ApiError::InvalidUrl {
            url: base,
            message: "not a base URL".to_string(),
        })?
        .pop_if_empty()
        .extend(segments);

    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(key, value)| (*key, value.as_str())));
    }

    Ok(url)
}

/// One fully materialized request attempt. The body is already buffered so
/// the executor can replay identical bytes on every retry.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// The wire seam of the request layer. Production code uses
/// [`ReqwestTransport`]; tests substitute scripted doubles so retry and
/// backoff behavior is observable without sockets or real sleeps.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<ApiResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(classify_reqwest_error)?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if is_connection_closed(&err) {
        TransportError::ConnectionClosed
    } else {
        TransportError::Http(Box::new(err))
    }
}

// hyper surfaces a keep-alive connection that closed cleanly under us as an
// UnexpectedEof somewhere in the source chain.
fn is_connection_closed(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::UnexpectedEof {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

/// Executes authenticated requests against one product endpoint.
///
/// Holds immutable resolved [`Settings`] and a shared transport; safe to
/// clone and call concurrently. Retries within a single call are strictly
/// sequential.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    settings: Settings,
}

impl HttpClient {
    pub fn new(settings: Settings) -> Self {
        Self::with_transport(settings, Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(settings: Settings, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn url(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url, ApiError> {
        build_url(&self.settings, segments, query)
    }

    /// Performs one logical exchange with bounded retries.
    ///
    /// A cleanly closed connection retries immediately; a 503 sleeps
    /// `((attempt + 1) * 10)^2` ms first (100, 400, 900, 1600). Any other
    /// transport error aborts, and any status other than 200 maps to an
    /// [`ApiError`] carrying the full response. When the attempt budget is
    /// spent the last observed outcome is surfaced.
    pub async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<Bytes>,
    ) -> Result<ApiResponse, ApiError> {
        enum Retriable {
            Unavailable(ApiResponse),
            Closed,
        }

        let headers = self.build_headers(body.is_some())?;
        let mut last = Retriable::Closed;

        for attempt in 0..MAX_REQUEST_ATTEMPTS {
            let request = TransportRequest {
                method: method.clone(),
                url: url.clone(),
                headers: headers.clone(),
                body: body.clone(),
            };

            match self.transport.send(request).await {
                Ok(response) if response.status == StatusCode::SERVICE_UNAVAILABLE => {
                    if attempt + 1 < MAX_REQUEST_ATTEMPTS {
                        let delay = backoff_delay(attempt);
                        warn!(
                            "{method} {url} returned 503, retrying in {delay:?} \
                             (attempt {}/{MAX_REQUEST_ATTEMPTS})",
                            attempt + 1,
                        );
                        sleep(delay).await;
                    }
                    last = Retriable::Unavailable(response);
                }
                Ok(response) => return response_as_result(response),
                Err(TransportError::ConnectionClosed) => {
                    warn!(
                        "connection for {method} {url} closed before a response arrived, \
                         retrying (attempt {}/{MAX_REQUEST_ATTEMPTS})",
                        attempt + 1,
                    );
                    last = Retriable::Closed;
                }
                Err(err) => return Err(err.into()),
            }
        }

        match last {
            Retriable::Unavailable(response) => response_as_result(response),
            Retriable::Closed => Err(TransportError::ConnectionClosed.into()),
        }
    }

    /// Serializes `body` to JSON, executes, and decodes the response body
    /// into `Out` only after a confirmed 200.
    pub async fn request<In, Out>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&In>,
    ) -> ApiResult<Out>
    where
        In: Serialize + ?Sized,
        Out: DeserializeOwned,
    {
        let response = self.exchange(method, segments, query, body).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Like [`HttpClient::request`] for endpoints whose response body is
    /// irrelevant; the body is still fully drained.
    pub async fn request_status<In>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&In>,
    ) -> ApiResult<()>
    where
        In: Serialize + ?Sized,
    {
        self.exchange(method, segments, query, body).await?;
        Ok(())
    }

    /// Executes and hands back the raw response body, for the few endpoints
    /// that return plain text instead of JSON.
    pub async fn request_raw(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> ApiResult<Bytes> {
        let response = self.exchange::<()>(method, segments, query, None).await?;
        Ok(response.body)
    }

    async fn exchange<In>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&In>,
    ) -> Result<ApiResponse, ApiError>
    where
        In: Serialize + ?Sized,
    {
        let url = self.url(segments, query)?;
        let body = match body {
            Some(value) => Some(Bytes::from(serde_json::to_vec(value)?)),
            None => None,
        };
        self.execute(method, url, body).await
    }

    pub async fn get<Out>(&self, segments: &[&str]) -> ApiResult<Out>
    where
        Out: DeserializeOwned,
    {
        self.request::<(), Out>(Method::GET, segments, &[], None)
            .await
    }

    pub async fn get_with_query<Out>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> ApiResult<Out>
    where
        Out: DeserializeOwned,
    {
        self.request::<(), Out>(Method::GET, segments, query, None)
            .await
    }

    pub async fn post<In, Out>(&self, segments: &[&str], body: &In) -> ApiResult<Out>
    where
        In: Serialize + ?Sized,
        Out: DeserializeOwned,
    {
        self.request(Method::POST, segments, &[], Some(body)).await
    }

    pub async fn post_status<In>(&self, segments: &[&str], body: Option<&In>) -> ApiResult<()>
    where
        In: Serialize + ?Sized,
    {
        self.request_status(Method::POST, segments, &[], body).await
    }

    pub async fn put_status<In>(&self, segments: &[&str], body: Option<&In>) -> ApiResult<()>
    where
        In: Serialize + ?Sized,
    {
        self.request_status(Method::PUT, segments, &[], body).await
    }

    pub async fn delete<Out>(&self, segments: &[&str]) -> ApiResult<Out>
    where
        Out: DeserializeOwned,
    {
        self.request::<(), Out>(Method::DELETE, segments, &[], None)
            .await
    }

    pub async fn delete_status(&self, segments: &[&str]) -> ApiResult<()> {
        self.request_status::<()>(Method::DELETE, segments, &[], None)
            .await
    }

    pub async fn delete_with_body<In>(&self, segments: &[&str], body: &In) -> ApiResult<()>
    where
        In: Serialize + ?Sized,
    {
        self.request_status(Method::DELETE, segments, &[], Some(body))
            .await
    }

    fn build_headers(&self, has_body: bool) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();

        let token = HeaderValue::from_str(&format!("OAuth {}", self.settings.token))
            .map_err(|_| ApiError::InvalidHeader {
                name: "Authorization",
            })?;
        headers.insert(AUTHORIZATION, token);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip/deflate"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.settings.user_agent)
                .map_err(|_| ApiError::InvalidHeader { name: "User-Agent" })?,
        );
        if has_body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        Ok(headers)
    }
}

fn backoff_delay(attempt: usize) -> Duration {
    let step = ((attempt + 1) * 10) as u64;
    Duration::from_millis(step * step)
}

fn response_as_result(response: ApiResponse) -> Result<ApiResponse, ApiError> {
    if response.status == StatusCode::OK {
        return Ok(response);
    }
    debug!(
        "mapping non-success response: {} ({} byte body)",
        response.status,
        response.body.len()
    );
    Err(ApiError::Response(response_as_error(response)))
}

fn response_as_error(response: ApiResponse) -> ResponseError {
    let (kind, message) = match response.status {
        StatusCode::UNAUTHORIZED => (
            ErrorKind::Unauthorized,
            "invalid authentication: the OAuth token is either not provided or invalid"
                .to_string(),
        ),
        StatusCode::NOT_FOUND => (
            ErrorKind::NotFound,
            "invalid endpoint: the resource, project, or endpoint being requested doesn't exist"
                .to_string(),
        ),
        StatusCode::METHOD_NOT_ALLOWED => (
            ErrorKind::MethodNotAllowed,
            "invalid HTTP method: this endpoint doesn't support that particular verb".to_string(),
        ),
        StatusCode::NOT_ACCEPTABLE => (
            ErrorKind::MissingFields,
            "invalid request: required fields are missing".to_string(),
        ),
        StatusCode::SERVICE_UNAVAILABLE => (
            ErrorKind::ServiceUnavailable,
            "service unavailable".to_string(),
        ),
        _ => match decoded_msg(&response.body) {
            Some(msg) => (ErrorKind::Api, msg),
            None => (ErrorKind::Unknown, "unknown API response".to_string()),
        },
    };

    ResponseError {
        kind,
        message,
        response,
    }
}

fn decoded_msg(body: &Bytes) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value.get("msg").map(|msg| match msg {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    })
}
