use std::fmt;

use bytes::Bytes;
use reqwest::{header::HeaderMap, StatusCode};
use thiserror::Error;

use crate::config::ConfigError;

pub type ApiResult<T> = Result<T, ApiError>;

/// A fully buffered HTTP response.
///
/// The body is read to completion before this value exists, so error values
/// can carry the complete exchange and no connection is ever left holding a
/// half-read stream.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Category of a non-success API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 401: the OAuth token is missing or invalid.
    Unauthorized,
    /// 404: the resource, project, or endpoint doesn't exist.
    NotFound,
    /// 405: the endpoint doesn't support this verb.
    MethodNotAllowed,
    /// 406: required fields are missing from the request.
    MissingFields,
    /// 503 after all retries were spent.
    ServiceUnavailable,
    /// Any other status whose body carried a decodable `msg` field.
    Api,
    /// Any other status with an undecodable body.
    Unknown,
}

/// A non-200 response mapped into its category, with the raw response
/// attached for inspection.
#[derive(Debug)]
pub struct ResponseError {
    pub kind: ErrorKind,
    pub message: String,
    pub response: ApiResponse,
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.response.status, self.message)
    }
}

impl std::error::Error for ResponseError {}

#[derive(Error, Debug)]
pub enum TransportError {
    /// The connection closed cleanly before any response arrived. The only
    /// transport failure the executor retries.
    #[error("connection closed before a response arrived")]
    ConnectionClosed,

    #[error("http transport error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error("invalid request URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("header {name} contains invalid characters")]
    InvalidHeader { name: &'static str },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unexpected API response: {0}")]
    UnexpectedResponse(String),
}
