pub mod cache;
pub mod http;
pub mod queue;
mod types;
pub mod worker;

pub use types::{ApiError, ApiResponse, ApiResult, ErrorKind, ResponseError, TransportError};
