//! Rust client for the ferrum.io hosted services: the message queue,
//! the key-value cache, and the task execution service.
//!
//! Connection settings are resolved per product from built-in presets,
//! `~/.ferrum.json`, `FERRUM_*` environment variables, and a local
//! `ferrum.json`, later sources winning per field. See [`Settings`].

mod api;
mod clients;
mod config;

pub use api::{
    cache::{CacheApi, CacheItem, CacheSummary, Item},
    http::{build_url, HttpClient, ReqwestTransport, Transport, TransportRequest,
        MAX_REQUEST_ATTEMPTS},
    queue::{Alert, Message, QueueApi, QueueInfo, QueueSubscriber, QueueSummary, SubscriberStatus},
    worker::{
        CodeInfo, ScheduleInfo, ScheduleRequest, TaskInfo, TaskRequest, TaskStatus, WorkerApi,
    },
    ApiError, ApiResponse, ApiResult, ErrorKind, ResponseError, TransportError,
};
pub use clients::{Cache, Client, Queue, Worker};
pub use config::{ConfigError, Settings, SettingsOverlay, DEFAULT_FAMILY};
