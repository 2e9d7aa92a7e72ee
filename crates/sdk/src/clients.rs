use std::sync::Arc;

use crate::api::{
    cache::{CacheApi, CacheItem, CacheSummary, Item},
    http::HttpClient,
    queue::{Alert, Message, QueueApi, QueueInfo, QueueSummary, SubscriberStatus},
    worker::{CodeInfo, ScheduleInfo, ScheduleRequest, TaskInfo, TaskRequest, WorkerApi},
    ApiError, ApiResult,
};
use crate::config::{ConfigError, Settings, SettingsOverlay, DEFAULT_FAMILY};

/// One handle per product family: resolves settings for the family's three
/// products and hands out per-resource accessors sharing those settings.
pub struct Client {
    queue_api: QueueApi,
    cache_api: CacheApi,
    worker_api: WorkerApi,
}

impl Client {
    /// Resolves settings for the default `ferrum` family.
    pub fn new() -> Result<Self, ConfigError> {
        Self::for_family(DEFAULT_FAMILY)
    }

    pub fn for_family(family: &str) -> Result<Self, ConfigError> {
        let queue_settings = Settings::resolve(&format!("{family}_mq"))?;
        let cache_settings = Settings::resolve(&format!("{family}_cache"))?;
        let worker_settings = Settings::resolve(&format!("{family}_worker"))?;

        Ok(Self {
            queue_api: QueueApi::new(Arc::new(HttpClient::new(queue_settings))),
            cache_api: CacheApi::new(Arc::new(HttpClient::new(cache_settings))),
            worker_api: WorkerApi::new(Arc::new(HttpClient::new(worker_settings))),
        })
    }

    pub fn queue(&self, name: &str) -> Queue {
        Queue {
            api: self.queue_api.clone(),
            name: name.to_string(),
        }
    }

    pub fn cache(&self, name: &str) -> Cache {
        Cache {
            api: self.cache_api.clone(),
            name: name.to_string(),
        }
    }

    pub fn worker(&self) -> &WorkerApi {
        &self.worker_api
    }

    pub async fn queues(&self, page: u32, per_page: u32) -> ApiResult<Vec<QueueSummary>> {
        self.queue_api.list(page, per_page).await
    }

    pub async fn caches(&self, page: u32, per_page: u32) -> ApiResult<Vec<CacheSummary>> {
        self.cache_api.list(page, per_page).await
    }
}

/// A named queue bound to resolved settings.
#[derive(Clone)]
pub struct Queue {
    api: QueueApi,
    name: String,
}

impl Queue {
    pub fn new(name: &str) -> Result<Self, ConfigError> {
        Self::for_family(DEFAULT_FAMILY, name)
    }

    pub fn for_family(family: &str, name: &str) -> Result<Self, ConfigError> {
        Ok(Self::from_settings(
            Settings::resolve(&format!("{family}_mq"))?,
            name,
        ))
    }

    /// Resolves settings as usual, then applies the given overlay last.
    pub fn with_settings(name: &str, overrides: &SettingsOverlay) -> Result<Self, ConfigError> {
        Ok(Self::from_settings(
            Settings::resolve_with(&format!("{DEFAULT_FAMILY}_mq"), overrides)?,
            name,
        ))
    }

    fn from_settings(settings: Settings, name: &str) -> Self {
        Self {
            api: QueueApi::new(Arc::new(HttpClient::new(settings))),
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn info(&self) -> ApiResult<QueueInfo> {
        self.api.info(&self.name).await
    }

    pub async fn update(&self, info: &QueueInfo) -> ApiResult<QueueInfo> {
        self.api.update(&self.name, info).await
    }

    pub async fn delete(&self) -> ApiResult<()> {
        self.api.delete(&self.name).await
    }

    /// Pushes a single message body and returns its id.
    pub async fn push(&self, body: &str) -> ApiResult<String> {
        let ids = self.api.push_strings(&self.name, &[body]).await?;
        ids.into_iter().next().ok_or_else(|| {
            ApiError::UnexpectedResponse("the service returned no message ids".to_string())
        })
    }

    pub async fn push_strings(&self, bodies: &[&str]) -> ApiResult<Vec<String>> {
        self.api.push_strings(&self.name, bodies).await
    }

    pub async fn push_messages(&self, messages: &[Message]) -> ApiResult<Vec<String>> {
        self.api.push_messages(&self.name, messages).await
    }

    /// Reserves one message, if any is available.
    pub async fn reserve(&self) -> ApiResult<Option<Message>> {
        let mut messages = self.api.reserve(&self.name, 1, None, None).await?;
        Ok(if messages.is_empty() {
            None
        } else {
            Some(messages.remove(0))
        })
    }

    pub async fn reserve_n(
        &self,
        n: u32,
        timeout: Option<u64>,
        wait: Option<u64>,
    ) -> ApiResult<Vec<Message>> {
        self.api.reserve(&self.name, n, timeout, wait).await
    }

    pub async fn peek(&self, n: u32) -> ApiResult<Vec<Message>> {
        self.api.peek(&self.name, n, None).await
    }

    pub async fn clear(&self) -> ApiResult<()> {
        self.api.clear(&self.name).await
    }

    pub async fn delete_message(&self, message_id: &str) -> ApiResult<()> {
        self.api.delete_message(&self.name, message_id).await
    }

    pub async fn touch_message(&self, message_id: &str) -> ApiResult<()> {
        self.api.touch_message(&self.name, message_id).await
    }

    pub async fn release_message(&self, message_id: &str, delay: u64) -> ApiResult<()> {
        self.api.release_message(&self.name, message_id, delay).await
    }

    pub async fn message_subscribers(&self, message_id: &str) -> ApiResult<Vec<SubscriberStatus>> {
        self.api.message_subscribers(&self.name, message_id).await
    }

    pub async fn add_subscribers(&self, subscribers: &[&str]) -> ApiResult<()> {
        self.api.add_subscribers(&self.name, subscribers).await
    }

    pub async fn remove_subscribers(&self, subscribers: &[&str]) -> ApiResult<()> {
        self.api.remove_subscribers(&self.name, subscribers).await
    }

    pub async fn add_alerts(&self, alerts: &[Alert]) -> ApiResult<()> {
        self.api.add_alerts(&self.name, alerts).await
    }

    pub async fn update_alerts(&self, alerts: &[Alert]) -> ApiResult<()> {
        self.api.update_alerts(&self.name, alerts).await
    }

    pub async fn remove_alerts(&self, alert_ids: &[&str]) -> ApiResult<()> {
        self.api.remove_alerts(&self.name, alert_ids).await
    }

    pub async fn remove_all_alerts(&self) -> ApiResult<()> {
        self.api.remove_all_alerts(&self.name).await
    }

    pub async fn remove_alert(&self, alert_id: &str) -> ApiResult<()> {
        self.api.remove_alert(&self.name, alert_id).await
    }
}

/// A named cache bound to resolved settings.
#[derive(Clone)]
pub struct Cache {
    api: CacheApi,
    name: String,
}

impl Cache {
    pub fn new(name: &str) -> Result<Self, ConfigError> {
        Self::for_family(DEFAULT_FAMILY, name)
    }

    pub fn for_family(family: &str, name: &str) -> Result<Self, ConfigError> {
        Ok(Self::from_settings(
            Settings::resolve(&format!("{family}_cache"))?,
            name,
        ))
    }

    pub fn with_settings(name: &str, overrides: &SettingsOverlay) -> Result<Self, ConfigError> {
        Ok(Self::from_settings(
            Settings::resolve_with(&format!("{DEFAULT_FAMILY}_cache"), overrides)?,
            name,
        ))
    }

    fn from_settings(settings: Settings, name: &str) -> Self {
        Self {
            api: CacheApi::new(Arc::new(HttpClient::new(settings))),
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stores a value under `key` with the service's default expiration.
    pub async fn set(&self, key: &str, value: &str) -> ApiResult<()> {
        self.api.put(&self.name, key, &Item::new(value)).await
    }

    pub async fn put(&self, key: &str, item: &Item) -> ApiResult<()> {
        self.api.put(&self.name, key, item).await
    }

    pub async fn get(&self, key: &str) -> ApiResult<CacheItem> {
        self.api.get(&self.name, key).await
    }

    pub async fn increment(&self, key: &str, amount: i64) -> ApiResult<()> {
        self.api.increment(&self.name, key, amount).await
    }

    pub async fn delete(&self, key: &str) -> ApiResult<()> {
        self.api.delete(&self.name, key).await
    }
}

/// A standalone worker handle for callers not going through [`Client`].
#[derive(Clone)]
pub struct Worker {
    api: WorkerApi,
}

impl Worker {
    pub fn new() -> Result<Self, ConfigError> {
        Self::for_family(DEFAULT_FAMILY)
    }

    pub fn for_family(family: &str) -> Result<Self, ConfigError> {
        let settings = Settings::resolve(&format!("{family}_worker"))?;
        Ok(Self {
            api: WorkerApi::new(Arc::new(HttpClient::new(settings))),
        })
    }

    pub fn with_settings(overrides: &SettingsOverlay) -> Result<Self, ConfigError> {
        let settings = Settings::resolve_with(&format!("{DEFAULT_FAMILY}_worker"), overrides)?;
        Ok(Self {
            api: WorkerApi::new(Arc::new(HttpClient::new(settings))),
        })
    }

    pub fn api(&self) -> &WorkerApi {
        &self.api
    }

    pub async fn code_packages(&self, page: u32, per_page: u32) -> ApiResult<Vec<CodeInfo>> {
        self.api.code_packages(page, per_page).await
    }

    pub async fn code_package(&self, code_id: &str) -> ApiResult<CodeInfo> {
        self.api.code_package(code_id).await
    }

    pub async fn delete_code_package(&self, code_id: &str) -> ApiResult<()> {
        self.api.delete_code_package(code_id).await
    }

    pub async fn tasks(&self) -> ApiResult<Vec<TaskInfo>> {
        self.api.tasks().await
    }

    pub async fn queue_task(&self, task: TaskRequest) -> ApiResult<String> {
        let ids = self.api.queue_tasks(&[task]).await?;
        ids.into_iter().next().ok_or_else(|| {
            ApiError::UnexpectedResponse("the service returned no task ids".to_string())
        })
    }

    pub async fn queue_tasks(&self, tasks: &[TaskRequest]) -> ApiResult<Vec<String>> {
        self.api.queue_tasks(tasks).await
    }

    pub async fn task(&self, task_id: &str) -> ApiResult<TaskInfo> {
        self.api.task(task_id).await
    }

    pub async fn task_log(&self, task_id: &str) -> ApiResult<String> {
        self.api.task_log(task_id).await
    }

    pub async fn cancel_task(&self, task_id: &str) -> ApiResult<()> {
        self.api.cancel_task(task_id).await
    }

    pub async fn wait_for_task(&self, task_id: &str) -> ApiResult<TaskInfo> {
        self.api.wait_for_task(task_id).await
    }

    pub async fn schedules(&self) -> ApiResult<Vec<ScheduleInfo>> {
        self.api.schedules().await
    }

    pub async fn create_schedules(&self, schedules: &[ScheduleRequest]) -> ApiResult<Vec<String>> {
        self.api.create_schedules(schedules).await
    }

    pub async fn schedule(&self, schedule_id: &str) -> ApiResult<ScheduleInfo> {
        self.api.schedule(schedule_id).await
    }

    pub async fn cancel_schedule(&self, schedule_id: &str) -> ApiResult<()> {
        self.api.cancel_schedule(schedule_id).await
    }
}
