use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::api::{http::HttpClient, types::ApiResult};

const TASK_POLL_INTERVAL: Duration = Duration::from_millis(500);

// The service caps paging for code listings.
const MAX_PAGE: u32 = 100;
const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct CodeInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub rev: Option<u32>,
    #[serde(default)]
    pub latest_checksum: Option<String>,
    #[serde(default)]
    pub latest_history_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub latest_change: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Complete,
    Error,
    Cancelled,
    Killed,
    Timeout,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// Whether the task can still make progress.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::Running)
    }
}

/// A task to queue: which code package to run and with what payload.
/// `timeout` and `delay` are in seconds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskRequest {
    pub code_name: String,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

impl TaskRequest {
    pub fn new(code_name: &str, payload: &str) -> Self {
        Self {
            code_name: code_name.to_string(),
            payload: payload.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskInfo {
    pub id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub code_name: Option<String>,
    #[serde(default)]
    pub code_id: Option<String>,
    #[serde(default)]
    pub code_rev: Option<String>,
    #[serde(default)]
    pub code_history_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub run_times: Option<u32>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

/// A recurring task definition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScheduleRequest {
    pub code_name: String,
    pub name: String,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_every: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_times: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleInfo {
    pub id: String,
    #[serde(default)]
    pub code_name: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub run_count: Option<u32>,
    #[serde(default)]
    pub run_times: Option<u32>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct CodeList {
    #[serde(default)]
    codes: Vec<CodeInfo>,
}

#[derive(Serialize)]
struct QueueTasksRequest<'a> {
    tasks: &'a [TaskRequest],
}

#[derive(Deserialize)]
struct TaskList {
    #[serde(default)]
    tasks: Vec<TaskInfo>,
}

#[derive(Deserialize)]
struct QueuedIds {
    #[serde(default)]
    tasks: Vec<CreatedId>,
}

#[derive(Serialize)]
struct CreateSchedulesRequest<'a> {
    schedules: &'a [ScheduleRequest],
}

#[derive(Deserialize)]
struct ScheduleList {
    #[serde(default)]
    schedules: Vec<ScheduleInfo>,
}

#[derive(Deserialize)]
struct ScheduledIds {
    #[serde(default)]
    schedules: Vec<CreatedId>,
}

#[derive(Deserialize)]
struct CreatedId {
    id: String,
}

/// Task execution endpoints: `codes/...`, `tasks/...`, and `schedules/...`.
#[derive(Clone)]
pub struct WorkerApi {
    client: Arc<HttpClient>,
}

impl WorkerApi {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub async fn code_packages(&self, page: u32, per_page: u32) -> ApiResult<Vec<CodeInfo>> {
        let out: CodeList = self
            .client
            .get_with_query(
                &["codes"],
                &[
                    ("page", page.clamp(0, MAX_PAGE).to_string()),
                    ("per_page", per_page.clamp(1, MAX_PER_PAGE).to_string()),
                ],
            )
            .await?;
        Ok(out.codes)
    }

    pub async fn code_package(&self, code_id: &str) -> ApiResult<CodeInfo> {
        self.client.get(&["codes", code_id]).await
    }

    pub async fn delete_code_package(&self, code_id: &str) -> ApiResult<()> {
        self.client.delete_status(&["codes", code_id]).await
    }

    pub async fn tasks(&self) -> ApiResult<Vec<TaskInfo>> {
        let out: TaskList = self.client.get(&["tasks"]).await?;
        Ok(out.tasks)
    }

    /// Queues tasks for execution and returns their ids in order.
    pub async fn queue_tasks(&self, tasks: &[TaskRequest]) -> ApiResult<Vec<String>> {
        let out: QueuedIds = self
            .client
            .post(&["tasks"], &QueueTasksRequest { tasks })
            .await?;
        Ok(out.tasks.into_iter().map(|task| task.id).collect())
    }

    pub async fn task(&self, task_id: &str) -> ApiResult<TaskInfo> {
        self.client.get(&["tasks", task_id]).await
    }

    /// Fetches a task's log. The endpoint returns plain text, not JSON.
    pub async fn task_log(&self, task_id: &str) -> ApiResult<String> {
        let body = self
            .client
            .request_raw(Method::GET, &["tasks", task_id, "log"], &[])
            .await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    pub async fn cancel_task(&self, task_id: &str) -> ApiResult<()> {
        self.client
            .post_status::<()>(&["tasks", task_id, "cancel"], None)
            .await
    }

    /// Polls until the task leaves `queued`/`running` and returns its final
    /// info. Callers wanting a bound on the wait wrap this in a timeout.
    pub async fn wait_for_task(&self, task_id: &str) -> ApiResult<TaskInfo> {
        loop {
            let info = self.task(task_id).await?;
            if !info.status.is_active() {
                return Ok(info);
            }
            sleep(TASK_POLL_INTERVAL).await;
        }
    }

    pub async fn schedules(&self) -> ApiResult<Vec<ScheduleInfo>> {
        let out: ScheduleList = self.client.get(&["schedules"]).await?;
        Ok(out.schedules)
    }

    pub async fn create_schedules(&self, schedules: &[ScheduleRequest]) -> ApiResult<Vec<String>> {
        let out: ScheduledIds = self
            .client
            .post(&["schedules"], &CreateSchedulesRequest { schedules })
            .await?;
        Ok(out.schedules.into_iter().map(|entry| entry.id).collect())
    }

    pub async fn schedule(&self, schedule_id: &str) -> ApiResult<ScheduleInfo> {
        self.client.get(&["schedules", schedule_id]).await
    }

    pub async fn cancel_schedule(&self, schedule_id: &str) -> ApiResult<()> {
        self.client
            .post_status::<()>(&["schedules", schedule_id, "cancel"], None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::http::testing::*;
    use serde_json::json;

    fn api(transport: std::sync::Arc<ScriptedTransport>) -> WorkerApi {
        WorkerApi::new(Arc::new(HttpClient::with_transport(settings(), transport)))
    }

    #[tokio::test]
    async fn test_queue_tasks_wire_shape() {
        let transport = ScriptedTransport::new(vec![Ok(response(
            200,
            r#"{"tasks": [{"id": "t1"}], "msg": "Queued up"}"#,
        ))]);
        let api = api(transport.clone());

        let task = TaskRequest {
            priority: Some(0),
            delay: Some(10),
            ..TaskRequest::new("resize-images", r#"{"width": 100}"#)
        };
        let ids = api.queue_tasks(&[task]).await.unwrap();
        assert_eq!(ids, vec!["t1"]);

        let sent: serde_json::Value =
            serde_json::from_slice(transport.requests()[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(
            sent,
            json!({"tasks": [{
                "code_name": "resize-images",
                "payload": "{\"width\": 100}",
                "priority": 0,
                "delay": 10
            }]})
        );
    }

    #[tokio::test]
    async fn test_task_log_returns_raw_body() {
        let transport =
            ScriptedTransport::new(vec![Ok(response(200, "line one\nline two\n"))]);
        let api = api(transport.clone());

        let log = api.task_log("t1").await.unwrap();
        assert_eq!(log, "line one\nline two\n");
        assert_eq!(
            transport.requests()[0].url.path(),
            "/1/projects/p123/tasks/t1/log"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_task_polls_until_terminal() {
        let transport = ScriptedTransport::new(vec![
            Ok(response(200, r#"{"id": "t1", "status": "queued"}"#)),
            Ok(response(200, r#"{"id": "t1", "status": "running"}"#)),
            Ok(response(200, r#"{"id": "t1", "status": "complete"}"#)),
        ]);
        let api = api(transport.clone());

        let info = api.wait_for_task("t1").await.unwrap();
        assert_eq!(info.status, TaskStatus::Complete);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_unrecognized_status_is_tolerated() {
        let transport = ScriptedTransport::new(vec![Ok(response(
            200,
            r#"{"id": "t1", "status": "paused"}"#,
        ))]);
        let api = api(transport);

        let info = api.task("t1").await.unwrap();
        assert_eq!(info.status, TaskStatus::Unknown);
        assert!(!info.status.is_active());
    }

    #[tokio::test]
    async fn test_code_paging_is_clamped() {
        let transport = ScriptedTransport::new(vec![Ok(response(200, r#"{"codes": []}"#))]);
        let api = api(transport.clone());

        api.code_packages(500, 0).await.unwrap();
        assert_eq!(
            transport.requests()[0].url.query(),
            Some("page=100&per_page=1")
        );
    }
}
