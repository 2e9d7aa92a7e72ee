use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::api::{http::HttpClient, types::ApiResult};

#[derive(Debug, Clone, Deserialize)]
pub struct QueueSummary {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries_delay: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribers: Option<Vec<QueueSubscriber>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerts: Option<Vec<Alert>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_messages: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_queue: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSubscriber {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: String,
    pub direction: String,
    pub trigger: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
}

/// A queue message: `body` plus the optional processing `timeout` and
/// enqueue `delay`, both in seconds. Reserved messages come back with their
/// server-assigned id filled in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

impl Message {
    pub fn new(body: &str) -> Self {
        Self {
            body: body.to_string(),
            ..Self::default()
        }
    }
}

/// Delivery state of one push subscriber for one message.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriberStatus {
    #[serde(default)]
    pub retried: u32,
    #[serde(default)]
    pub status_code: u16,
    pub status: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Serialize)]
struct MessageList<'a> {
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct PushedIds {
    ids: Vec<String>,
}

#[derive(Deserialize)]
struct Messages {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct SubscriberStatuses {
    #[serde(default)]
    subscribers: Vec<SubscriberStatus>,
}

#[derive(Serialize)]
struct SubscriberList {
    subscribers: Vec<QueueSubscriber>,
}

#[derive(Serialize)]
struct AlertList<'a> {
    alerts: &'a [Alert],
}

#[derive(Serialize)]
struct AlertIds {
    alerts: Vec<AlertId>,
}

#[derive(Serialize)]
struct AlertId {
    id: String,
}

#[derive(Serialize)]
struct ReleaseRequest {
    delay: u64,
}

/// Message queue endpoints, all rooted at `queues/...`.
#[derive(Clone)]
pub struct QueueApi {
    client: Arc<HttpClient>,
}

impl QueueApi {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub async fn list(&self, page: u32, per_page: u32) -> ApiResult<Vec<QueueSummary>> {
        self.client
            .get_with_query(
                &["queues"],
                &[
                    ("page", page.to_string()),
                    ("per_page", per_page.to_string()),
                ],
            )
            .await
    }

    pub async fn info(&self, queue: &str) -> ApiResult<QueueInfo> {
        self.client.get(&["queues", queue]).await
    }

    pub async fn update(&self, queue: &str, info: &QueueInfo) -> ApiResult<QueueInfo> {
        self.client.post(&["queues", queue], info).await
    }

    pub async fn delete(&self, queue: &str) -> ApiResult<()> {
        self.client.delete_status(&["queues", queue]).await
    }

    pub async fn push_messages(&self, queue: &str, messages: &[Message]) -> ApiResult<Vec<String>> {
        let out: PushedIds = self
            .client
            .post(&["queues", queue, "messages"], &MessageList { messages })
            .await?;
        Ok(out.ids)
    }

    pub async fn push_strings(&self, queue: &str, bodies: &[&str]) -> ApiResult<Vec<String>> {
        let messages: Vec<Message> = bodies.iter().map(|body| Message::new(body)).collect();
        self.push_messages(queue, &messages).await
    }

    /// Reserves up to `n` messages. Reserved messages stay invisible until
    /// `timeout` seconds pass or they are deleted; `wait` long-polls the
    /// queue for up to that many seconds when it is empty.
    pub async fn reserve(
        &self,
        queue: &str,
        n: u32,
        timeout: Option<u64>,
        wait: Option<u64>,
    ) -> ApiResult<Vec<Message>> {
        let out: Messages = self
            .client
            .get_with_query(
                &["queues", queue, "messages"],
                &[
                    ("n", n.to_string()),
                    ("timeout", timeout.unwrap_or(0).to_string()),
                    ("wait", wait.unwrap_or(0).to_string()),
                ],
            )
            .await?;
        Ok(out.messages)
    }

    /// Like [`QueueApi::reserve`] without reserving: messages stay visible.
    pub async fn peek(&self, queue: &str, n: u32, timeout: Option<u64>) -> ApiResult<Vec<Message>> {
        let out: Messages = self
            .client
            .get_with_query(
                &["queues", queue, "messages", "peek"],
                &[
                    ("n", n.to_string()),
                    ("timeout", timeout.unwrap_or(0).to_string()),
                ],
            )
            .await?;
        Ok(out.messages)
    }

    /// Deletes every message in the queue.
    pub async fn clear(&self, queue: &str) -> ApiResult<()> {
        self.client
            .post_status::<()>(&["queues", queue, "clear"], None)
            .await
    }

    pub async fn delete_message(&self, queue: &str, message_id: &str) -> ApiResult<()> {
        self.client
            .delete_status(&["queues", queue, "messages", message_id])
            .await
    }

    /// Resets the reservation timeout so the message stays reserved.
    pub async fn touch_message(&self, queue: &str, message_id: &str) -> ApiResult<()> {
        self.client
            .post_status::<()>(&["queues", queue, "messages", message_id, "touch"], None)
            .await
    }

    /// Puts a reserved message back; it becomes visible after `delay`
    /// seconds.
    pub async fn release_message(
        &self,
        queue: &str,
        message_id: &str,
        delay: u64,
    ) -> ApiResult<()> {
        self.client
            .post_status(
                &["queues", queue, "messages", message_id, "release"],
                Some(&ReleaseRequest { delay }),
            )
            .await
    }

    pub async fn message_subscribers(
        &self,
        queue: &str,
        message_id: &str,
    ) -> ApiResult<Vec<SubscriberStatus>> {
        let out: SubscriberStatuses = self
            .client
            .get(&["queues", queue, "messages", message_id, "subscribers"])
            .await?;
        Ok(out.subscribers)
    }

    pub async fn add_subscribers(&self, queue: &str, subscribers: &[&str]) -> ApiResult<()> {
        self.client
            .post_status(
                &["queues", queue, "subscribers"],
                Some(&subscriber_list(subscribers)),
            )
            .await
    }

    pub async fn remove_subscribers(&self, queue: &str, subscribers: &[&str]) -> ApiResult<()> {
        self.client
            .delete_with_body(
                &["queues", queue, "subscribers"],
                &subscriber_list(subscribers),
            )
            .await
    }

    pub async fn add_alerts(&self, queue: &str, alerts: &[Alert]) -> ApiResult<()> {
        self.client
            .post_status(&["queues", queue, "alerts"], Some(&AlertList { alerts }))
            .await
    }

    pub async fn update_alerts(&self, queue: &str, alerts: &[Alert]) -> ApiResult<()> {
        self.client
            .put_status(&["queues", queue, "alerts"], Some(&AlertList { alerts }))
            .await
    }

    pub async fn remove_alerts(&self, queue: &str, alert_ids: &[&str]) -> ApiResult<()> {
        let alerts = AlertIds {
            alerts: alert_ids
                .iter()
                .map(|id| AlertId { id: id.to_string() })
                .collect(),
        };
        self.client
            .delete_with_body(&["queues", queue, "alerts"], &alerts)
            .await
    }

    pub async fn remove_all_alerts(&self, queue: &str) -> ApiResult<()> {
        self.client.delete_status(&["queues", queue, "alerts"]).await
    }

    pub async fn remove_alert(&self, queue: &str, alert_id: &str) -> ApiResult<()> {
        self.client
            .delete_status(&["queues", queue, "alerts", alert_id])
            .await
    }
}

fn subscriber_list(subscribers: &[&str]) -> SubscriberList {
    SubscriberList {
        subscribers: subscribers
            .iter()
            .map(|url| QueueSubscriber {
                url: url.to_string(),
                headers: None,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::http::testing::*;
    use serde_json::json;

    fn api(transport: std::sync::Arc<ScriptedTransport>) -> QueueApi {
        QueueApi::new(Arc::new(HttpClient::with_transport(settings(), transport)))
    }

    #[tokio::test]
    async fn test_push_wire_shape() {
        let transport = ScriptedTransport::new(vec![Ok(response(
            200,
            r#"{"ids": ["m1", "m2"], "msg": "Messages put on queue."}"#,
        ))]);
        let api = api(transport.clone());

        let ids = api.push_strings("jobs", &["one", "two"]).await.unwrap();
        assert_eq!(ids, vec!["m1", "m2"]);

        let request = &transport.requests()[0];
        assert_eq!(request.url.path(), "/1/projects/p123/queues/jobs/messages");
        let sent: serde_json::Value =
            serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
        assert_eq!(
            sent,
            json!({"messages": [{"body": "one"}, {"body": "two"}]})
        );
    }

    #[tokio::test]
    async fn test_reserve_sends_n_timeout_and_wait() {
        let transport = ScriptedTransport::new(vec![Ok(response(
            200,
            r#"{"messages": [{"id": "m1", "body": "hello"}]}"#,
        ))]);
        let api = api(transport.clone());

        let messages = api.reserve("jobs", 3, Some(120), None).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id.as_deref(), Some("m1"));
        assert_eq!(messages[0].body, "hello");

        let request = &transport.requests()[0];
        assert_eq!(request.url.query(), Some("n=3&timeout=120&wait=0"));
    }

    #[tokio::test]
    async fn test_queue_names_are_escaped() {
        let transport = ScriptedTransport::new(vec![Ok(response(200, r#"{"size": 0}"#))]);
        let api = api(transport.clone());

        api.info("My Queue - Prod").await.unwrap();
        assert_eq!(
            transport.requests()[0].url.path(),
            "/1/projects/p123/queues/My%20Queue%20-%20Prod"
        );
    }

    #[tokio::test]
    async fn test_release_sends_delay_body() {
        let transport = ScriptedTransport::new(vec![Ok(response(200, "{}"))]);
        let api = api(transport.clone());

        api.release_message("jobs", "m1", 30).await.unwrap();
        let sent: serde_json::Value =
            serde_json::from_slice(transport.requests()[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(sent, json!({"delay": 30}));
    }
}
