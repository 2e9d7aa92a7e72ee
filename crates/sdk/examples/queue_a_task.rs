//! Queues a task on the worker service and waits for it to finish.
//!
//! Expects credentials in the environment or a ferrum.json file, e.g.:
//!
//! ```sh
//! FERRUM_PROJECT_ID=your_project_id FERRUM_TOKEN=your_token \
//!     cargo run --example queue_a_task
//! ```

use ferrum::{TaskRequest, Worker};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let worker = Worker::new()?;

    let task = TaskRequest {
        timeout: Some(20),
        ..TaskRequest::new("worker-name", r#"{"key": "value"}"#)
    };
    let task_id = worker.queue_task(task).await?;
    println!("queued task {task_id}");

    let info = worker.wait_for_task(&task_id).await?;
    println!("task finished with status {:?}", info.status);
    println!("{}", worker.task_log(&task_id).await?);

    Ok(())
}
