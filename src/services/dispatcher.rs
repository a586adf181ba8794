//! Task dispatcher: turns queued upload notifications into conversion tasks.
//!
//! Every message is deleted after its dispatch attempt, whatever the outcome.
//! Redelivered messages launch duplicate tasks; converted keys are
//! deterministic so a duplicate only rewrites the same output.

use serde::Serialize;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    models::{
        conversion::ConversionRequest,
        event::{QueueDelivery, upload_from_message_body},
        response::HandlerResponse,
    },
    services::clients::{
        ContainerOverride, MessageQueue, NetworkConfig, RunTaskRequest, TaskLauncher,
    },
};

/// Container in the task definition that receives the overrides.
pub const CONTAINER_NAME: &str = "file-converter";

/// Messages pulled per poll.
const POLL_BATCH_SIZE: usize = 10;

/// Fixed launch parameters for conversion tasks.
#[derive(Clone, Debug)]
pub struct DispatchSettings {
    pub cluster: String,
    pub task_definition: String,
    pub subnet_id: String,
    pub security_group_id: String,
    pub queue_url: String,
    pub container_name: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Launched { task_arn: String, input_file: String },
    Skipped { reason: String },
    Failed { error: String },
}

/// What happened to one queue message.
#[derive(Serialize, Debug, Clone)]
pub struct MessageReport {
    pub message_id: String,
    #[serde(flatten)]
    pub outcome: DispatchOutcome,
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_error: Option<String>,
}

/// Build the launch request for one conversion.
pub fn run_task_request(settings: &DispatchSettings, request: &ConversionRequest) -> RunTaskRequest {
    RunTaskRequest {
        cluster: settings.cluster.clone(),
        task_definition: settings.task_definition.clone(),
        network: NetworkConfig {
            subnets: vec![settings.subnet_id.clone()],
            security_groups: vec![settings.security_group_id.clone()],
            assign_public_ip: true,
        },
        container: ContainerOverride {
            name: settings.container_name.clone(),
            environment: request.environment(),
        },
    }
}

/// Dispatch each message, then delete it from the queue.
pub async fn dispatch_batch(
    launcher: &dyn TaskLauncher,
    queue: &dyn MessageQueue,
    settings: &DispatchSettings,
    messages: &[QueueDelivery],
) -> Vec<MessageReport> {
    let mut reports = Vec::with_capacity(messages.len());

    for message in messages {
        let outcome = dispatch_one(launcher, settings, message).await;

        let delete_error = match message.receipt_handle.as_deref() {
            None => {
                error!(message_id = %message.message_id, "cannot delete message without a receipt handle");
                Some("message has no receipt handle".to_string())
            }
            Some(handle) => match queue.delete_message(&settings.queue_url, handle).await {
                Ok(()) => {
                    debug!(message_id = %message.message_id, "deleted message from queue");
                    None
                }
                Err(err) => {
                    error!(message_id = %message.message_id, "failed to delete message: {}", err);
                    Some(err.to_string())
                }
            },
        };

        reports.push(MessageReport {
            message_id: message.message_id.clone(),
            outcome,
            deleted: delete_error.is_none(),
            delete_error,
        });
    }

    reports
}

async fn dispatch_one(
    launcher: &dyn TaskLauncher,
    settings: &DispatchSettings,
    message: &QueueDelivery,
) -> DispatchOutcome {
    let Some(body) = message.body.as_deref() else {
        warn!(message_id = %message.message_id, "skipping message without a body");
        return DispatchOutcome::Skipped {
            reason: "message has no body".to_string(),
        };
    };

    let upload = match upload_from_message_body(body) {
        Ok(upload) => upload,
        Err(err) if err.is_shape_mismatch() => {
            warn!(message_id = %message.message_id, "skipping message: {}", err);
            return DispatchOutcome::Skipped {
                reason: err.to_string(),
            };
        }
        Err(err) => {
            error!(message_id = %message.message_id, "error processing message: {}", err);
            return DispatchOutcome::Failed {
                error: err.to_string(),
            };
        }
    };

    let request = ConversionRequest::for_upload(&upload);
    match launcher.run_task(&run_task_request(settings, &request)).await {
        Ok(handle) => {
            info!(task_arn = %handle.task_arn, input_file = %request.input_file, "started conversion task");
            DispatchOutcome::Launched {
                task_arn: handle.task_arn,
                input_file: request.input_file,
            }
        }
        Err(err) => {
            error!(input_file = %request.input_file, "error launching task: {}", err);
            DispatchOutcome::Failed {
                error: err.to_string(),
            }
        }
    }
}

pub fn dispatch_response(reports: &[MessageReport]) -> HandlerResponse {
    HandlerResponse::new(200, json!({ "messages": reports }))
}

/// Poll the conversion queue and dispatch whatever arrives.
pub fn spawn_queue_poller(
    launcher: Arc<dyn TaskLauncher>,
    queue: Arc<dyn MessageQueue>,
    settings: Arc<DispatchSettings>,
    interval: Duration,
    visibility: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(queue = %settings.queue_url, ?interval, "queue poller started");

        loop {
            ticker.tick().await;
            let messages = match queue
                .receive_messages(&settings.queue_url, POLL_BATCH_SIZE, visibility)
                .await
            {
                Ok(messages) => messages,
                Err(err) => {
                    error!("failed to receive from queue: {}", err);
                    continue;
                }
            };
            if messages.is_empty() {
                continue;
            }
            debug!("received {} messages", messages.len());
            let deliveries: Vec<QueueDelivery> = messages.into_iter().map(Into::into).collect();
            dispatch_batch(launcher.as_ref(), queue.as_ref(), &settings, &deliveries).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fakes::{FakeLauncher, FakeQueue};

    fn settings() -> DispatchSettings {
        DispatchSettings {
            cluster: "conversions".into(),
            task_definition: "file-converter:3".into(),
            subnet_id: "subnet-1".into(),
            security_group_id: "sg-1".into(),
            queue_url: "conversion-queue".into(),
            container_name: CONTAINER_NAME.into(),
        }
    }

    fn message(id: &str, body: &str) -> QueueDelivery {
        QueueDelivery {
            message_id: id.into(),
            receipt_handle: Some(format!("rh-{id}")),
            body: Some(body.into()),
        }
    }

    fn upload_body(bucket: &str, key: &str) -> String {
        json!({ "Records": [{ "s3": { "bucket": { "name": bucket }, "object": { "key": key } } }] })
            .to_string()
    }

    #[tokio::test]
    async fn malformed_messages_launch_nothing_but_are_deleted() {
        let launcher = FakeLauncher::default();
        let queue = FakeQueue::default();
        let messages = [
            message("m1", r#"{"Event":"s3:TestEvent"}"#),
            message("m2", r#"{"Records":[{"eventName":"x"}]}"#),
            message("m3", "not json"),
        ];

        let reports = dispatch_batch(&launcher, &queue, &settings(), &messages).await;

        assert!(launcher.launched.lock().unwrap().is_empty());
        assert_eq!(*queue.deleted.lock().unwrap(), vec!["rh-m1", "rh-m2", "rh-m3"]);
        assert!(matches!(reports[0].outcome, DispatchOutcome::Skipped { .. }));
        assert!(matches!(reports[1].outcome, DispatchOutcome::Skipped { .. }));
        assert!(matches!(reports[2].outcome, DispatchOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn valid_message_launches_exactly_one_task() {
        let launcher = FakeLauncher::default();
        let queue = FakeQueue::default();
        let messages = [message("m1", &upload_body("in", "reports/q1+final.docx"))];

        let reports = dispatch_batch(&launcher, &queue, &settings(), &messages).await;

        let launched = launcher.launched.lock().unwrap();
        assert_eq!(launched.len(), 1);
        let request = &launched[0];
        assert_eq!(request.cluster, "conversions");
        assert_eq!(request.task_definition, "file-converter:3");
        assert_eq!(request.network.subnets, vec!["subnet-1"]);
        assert_eq!(request.network.security_groups, vec!["sg-1"]);
        assert!(request.network.assign_public_ip);
        assert_eq!(request.container.name, CONTAINER_NAME);
        assert_eq!(
            request.container.environment,
            vec![
                ("INPUT_FILE".to_string(), "s3://in/reports/q1 final.docx".to_string()),
                ("OUTPUT_FORMAT".to_string(), "pdf".to_string()),
            ]
        );
        assert!(reports[0].deleted);
        assert!(matches!(reports[0].outcome, DispatchOutcome::Launched { .. }));
    }

    #[tokio::test]
    async fn incomplete_messages_do_not_block_their_siblings() {
        let launcher = FakeLauncher::default();
        let queue = FakeQueue::default();
        let mut no_handle = message("m2", &upload_body("in", "b.docx"));
        no_handle.receipt_handle = None;
        let mut no_body = message("m3", "");
        no_body.body = None;
        let messages = [message("m1", &upload_body("in", "a.docx")), no_handle, no_body];

        let reports = dispatch_batch(&launcher, &queue, &settings(), &messages).await;

        assert_eq!(launcher.launched.lock().unwrap().len(), 2);
        assert_eq!(*queue.deleted.lock().unwrap(), vec!["rh-m1", "rh-m3"]);

        assert!(matches!(reports[0].outcome, DispatchOutcome::Launched { .. }));
        assert!(reports[0].deleted);

        assert!(matches!(reports[1].outcome, DispatchOutcome::Launched { .. }));
        assert!(!reports[1].deleted);
        assert_eq!(reports[1].delete_error.as_deref(), Some("message has no receipt handle"));

        assert!(matches!(reports[2].outcome, DispatchOutcome::Skipped { .. }));
        assert!(reports[2].deleted);
    }

    #[tokio::test]
    async fn launch_failure_still_deletes() {
        let launcher = FakeLauncher {
            fail: true,
            ..Default::default()
        };
        let queue = FakeQueue::default();
        let messages = [message("m1", &upload_body("in", "a.docx"))];

        let reports = dispatch_batch(&launcher, &queue, &settings(), &messages).await;

        assert!(matches!(reports[0].outcome, DispatchOutcome::Failed { .. }));
        assert_eq!(*queue.deleted.lock().unwrap(), vec!["rh-m1"]);
    }

    #[tokio::test]
    async fn delete_failure_keeps_the_dispatch_outcome() {
        let launcher = FakeLauncher::default();
        let queue = FakeQueue {
            fail_deletes: true,
            ..Default::default()
        };
        let messages = [message("m1", &upload_body("in", "a.docx"))];

        let reports = dispatch_batch(&launcher, &queue, &settings(), &messages).await;

        assert!(matches!(reports[0].outcome, DispatchOutcome::Launched { .. }));
        assert!(!reports[0].deleted);
        assert!(reports[0].delete_error.is_some());
        assert_eq!(launcher.launched.lock().unwrap().len(), 1);
    }

    #[test]
    fn report_serializes_flat() {
        let report = MessageReport {
            message_id: "m1".into(),
            outcome: DispatchOutcome::Skipped {
                reason: "bad".into(),
            },
            deleted: true,
            delete_error: None,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value,
            json!({ "message_id": "m1", "status": "skipped", "reason": "bad", "deleted": true })
        );
    }
}
