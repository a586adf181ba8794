//! Launches conversion tasks as child processes of the worker binary.
//!
//! The child gets the task's container environment on top of a base
//! environment that points it at the same database and storage directory.

use async_trait::async_trait;
use std::{path::PathBuf, process::Stdio};
use tokio::process::Command;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::services::clients::{ClientError, ClientResult, RunTaskRequest, TaskHandle, TaskLauncher};

/// Environment variable carrying the task ARN into the child.
pub const ENV_TASK_ARN: &str = "DOCPIPE_TASK_ARN";

pub struct ProcessTaskLauncher {
    program: PathBuf,
    base_env: Vec<(String, String)>,
}

impl ProcessTaskLauncher {
    pub fn new(program: impl Into<PathBuf>, base_env: Vec<(String, String)>) -> Self {
        Self {
            program: program.into(),
            base_env,
        }
    }
}

#[async_trait]
impl TaskLauncher for ProcessTaskLauncher {
    async fn run_task(&self, request: &RunTaskRequest) -> ClientResult<TaskHandle> {
        let task_arn = format!("task/{}/{}", request.cluster, Uuid::new_v4().simple());

        info!(
            task_arn = %task_arn,
            task_definition = %request.task_definition,
            container = %request.container.name,
            subnets = ?request.network.subnets,
            security_groups = ?request.network.security_groups,
            assign_public_ip = request.network.assign_public_ip,
            "launching conversion task"
        );

        let mut child = Command::new(&self.program)
            .arg("convert")
            .envs(self.base_env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .envs(
                request
                    .container
                    .environment
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str())),
            )
            .env(ENV_TASK_ARN, &task_arn)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|err| {
                ClientError::Launch(format!("spawning {}: {}", self.program.display(), err))
            })?;

        let watched_arn = task_arn.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => info!(task_arn = %watched_arn, "task finished"),
                Ok(status) => warn!(task_arn = %watched_arn, %status, "task exited with failure"),
                Err(err) => error!(task_arn = %watched_arn, "failed to wait on task: {}", err),
            }
        });

        Ok(TaskHandle { task_arn })
    }
}
