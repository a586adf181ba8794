//! Conversion worker: one input object in, one converted object and one
//! notification out.
//!
//! Every step is fatal. There is no retry here; whoever launched the task
//! owns recovery.

use serde_json::json;
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::parse_flag,
    models::conversion::{
        ConversionPlan, ConversionResult, DEFAULT_OUTPUT_FORMAT, ENV_INPUT_FILE,
        ENV_OUTPUT_FORMAT, ENV_TOPIC, InvalidObjectUri, ObjectUri,
    },
    services::{
        clients::{ClientError, Notifier, ObjectStore},
        convert::{ConvertError, convert_docx_to_pdf, font::FontSource},
        launcher::ENV_TASK_ARN,
        notifier::CONVERSION_SUBJECT,
        scanner::{ScanVerdict, VirusScanner},
    },
};

pub const ENV_SCRATCH_DIR: &str = "DOCPIPE_SCRATCH_DIR";
pub const ENV_FONT_PATH: &str = "DOCPIPE_FONT_PATH";
pub const ENV_VIRUS_SCAN: &str = "VIRUS_SCAN_ENABLED";

const OUTPUT_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("environment variable {0} is required")]
    MissingEnv(&'static str),
    #[error("environment variable {name} has invalid value `{value}`")]
    InvalidEnv { name: &'static str, value: String },
    #[error(transparent)]
    InvalidUri(#[from] InvalidObjectUri),
    #[error("unsupported output format `{0}`")]
    UnsupportedFormat(String),
    #[error("download failed: {0}")]
    Download(#[source] ClientError),
    #[error("virus scan flagged {file}")]
    VirusDetected { file: String, report: String },
    #[error("virus scan failed: {0}")]
    Scan(#[source] io::Error),
    #[error("conversion failed: {0}")]
    Convert(#[from] ConvertError),
    #[error("upload failed: {0}")]
    Upload(#[source] ClientError),
    #[error("publish failed: {0}")]
    Publish(#[source] ClientError),
    #[error("scratch directory: {0}")]
    Scratch(#[from] io::Error),
    #[error("conversion task panicked: {0}")]
    Join(#[from] JoinError),
}

/// Task parameters read from the process environment.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub input_file: String,
    pub output_format: String,
    pub topic: Option<String>,
    pub scratch_dir: PathBuf,
    pub font: FontSource,
    pub scan_enabled: bool,
    pub task_arn: Option<String>,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, WorkerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WorkerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let input_file = get(ENV_INPUT_FILE).ok_or(WorkerError::MissingEnv(ENV_INPUT_FILE))?;
        let output_format = get(ENV_OUTPUT_FORMAT).ok_or(WorkerError::MissingEnv(ENV_OUTPUT_FORMAT))?;

        Ok(Self {
            input_file,
            output_format,
            topic: get(ENV_TOPIC),
            scratch_dir: get(ENV_SCRATCH_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            font: get(ENV_FONT_PATH)
                .map(|value| FontSource::from_setting(&value))
                .unwrap_or_default(),
            scan_enabled: match get(ENV_VIRUS_SCAN) {
                Some(value) => parse_flag(&value).map_err(|_| WorkerError::InvalidEnv {
                    name: ENV_VIRUS_SCAN,
                    value,
                })?,
                None => false,
            },
            task_arn: get(ENV_TASK_ARN),
        })
    }
}

pub struct ConversionWorker {
    objects: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    scanner: Option<Arc<dyn VirusScanner>>,
}

impl ConversionWorker {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
        scanner: Option<Arc<dyn VirusScanner>>,
    ) -> Self {
        Self {
            objects,
            notifier,
            scanner,
        }
    }

    /// Run the whole conversion. The scratch directory is removed afterwards
    /// whether or not the run succeeded.
    pub async fn run(&self, cfg: &WorkerConfig) -> Result<ConversionResult, WorkerError> {
        let source = ObjectUri::parse(&cfg.input_file)?;
        let format = cfg.output_format.trim().to_ascii_lowercase();
        if format != DEFAULT_OUTPUT_FORMAT {
            return Err(WorkerError::UnsupportedFormat(cfg.output_format.clone()));
        }

        let work_dir = cfg
            .scratch_dir
            .join(format!("docpipe-{}", Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&work_dir).await?;

        let plan = ConversionPlan::new(source, &format, &work_dir);
        let outcome = self.run_plan(&plan, cfg).await;

        if let Err(err) = tokio::fs::remove_dir_all(&work_dir).await {
            warn!(path = %work_dir.display(), "failed to remove scratch directory: {}", err);
        }
        outcome
    }

    async fn run_plan(&self, plan: &ConversionPlan, cfg: &WorkerConfig) -> Result<ConversionResult, WorkerError> {
        info!(
            task_arn = cfg.task_arn.as_deref().unwrap_or("-"),
            input_file = %plan.source,
            output_format = %plan.format,
            "starting conversion"
        );

        self.objects
            .download_to(&plan.source.bucket, &plan.source.key, &plan.local_input)
            .await
            .map_err(WorkerError::Download)?;
        info!(path = %plan.local_input.display(), "downloaded input");

        if let Some(scanner) = &self.scanner {
            self.scan(scanner.as_ref(), &plan.local_input).await?;
        }

        let font = cfg.font.clone();
        let (input, output) = (plan.local_input.clone(), plan.local_output.clone());
        let paragraphs = tokio::task::spawn_blocking(move || {
            let font = font.load()?;
            convert_docx_to_pdf(&input, &output, &font)
        })
        .await??;
        info!(paragraphs, path = %plan.local_output.display(), "converted document");

        self.objects
            .upload_from(
                &plan.local_output,
                &plan.target.bucket,
                &plan.target.key,
                Some(OUTPUT_CONTENT_TYPE.to_string()),
            )
            .await
            .map_err(WorkerError::Upload)?;
        info!(output_file = %plan.target, "uploaded converted file");

        let result = plan.result();
        let topic = cfg.topic.as_deref().ok_or(WorkerError::MissingEnv(ENV_TOPIC))?;
        let message = json!({
            "input_file": result.input_file,
            "output_file": result.output_file,
        })
        .to_string();
        let message_id = self
            .notifier
            .publish(topic, CONVERSION_SUBJECT, &message)
            .await
            .map_err(WorkerError::Publish)?;
        info!(%message_id, topic, "published completion notification");

        Ok(result)
    }

    async fn scan(&self, scanner: &dyn VirusScanner, path: &Path) -> Result<(), WorkerError> {
        match scanner.scan(path).await.map_err(WorkerError::Scan)? {
            ScanVerdict::Clean => {
                info!(path = %path.display(), "virus scan clean");
                Ok(())
            }
            ScanVerdict::Infected(report) => Err(WorkerError::VirusDetected {
                file: path.display().to_string(),
                report,
            }),
        }
    }
}
