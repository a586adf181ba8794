use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::{
    services::{
        dispatcher::{CONTAINER_NAME, DispatchSettings},
        key_issuer::IssuerSettings,
        metadata_table::DEFAULT_TABLE,
    },
    state::PipelineSettings,
};

/// Command line of the `docpipe` binary.
#[derive(Parser, Debug)]
#[command(author, version, about = "Document upload, metadata and conversion pipeline")]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Directory where objects are stored (overrides DOCPIPE_STORAGE_DIR)
    #[arg(long, global = true)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides DOCPIPE_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP service and the queue poller
    Serve(ServeArgs),
    /// Convert one document, as configured by INPUT_FILE / OUTPUT_FORMAT
    Convert,
    /// Apply database migrations and exit
    Migrate,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Host to bind to (overrides DOCPIPE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides DOCPIPE_PORT)
    #[arg(long)]
    pub port: Option<u16>,
}

/// Where objects and metadata live. Every subcommand needs this.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub storage_dir: String,
    pub database_url: String,
}

impl StoreConfig {
    pub fn from_env_and_args(args: &CommonArgs) -> Self {
        Self {
            storage_dir: args
                .storage_dir
                .clone()
                .unwrap_or_else(|| env_or("DOCPIPE_STORAGE_DIR", "./data/objects")),
            database_url: args
                .database_url
                .clone()
                .unwrap_or_else(|| env_or("DOCPIPE_DATABASE_URL", "sqlite://./data/meta/docpipe.db")),
        }
    }

    /// Environment handed to launched conversion tasks so they use the same
    /// storage and database.
    pub fn task_environment(&self) -> Vec<(String, String)> {
        vec![
            ("DOCPIPE_STORAGE_DIR".to_string(), self.storage_dir.clone()),
            ("DOCPIPE_DATABASE_URL".to_string(), self.database_url.clone()),
        ]
    }
}

/// Everything `docpipe serve` needs.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreConfig,
    pub metadata_table: String,
    pub pipeline: PipelineSettings,
    /// `None` disables the background queue poller.
    pub poll_interval: Option<Duration>,
    pub visibility_timeout: Duration,
    pub worker_command: PathBuf,
}

impl ServeConfig {
    pub fn from_env_and_args(common: &CommonArgs, args: &ServeArgs) -> Result<Self> {
        Self::from_lookup(common, args, |name| env::var(name).ok())
    }

    /// Build from any variable source. Empty values count as missing.
    pub fn from_lookup<F>(common: &CommonArgs, args: &ServeArgs, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let store = StoreConfig::from_env_and_args(common);

        let dispatch = DispatchSettings {
            cluster: vars.required("ECS_CLUSTER")?,
            task_definition: vars.required("TASK_DEF")?,
            subnet_id: vars.required("SUBNET_ID")?,
            security_group_id: vars.required("SECURITY_GROUP_ID")?,
            queue_url: vars.required("QUEUE_URL")?,
            container_name: CONTAINER_NAME.to_string(),
        };

        let issuer = IssuerSettings {
            usage_plan_id: vars.required("USAGE_PLAN_ID")?,
            sender_email: vars.required("SES_SENDER_EMAIL")?,
        };

        let poll_secs: u64 = vars.parse("DOCPIPE_DISPATCH_POLL_SECS", 5)?;
        let visibility_secs: u64 = vars.parse("DOCPIPE_VISIBILITY_TIMEOUT_SECS", 30)?;

        let worker_command = match vars.get("DOCPIPE_WORKER_COMMAND") {
            Some(value) => PathBuf::from(value),
            None => env::current_exe().context("resolving the current executable")?,
        };

        Ok(Self {
            host: args
                .host
                .clone()
                .unwrap_or_else(|| vars.or("DOCPIPE_HOST", "0.0.0.0")),
            port: match args.port {
                Some(port) => port,
                None => vars.parse("DOCPIPE_PORT", 3000)?,
            },
            store,
            metadata_table: vars.or("FILE_METADATA_TABLE", DEFAULT_TABLE),
            pipeline: PipelineSettings {
                dispatch,
                issuer,
                convert_suffix: vars.or("DOCPIPE_CONVERT_SUFFIX", ".docx"),
                require_api_key: vars.flag("DOCPIPE_REQUIRE_API_KEY")?,
            },
            poll_interval: (poll_secs > 0).then(|| Duration::from_secs(poll_secs)),
            visibility_timeout: Duration::from_secs(visibility_secs),
            worker_command,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or(name: &str, default: &str) -> String {
    Vars(|key: &str| env::var(key).ok()).or(name, default)
}

/// Typed reads over a variable source.
struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|value| !value.trim().is_empty())
    }

    fn or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, name: &str) -> Result<String> {
        match self.get(name) {
            Some(value) => Ok(value),
            None => bail!("{} must be set", name),
        }
    }

    fn parse<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get(name) {
            Some(value) => value
                .trim()
                .parse::<T>()
                .with_context(|| format!("parsing {} value `{}`", name, value)),
            None => Ok(default),
        }
    }

    fn flag(&self, name: &str) -> Result<bool> {
        match self.get(name) {
            Some(value) => {
                parse_flag(&value).with_context(|| format!("parsing {} value `{}`", name, value))
            }
            None => Ok(false),
        }
    }
}

/// Accepts the usual spellings of a boolean switch.
pub fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("`{}` is not a boolean", other),
    }
}
