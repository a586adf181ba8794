//! Conversion requests, results, and the deterministic key derivation that
//! ties an input object to its converted counterpart.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::event::UploadEvent;

/// Output format used when an upload does not ask for anything else.
pub const DEFAULT_OUTPUT_FORMAT: &str = "pdf";

/// Prefix under which converted objects are written.
pub const CONVERTED_PREFIX: &str = "converted/";

/// Environment variable names a conversion task is launched with.
pub const ENV_INPUT_FILE: &str = "INPUT_FILE";
pub const ENV_OUTPUT_FORMAT: &str = "OUTPUT_FORMAT";
pub const ENV_TOPIC: &str = "SNS_TOPIC_ARN";

const URI_SCHEME: &str = "s3://";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("`{0}` is not an s3://<bucket>/<key> URI")]
pub struct InvalidObjectUri(pub String);

/// `s3://<bucket>/<key>` reference to a stored object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectUri {
    pub bucket: String,
    pub key: String,
}

impl ObjectUri {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn parse(uri: &str) -> Result<Self, InvalidObjectUri> {
        let rest = uri
            .strip_prefix(URI_SCHEME)
            .ok_or_else(|| InvalidObjectUri(uri.to_string()))?;
        match rest.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                Ok(Self::new(bucket, key))
            }
            _ => Err(InvalidObjectUri(uri.to_string())),
        }
    }

    /// Last path segment of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for ObjectUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", URI_SCHEME, self.bucket, self.key)
    }
}

/// Strip only the last extension: `a.b.docx` -> `a.b`, `README` -> `README`.
pub fn base_name(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((base, _)) if !base.is_empty() => base,
        _ => file_name,
    }
}

/// Storage key the converted output of `input_key` is written to.
pub fn converted_key(input_key: &str, format: &str) -> String {
    let file_name = input_key.rsplit('/').next().unwrap_or(input_key);
    format!("{}{}.{}", CONVERTED_PREFIX, base_name(file_name), format)
}

/// What the dispatcher asks a conversion task to do.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ConversionRequest {
    pub input_file: String,
    pub output_format: String,
}

impl ConversionRequest {
    /// Request conversion of a freshly uploaded object to the default format.
    pub fn for_upload(upload: &UploadEvent) -> Self {
        Self {
            input_file: ObjectUri::new(&upload.bucket, &upload.key).to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
        }
    }

    /// The request as process environment values.
    pub fn environment(&self) -> Vec<(String, String)> {
        vec![
            (ENV_INPUT_FILE.to_string(), self.input_file.clone()),
            (ENV_OUTPUT_FORMAT.to_string(), self.output_format.clone()),
        ]
    }
}

/// Published once a conversion has been uploaded.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ConversionResult {
    pub input_file: String,
    pub output_file: String,
}

/// Where one conversion reads from and writes to, locally and in storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversionPlan {
    pub source: ObjectUri,
    pub target: ObjectUri,
    pub local_input: PathBuf,
    pub local_output: PathBuf,
    pub format: String,
}

impl ConversionPlan {
    /// Derive every path for converting `source` into `format` under `scratch`.
    /// The converted object lands in the source bucket.
    pub fn new(source: ObjectUri, format: &str, scratch: &Path) -> Self {
        let file_name = source.file_name().to_string();
        let base = base_name(&file_name).to_string();
        let target = ObjectUri::new(&source.bucket, converted_key(&source.key, format));

        Self {
            local_input: scratch.join(&file_name),
            local_output: scratch.join(format!("{}.{}", base, format)),
            format: format.to_string(),
            source,
            target,
        }
    }

    pub fn result(&self) -> ConversionResult {
        ConversionResult {
            input_file: self.source.to_string(),
            output_file: self.target.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converted_key_is_deterministic() {
        assert_eq!(converted_key("reports/q1.docx", "pdf"), "converted/q1.pdf");
        assert_eq!(converted_key("q1.docx", "pdf"), "converted/q1.pdf");
        assert_eq!(converted_key("a/b/v1.2.docx", "pdf"), "converted/v1.2.pdf");
        assert_eq!(converted_key("notes", "pdf"), "converted/notes.pdf");
    }

    #[test]
    fn dotfile_keeps_its_name() {
        assert_eq!(base_name(".profile"), ".profile");
    }

    #[test]
    fn parses_object_uris() {
        let uri = ObjectUri::parse("s3://in-bucket/reports/q1.docx").unwrap();
        assert_eq!(uri.bucket, "in-bucket");
        assert_eq!(uri.key, "reports/q1.docx");
        assert_eq!(uri.file_name(), "q1.docx");
        assert_eq!(uri.to_string(), "s3://in-bucket/reports/q1.docx");
    }

    #[test]
    fn rejects_malformed_uris() {
        assert!(ObjectUri::parse("https://in-bucket/q1.docx").is_err());
        assert!(ObjectUri::parse("s3://in-bucket").is_err());
        assert!(ObjectUri::parse("s3:///q1.docx").is_err());
    }

    #[test]
    fn request_for_upload_targets_pdf() {
        let upload = UploadEvent {
            bucket: "in".into(),
            key: "reports/q1 final.docx".into(),
        };
        let request = ConversionRequest::for_upload(&upload);
        assert_eq!(request.input_file, "s3://in/reports/q1 final.docx");
        assert_eq!(
            request.environment(),
            vec![
                ("INPUT_FILE".to_string(), "s3://in/reports/q1 final.docx".to_string()),
                ("OUTPUT_FORMAT".to_string(), "pdf".to_string()),
            ]
        );
    }

    #[test]
    fn plan_derives_scratch_paths_and_target() {
        let plan = ConversionPlan::new(
            ObjectUri::parse("s3://in/reports/q1.docx").unwrap(),
            "pdf",
            Path::new("/scratch"),
        );
        assert_eq!(plan.local_input, PathBuf::from("/scratch/q1.docx"));
        assert_eq!(plan.local_output, PathBuf::from("/scratch/q1.pdf"));
        assert_eq!(plan.result().output_file, "s3://in/converted/q1.pdf");
    }
}
