//! Optional virus scan of downloaded inputs.

use async_trait::async_trait;
use std::{io, path::Path};
use tokio::process::Command;
use tracing::debug;

const CLEAN_MARKER: &str = "Infected files: 0";

#[derive(Debug, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    Infected(String),
}

#[async_trait]
pub trait VirusScanner: Send + Sync {
    async fn scan(&self, path: &Path) -> io::Result<ScanVerdict>;
}

/// Runs `clamscan` on the file.
pub struct ClamScanner {
    program: String,
}

impl Default for ClamScanner {
    fn default() -> Self {
        Self {
            program: "clamscan".to_string(),
        }
    }
}

#[async_trait]
impl VirusScanner for ClamScanner {
    async fn scan(&self, path: &Path) -> io::Result<ScanVerdict> {
        let output = Command::new(&self.program).arg(path).output().await?;
        let report = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(path = %path.display(), status = ?output.status, "scan finished");
        Ok(verdict(report))
    }
}

/// A report is clean only if it states zero infected files.
pub fn verdict(report: String) -> ScanVerdict {
    if report.contains(CLEAN_MARKER) {
        ScanVerdict::Clean
    } else {
        ScanVerdict::Infected(report)
    }
}
