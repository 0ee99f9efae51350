//! Project zip dumps (export and import through background tasks).

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Project;
use crate::error::{Result, SonarError};
use crate::models::task::{self, TaskStatus};
use crate::platform::Version;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportResponse {
    task_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DumpStatus {
    #[serde(default)]
    exported_dump: Option<String>,
}

/// Outcome of a zip export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExportStatus {
    /// The export task reached a terminal state, or the wait timed out.
    Done(TaskStatus),
    /// The export could not be started.
    HttpError(u16),
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportStatus::Done(status) => fmt::Display::fmt(status, f),
            ExportStatus::HttpError(code) => write!(f, "HTTP_ERROR {code}"),
        }
    }
}

/// Status of a zip export, with the dump file path on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipExport {
    pub status: ExportStatus,
    pub file: Option<String>,
}

impl ZipExport {
    pub fn is_success(&self) -> bool {
        self.status == ExportStatus::Done(TaskStatus::Success)
    }
}

impl Project {
    async fn check_dump_supported(&self) -> Result<()> {
        let platform = self.platform()?;
        if platform.version().await? < Version::new(9, 2, 0) && !platform.edition().await?.is_enterprise_or_above() {
            return Err(SonarError::UnsupportedOperation(format!(
                "zip export of {self} requires version 9.2 or enterprise edition"
            )));
        }
        Ok(())
    }

    /// Start a zip export and return the background task id.
    pub async fn export_async(&self) -> Result<String> {
        self.check_dump_supported().await?;
        tracing::info!("Exporting {} (asynchronously)", self);
        let resp: ExportResponse = self
            .platform()?
            .client()
            .post_json("project_dump/export", &[("key", self.key.as_str())])
            .await?;
        Ok(resp.task_id)
    }

    /// Export the project as a zip dump and wait up to `timeout` for it.
    ///
    /// A failed start is reported as [`ExportStatus::HttpError`], an export
    /// still running after `timeout` as [`TaskStatus::Timeout`].
    #[tracing::instrument(skip(self), fields(project = %self.key))]
    pub async fn export_zip(&self, timeout: Duration) -> Result<ZipExport> {
        self.check_dump_supported().await?;
        let platform = self.platform()?;
        tracing::info!("Exporting {} (synchronously)", self);
        let resp = platform
            .client()
            .post_soft("project_dump/export", &[("key", self.key.as_str())])
            .await?;
        if !resp.status().is_success() {
            let code = resp.status().as_u16();
            tracing::error!("Zip export of {} could not start: HTTP {}", self, code);
            return Ok(ZipExport {
                status: ExportStatus::HttpError(code),
                file: None,
            });
        }
        let started: ExportResponse = resp.json().await?;
        let status = task::wait_for_completion(&platform, &started.task_id, timeout).await?;
        if status != TaskStatus::Success {
            tracing::warn!("Zip export of {} ended with status {}", self, status);
            return Ok(ZipExport {
                status: ExportStatus::Done(status),
                file: None,
            });
        }
        let dump: DumpStatus = platform
            .client()
            .get_json("project_dump/status", &[("key", self.key.as_str())])
            .await?;
        tracing::debug!("{} exported to {:?}", self, dump.exported_dump);
        Ok(ZipExport {
            status: ExportStatus::Done(status),
            file: dump.exported_dump,
        })
    }

    /// Import a zip dump previously placed on the platform; returns the HTTP
    /// status of the request.
    pub async fn import_zip(&self) -> Result<u16> {
        let platform = self.platform()?;
        if !platform.edition().await?.is_enterprise_or_above() {
            return Err(SonarError::UnsupportedOperation(
                "project zip import requires enterprise edition".to_string(),
            ));
        }
        tracing::info!("Importing zip dump of {}", self);
        let resp = platform
            .client()
            .post_soft("project_dump/import", &[("key", self.key.as_str())])
            .await?;
        Ok(resp.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_status_display() {
        assert_eq!(ExportStatus::Done(TaskStatus::Timeout).to_string(), "TIMEOUT");
        assert_eq!(ExportStatus::HttpError(403).to_string(), "HTTP_ERROR 403");
    }

    #[test]
    fn test_only_success_counts_as_success() {
        let ok = ZipExport {
            status: ExportStatus::Done(TaskStatus::Success),
            file: Some("/dumps/p.zip".to_string()),
        };
        assert!(ok.is_success());
        let failed = ZipExport {
            status: ExportStatus::Done(TaskStatus::Failed),
            file: None,
        };
        assert!(!failed.is_success());
    }
}
