//! Whole-document configuration export, import and audit.
//!
//! A configuration document is one JSON object holding the global sections
//! produced by [`Platform::export`], plus `projects` and `portfolios` keyed by
//! object key, and the `platform` basics of the instance it came from.

use serde_json::{Map, Value};

use crate::audit::{AuditSettings, Problem};
use crate::error::Result;
use crate::models::{portfolio, project};
use crate::platform::Platform;

pub const PLATFORM_SECTION: &str = "platform";
pub const PROJECTS_SECTION: &str = "projects";
pub const PORTFOLIOS_SECTION: &str = "portfolios";

/// What to export and how.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Only export these project and portfolio keys; global sections are
    /// skipped when set.
    pub keys: Option<Vec<String>>,
    /// Also export properties that cannot be imported back.
    pub full: bool,
    pub threads: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            keys: None,
            full: false,
            threads: 8,
        }
    }
}

/// Export the configuration of `platform` into one document.
#[tracing::instrument(skip_all)]
pub async fn export_config(platform: &Platform, options: &ExportOptions) -> Result<Value> {
    let keys = options.keys.as_deref();
    let mut doc = Map::new();
    doc.insert(PLATFORM_SECTION.to_string(), platform.basics().await?);
    if keys.is_none() {
        if let Value::Object(global) = platform.export().await? {
            doc.extend(global);
        }
    }
    let projects = project::export_projects(platform, keys, options.full, options.threads).await?;
    doc.insert(PROJECTS_SECTION.to_string(), Value::Object(projects));

    if platform.is_sonarcloud() || !platform.edition().await?.is_enterprise_or_above() {
        tracing::info!("No portfolios to export on {}", platform);
    } else {
        let portfolios = portfolio::export_portfolios(platform, keys, options.full).await?;
        doc.insert(PORTFOLIOS_SECTION.to_string(), Value::Object(portfolios));
    }
    Ok(Value::Object(doc))
}

/// Replay a configuration document on `platform`.
///
/// Global settings go first, then projects, then portfolios, since portfolio
/// selections reference projects. With `keys`, only those projects and
/// portfolios are imported and global sections are left alone.
#[tracing::instrument(skip_all)]
pub async fn import_config(platform: &Platform, config: &Value, keys: Option<&[String]>) -> Result<()> {
    if keys.is_none() {
        platform.import_config(config).await?;
    }
    if let Some(projects) = config.get(PROJECTS_SECTION) {
        project::import_projects(platform, projects, keys).await?;
    }
    if let Some(portfolios) = config.get(PORTFOLIOS_SECTION) {
        portfolio::import_portfolios(platform, portfolios, keys).await?;
    }
    Ok(())
}

/// Audit the platform, its projects and its portfolios.
///
/// With `keys`, only those projects and portfolios are audited.
#[tracing::instrument(skip_all)]
pub async fn audit_all(
    platform: &Platform,
    settings: &AuditSettings,
    keys: Option<&[String]>,
) -> Result<Vec<Problem>> {
    let mut problems = Vec::new();
    if keys.is_none() {
        problems.extend(platform.audit(settings).await?);
    }
    problems.extend(project::audit_projects(platform, settings, keys).await?);
    if platform.edition().await?.is_enterprise_or_above() && !platform.is_sonarcloud() {
        problems.extend(portfolio::audit_portfolios(platform, settings, keys).await?);
    }
    tracing::info!("Audit found {} problems", problems.len());
    Ok(problems)
}
