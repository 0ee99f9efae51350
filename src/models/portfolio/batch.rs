//! Operations over all portfolios.

use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};

use super::{check_portfolios_supported, Portfolio, COOLDOWN};
use crate::audit::{AuditSettings, Problem};
use crate::error::Result;
use crate::platform::Platform;
use crate::traits::{Audit, Get, Update};
use crate::util::str_field;

/// Audit the given portfolios, or all portfolios.
#[tracing::instrument(skip_all)]
pub async fn audit_portfolios(
    platform: &Platform,
    settings: &AuditSettings,
    keys: Option<&[String]>,
) -> Result<Vec<Problem>> {
    if !settings.get_bool("audit.portfolios", true) {
        tracing::debug!("Auditing portfolios is disabled, skipping...");
        return Ok(Vec::new());
    }
    tracing::info!("--- Auditing portfolios ---");
    let mut problems = Vec::new();
    for portfolio in Portfolio::get_list(platform, keys).await? {
        match portfolio.audit(settings).await {
            Ok(found) => problems.extend(found),
            Err(e) => tracing::error!("Audit of {} failed: {}", portfolio, e),
        }
    }
    Ok(problems)
}

/// Export top-level portfolios as `key -> configuration`.
///
/// # Errors
///
/// [`crate::SonarError::UnsupportedOperation`] on editions without
/// portfolios.
#[tracing::instrument(skip_all)]
pub async fn export_portfolios(
    platform: &Platform,
    keys: Option<&[String]>,
    full: bool,
) -> Result<Map<String, Value>> {
    check_portfolios_supported(platform).await?;
    tracing::info!("Exporting portfolios");
    let portfolios = Portfolio::get_list(platform, keys).await?;
    let total = portfolios.len();
    let mut out = Map::new();
    for (i, portfolio) in portfolios.iter().enumerate() {
        if portfolio.is_sub_portfolio() {
            tracing::debug!("Skipping export of {}, it's a standard sub-portfolio", portfolio);
        } else {
            match portfolio.export(full).await {
                Ok(Value::Object(mut json)) => {
                    json.remove("key");
                    out.insert(portfolio.key().to_string(), Value::Object(json));
                }
                Ok(_) => {}
                Err(e) => tracing::error!("Export of {} failed, skipped: {}", portfolio, e),
            }
        }
        if (i + 1) % 50 == 0 || i + 1 == total {
            tracing::info!("Exported {}/{} portfolios ({}%)", i + 1, total, (i + 1) * 100 / total);
        }
    }
    Ok(out)
}

/// Create the owned sub-portfolios of `data` under `parent`, recursively.
///
/// Returns how many were created.
fn create_hierarchy<'a>(
    platform: &'a Platform,
    data: &'a Value,
    parent: &'a Portfolio,
) -> BoxFuture<'a, Result<usize>> {
    async move {
        let Some(subs) = data.get("subPortfolios").and_then(Value::as_object) else {
            return Ok(0);
        };
        let mut created = 0;
        for (key, sub) in subs {
            if sub.get("byReference").and_then(Value::as_bool).unwrap_or(false) {
                continue;
            }
            let child = match Portfolio::lookup(platform, key).await {
                Ok(child) => child,
                Err(e) if e.is_not_found() => {
                    let name = str_field(sub, "name").unwrap_or(key);
                    created += 1;
                    Portfolio::create(platform, key, name, Some(parent.key()), sub).await?
                }
                Err(e) => return Err(e),
            };
            child.set_parent(parent.key());
            created += create_hierarchy(platform, sub, &child).await?;
        }
        Ok(created)
    }
    .boxed()
}

/// Import a `portfolios` section in two passes.
///
/// The first pass creates every top-level portfolio and its owned
/// sub-portfolios, so that references between top-level portfolios resolve
/// in the second pass, which applies selections, permissions and links.
#[tracing::instrument(skip_all)]
pub async fn import_portfolios(platform: &Platform, config: &Value, keys: Option<&[String]>) -> Result<()> {
    let Some(section) = config.as_object() else {
        tracing::info!("No portfolios to import");
        return Ok(());
    };
    let edition = platform.edition().await?;
    if !edition.is_enterprise_or_above() {
        tracing::warn!("Can't import portfolios on a {} edition", edition);
        return Ok(());
    }
    let selected: Vec<(&String, &Value)> = section
        .iter()
        .filter(|(key, _)| keys.map_or(true, |k| k.contains(*key)))
        .collect();

    tracing::info!("Importing portfolios - pass 1: create all top level portfolios");
    Portfolio::search(platform, &[]).await?;
    for (key, data) in &selected {
        tracing::info!("Importing portfolio key '{}'", key);
        let portfolio = match Portfolio::lookup(platform, key).await {
            Ok(p) => p,
            Err(e) if e.is_not_found() => {
                tracing::debug!("Portfolio '{}' not found, creating it", key);
                let name = str_field(data, "name").unwrap_or(key);
                Portfolio::create(platform, key, name, None, data).await?
            }
            Err(e) => return Err(e),
        };
        let created = create_hierarchy(platform, data, &portfolio).await?;
        if created > 0 {
            // new sub-portfolios only show up in searches after a recompute
            portfolio.recompute().await?;
            tokio::time::sleep(COOLDOWN * created as u32).await;
        }
    }

    tracing::info!("Importing portfolios - pass 2: set up portfolios content and hierarchy");
    for (key, data) in &selected {
        match Portfolio::get(platform, (*key).clone()).await {
            Ok(portfolio) => {
                if let Err(e) = portfolio.update(*data).await {
                    tracing::error!("Import of {} failed: {}", portfolio, e);
                }
            }
            Err(e) if e.is_not_found() => {
                tracing::error!("Can't find portfolio key '{}', name '{:?}'", key, str_field(data, "name"));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Recompute all portfolios.
pub async fn recompute_all(platform: &Platform) -> Result<()> {
    platform.client().post("views/refresh", &[]).await?;
    Ok(())
}
