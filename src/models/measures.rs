//! Component measures.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::client::ParamsBuf;
use crate::error::Result;
use crate::platform::Platform;

#[derive(Debug, Deserialize)]
struct Measure {
    metric: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Component {
    #[serde(default)]
    measures: Vec<Measure>,
}

#[derive(Debug, Deserialize)]
struct MeasuresResponse {
    component: Component,
}

/// Raw measure values of a component, optionally on a branch or pull request.
pub async fn get(
    platform: &Platform,
    component: &str,
    metrics: &[&str],
    branch: Option<&str>,
    pull_request: Option<&str>,
) -> Result<BTreeMap<String, String>> {
    let params = ParamsBuf::new()
        .with("component", component)
        .with("metricKeys", metrics.join(","))
        .with_opt("branch", branch)
        .with_opt("pullRequest", pull_request);
    let resp: MeasuresResponse = platform
        .client()
        .get_json("measures/component", &params.as_params())
        .await?;
    Ok(resp
        .component
        .measures
        .into_iter()
        .filter_map(|m| m.value.map(|v| (m.metric, v)))
        .collect())
}

/// Integer measure, 0 when absent.
pub async fn get_count(
    platform: &Platform,
    component: &str,
    metric: &str,
    branch: Option<&str>,
) -> Result<u64> {
    let values = get(platform, component, &[metric], branch, None).await?;
    Ok(values
        .get(metric)
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v as u64)
        .unwrap_or(0))
}

/// Parse `ncloc_language_distribution`, e.g. `java=1200;xml=40`.
pub fn parse_distribution(value: &str) -> BTreeMap<String, u64> {
    value
        .split(';')
        .filter_map(|pair| {
            let (lang, n) = pair.split_once('=')?;
            Some((lang.trim().to_string(), n.trim().parse().ok()?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_distribution() {
        let d = parse_distribution("java=1200;xml=40;bad");
        assert_eq!(d.get("java"), Some(&1200));
        assert_eq!(d.get("xml"), Some(&40));
        assert_eq!(d.len(), 2);
    }
}
