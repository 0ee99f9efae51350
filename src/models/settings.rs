//! Platform and component settings.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::client::ParamsBuf;
use crate::error::{Result, SonarError};
use crate::platform::Platform;

/// Pseudo setting key for the new code period definition.
pub const NEW_CODE_PERIOD: &str = "newCodePeriod";

/// Section of the configuration document a setting is exported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SettingCategory {
    GeneralSettings,
    AnalysisScope,
    Authentication,
    Linters,
    SastConfig,
    Tests,
    ThirdParty,
    Languages,
}

impl SettingCategory {
    /// Section name in the configuration document.
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingCategory::GeneralSettings => "generalSettings",
            SettingCategory::AnalysisScope => "analysisScope",
            SettingCategory::Authentication => "authentication",
            SettingCategory::Linters => "linters",
            SettingCategory::SastConfig => "sastConfig",
            SettingCategory::Tests => "tests",
            SettingCategory::ThirdParty => "thirdParty",
            SettingCategory::Languages => "languages",
        }
    }

    /// Sections replayed as plain settings on import, in order.
    pub const IMPORTED: [SettingCategory; 7] = [
        SettingCategory::AnalysisScope,
        SettingCategory::Authentication,
        SettingCategory::GeneralSettings,
        SettingCategory::Linters,
        SettingCategory::SastConfig,
        SettingCategory::Tests,
        SettingCategory::ThirdParty,
    ];
}

const LANGUAGES: &str = "abap|apex|c|cloudformation|cobol|cpp|cs|css|docker|flex|go|html|java|javascript|jcl|json|kotlin|kubernetes|objc|php|pli|plsql|python|rpg|ruby|scala|swift|terraform|text|tsql|typescript|vb|vbnet|xml|yaml";

static CATEGORY_PATTERNS: LazyLock<Vec<(Regex, SettingCategory)>> = LazyLock::new(|| {
    let patterns = [
        (
            r"^sonar\.(global\.)?(test\.)?(exclusions|inclusions)$|^sonar\.(cpd|coverage)\.exclusions$|^sonar\.issue\.(ignore|enforce)",
            SettingCategory::AnalysisScope,
        ),
        (
            r"^sonar\.(auth\.|authenticator\.|forceAuthentication$|security\.realm|usernames?\.)",
            SettingCategory::Authentication,
        ),
        (r"^sonar\.security\.config\.", SettingCategory::SastConfig),
        (
            r"(?i)\.(lcov|jacoco|cobertura|opencover|dotcover|ncover3|vscoveragexml|gcov|clover|coverage|junit|xunit|nunit|mstest|vstest|tests?)\w*\.reportpaths?$",
            SettingCategory::Tests,
        ),
        (r"(?i)\.reportpaths?$", SettingCategory::Linters),
        (r"^sonar\.dependencyCheck\.", SettingCategory::ThirdParty),
    ];
    patterns
        .into_iter()
        .filter_map(|(p, c)| match Regex::new(p) {
            Ok(re) => Some((re, c)),
            Err(e) => {
                tracing::error!("Invalid setting category pattern {}: {}", p, e);
                None
            }
        })
        .collect()
});

static LANGUAGE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(r"^sonar\.(?:lang\.patterns\.)?({LANGUAGES})(?:\.|$)")).ok()
});

static CORE_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(sonar|email|projects|provisioning|devops)\.").ok());

/// Classify a setting key into a document section, with the language as
/// sub-section for language settings.
pub fn categorize(key: &str) -> (SettingCategory, Option<String>) {
    for (re, category) in CATEGORY_PATTERNS.iter() {
        if re.is_match(key) {
            return (*category, None);
        }
    }
    if let Some(caps) = LANGUAGE_PATTERN.as_ref().and_then(|re| re.captures(key)) {
        return (SettingCategory::Languages, Some(caps[1].to_string()));
    }
    if CORE_PREFIX.as_ref().is_some_and(|re| !re.is_match(key)) {
        return (SettingCategory::ThirdParty, None);
    }
    (SettingCategory::GeneralSettings, None)
}

/// One setting value, at platform or component level.
#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    pub key: String,
    /// A string, an array of strings, an array of field objects, or an
    /// empty string when not set.
    pub value: Value,
    /// Whether a component setting comes from the global level.
    pub inherited: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSetting {
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    values: Option<Vec<String>>,
    #[serde(default)]
    field_values: Option<Vec<Map<String, Value>>>,
    #[serde(default)]
    inherited: bool,
}

impl From<RawSetting> for Setting {
    fn from(raw: RawSetting) -> Self {
        let value = if let Some(v) = raw.value {
            Value::String(v)
        } else if let Some(vs) = raw.values {
            Value::Array(vs.into_iter().map(Value::String).collect())
        } else if let Some(fvs) = raw.field_values {
            Value::Array(fvs.into_iter().map(Value::Object).collect())
        } else {
            Value::String(String::new())
        };
        Self {
            key: raw.key,
            value,
            inherited: raw.inherited,
        }
    }
}

impl Setting {
    pub fn category(&self) -> (SettingCategory, Option<String>) {
        categorize(&self.key)
    }

    /// Flat string form, multiple values joined with commas.
    pub fn value_string(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            Value::Array(items) if items.iter().all(Value::is_string) => items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(","),
            other => other.to_string(),
        }
    }

    pub fn is_set(&self) -> bool {
        !matches!(&self.value, Value::String(s) if s.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct SettingsResponse {
    #[serde(default)]
    settings: Vec<RawSetting>,
}

#[derive(Debug, Deserialize)]
struct DefinitionsResponse {
    #[serde(default)]
    definitions: Vec<Definition>,
}

#[derive(Debug, Deserialize)]
struct Definition {
    key: String,
}

/// Read settings in bulk.
///
/// With `include_not_set`, every defined setting is returned, unset ones with
/// an empty value.
#[tracing::instrument(skip(platform))]
pub async fn get_bulk(
    platform: &Platform,
    component: Option<&str>,
    keys: Option<&[String]>,
    include_not_set: bool,
) -> Result<BTreeMap<String, Setting>> {
    let params = ParamsBuf::new()
        .with_opt("component", component)
        .with_opt("keys", keys.map(|k| k.join(",")));
    let resp: SettingsResponse = platform
        .client()
        .get_json("settings/values", &params.as_params())
        .await?;

    let mut settings: BTreeMap<String, Setting> = resp
        .settings
        .into_iter()
        .map(|raw| (raw.key.clone(), Setting::from(raw)))
        .collect();

    if include_not_set {
        let params = ParamsBuf::new().with_opt("component", component);
        let defs: DefinitionsResponse = platform
            .client()
            .get_json("settings/list_definitions", &params.as_params())
            .await?;
        for def in defs.definitions {
            if keys.is_some_and(|k| !k.contains(&def.key)) {
                continue;
            }
            settings.entry(def.key.clone()).or_insert(Setting {
                key: def.key,
                value: Value::String(String::new()),
                inherited: component.is_some(),
            });
        }
    }
    tracing::debug!("Read {} settings", settings.len());
    Ok(settings)
}

/// Read one setting, `None` if it has no value.
pub async fn get_one(platform: &Platform, key: &str, component: Option<&str>) -> Result<Option<Setting>> {
    let keys = [key.to_string()];
    let mut settings = get_bulk(platform, component, Some(&keys), false).await?;
    Ok(settings.remove(key))
}

/// Set a setting from its exported JSON value.
///
/// Empty values reset the setting to its default.
#[tracing::instrument(skip(platform, value))]
pub async fn set_setting(platform: &Platform, key: &str, value: &Value, component: Option<&str>) -> Result<()> {
    let mut params = ParamsBuf::new().with("key", key).with_opt("component", component);
    match value {
        Value::Null => return reset_setting(platform, key, component).await,
        Value::String(s) if s.is_empty() => return reset_setting(platform, key, component).await,
        Value::String(s) => params.push("value", s.as_str()),
        Value::Bool(b) => params.push("value", b.to_string()),
        Value::Number(n) => params.push("value", n.to_string()),
        Value::Array(items) if items.is_empty() => {
            return reset_setting(platform, key, component).await
        }
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Object(_) => params.push("fieldValues", item.to_string()),
                    Value::String(s) => params.push("values", s.as_str()),
                    other => params.push("values", other.to_string()),
                }
            }
        }
        Value::Object(_) => params.push("fieldValues", value.to_string()),
    }
    tracing::debug!("Setting {} = {}", key, value);
    platform.client().post("settings/set", &params.as_params()).await?;
    Ok(())
}

pub async fn reset_setting(platform: &Platform, key: &str, component: Option<&str>) -> Result<()> {
    let params = ParamsBuf::new().with("keys", key).with_opt("component", component);
    platform.client().post("settings/reset", &params.as_params()).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct NewCodeResponse {
    #[serde(rename = "type", default)]
    period_type: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    inherited: bool,
}

/// New code period as `TYPE` or `TYPE = value`, empty if undefined.
///
/// For a project, an inherited definition reads as empty.
pub async fn get_new_code_period(platform: &Platform, project: Option<&str>) -> Result<String> {
    let params = ParamsBuf::new().with_opt("project", project);
    let resp: NewCodeResponse = platform
        .client()
        .get_json("new_code_periods/show", &params.as_params())
        .await?;
    if project.is_some() && resp.inherited {
        return Ok(String::new());
    }
    Ok(match resp.period_type {
        Some(t) => encode_new_code_period(&t, resp.value.as_deref()),
        None => String::new(),
    })
}

pub async fn set_new_code_period(
    platform: &Platform,
    period_type: &str,
    value: Option<&str>,
    project: Option<&str>,
) -> Result<()> {
    let params = ParamsBuf::new()
        .with("type", period_type)
        .with_opt("value", value)
        .with_opt("project", project);
    platform.client().post("new_code_periods/set", &params.as_params()).await?;
    Ok(())
}

pub fn encode_new_code_period(period_type: &str, value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => format!("{period_type} = {v}"),
        _ => period_type.to_string(),
    }
}

/// Split `TYPE = value` into its parts.
pub fn decode_new_code_period(encoded: &str) -> Result<(String, Option<String>)> {
    let mut parts = encoded.splitn(2, '=');
    let period_type = parts.next().map(str::trim).unwrap_or_default();
    if period_type.is_empty() {
        return Err(SonarError::InvalidData(format!(
            "invalid new code period '{encoded}'"
        )));
    }
    let value = parts.next().map(str::trim).filter(|v| !v.is_empty());
    Ok((period_type.to_string(), value.map(String::from)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_categorize_known_sections() {
        assert_eq!(categorize("sonar.exclusions").0, SettingCategory::AnalysisScope);
        assert_eq!(categorize("sonar.auth.github.enabled").0, SettingCategory::Authentication);
        assert_eq!(
            categorize("sonar.javascript.lcov.reportPaths").0,
            SettingCategory::Tests
        );
        assert_eq!(
            categorize("sonar.python.pylint.reportPaths").0,
            SettingCategory::Linters
        );
        assert_eq!(categorize("sonar.core.serverBaseURL").0, SettingCategory::GeneralSettings);
        assert_eq!(categorize("some.plugin.option").0, SettingCategory::ThirdParty);
    }

    #[test]
    fn test_categorize_language_subsection() {
        assert_eq!(
            categorize("sonar.java.file.suffixes"),
            (SettingCategory::Languages, Some("java".to_string()))
        );
        assert_eq!(
            categorize("sonar.lang.patterns.cs"),
            (SettingCategory::Languages, Some("cs".to_string()))
        );
    }

    #[test]
    fn test_raw_setting_conversion() {
        let raw: RawSetting =
            serde_json::from_value(json!({"key": "k", "values": ["a", "b"], "inherited": true}))
                .unwrap();
        let s = Setting::from(raw);
        assert_eq!(s.value, json!(["a", "b"]));
        assert_eq!(s.value_string(), "a,b");
        assert!(s.inherited);
        assert!(s.is_set());
    }

    #[test]
    fn test_new_code_period_encoding() {
        assert_eq!(encode_new_code_period("PREVIOUS_VERSION", None), "PREVIOUS_VERSION");
        assert_eq!(encode_new_code_period("NUMBER_OF_DAYS", Some("30")), "NUMBER_OF_DAYS = 30");
        assert_eq!(
            decode_new_code_period("NUMBER_OF_DAYS = 30").unwrap(),
            ("NUMBER_OF_DAYS".to_string(), Some("30".to_string()))
        );
        assert_eq!(
            decode_new_code_period("PREVIOUS_VERSION").unwrap(),
            ("PREVIOUS_VERSION".to_string(), None)
        );
        assert!(decode_new_code_period(" = 3").is_err());
    }
}
