//! Portfolio project selection.
//!
//! Documents carry the selection either as flat legacy keys
//! (`projectSelectionMode`, `projectSelectionRegexp`, ...) or as a structured
//! `projectSelectionMode` object. Both decode to one [`Selection`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::{Result, SonarError};
use crate::platform::Version;
use crate::util::{list_to_csv, str_field, value_to_list, DEFAULT_BRANCH};

pub const SELECTION_MODE: &str = "projectSelectionMode";
pub const SELECTION_BRANCH: &str = "projectSelectionBranch";
pub const SELECTION_REGEXP: &str = "projectSelectionRegexp";
pub const SELECTION_TAGS: &str = "projectSelectionTags";
pub const PROJECTS: &str = "projects";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionMode {
    Manual,
    Regexp,
    Tags,
    Rest,
    None,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::Manual => "MANUAL",
            SelectionMode::Regexp => "REGEXP",
            SelectionMode::Tags => "TAGS",
            SelectionMode::Rest => "REST",
            SelectionMode::None => "NONE",
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionMode {
    type Err = SonarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "MANUAL" => Ok(SelectionMode::Manual),
            "REGEXP" => Ok(SelectionMode::Regexp),
            "TAGS" => Ok(SelectionMode::Tags),
            "REST" => Ok(SelectionMode::Rest),
            "NONE" => Ok(SelectionMode::None),
            other => Err(SonarError::InvalidData(format!(
                "invalid portfolio project selection mode '{other}'"
            ))),
        }
    }
}

/// Selection mode with its payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    /// Project key to branches (comma separated), or [`DEFAULT_BRANCH`].
    Manual(BTreeMap<String, String>),
    Regexp {
        regexp: String,
        branch: Option<String>,
    },
    Tags {
        tags: Vec<String>,
        branch: Option<String>,
    },
    /// Projects not selected by any other portfolio.
    Rest { branch: Option<String> },
    #[default]
    None,
}

impl Selection {
    pub fn mode(&self) -> SelectionMode {
        match self {
            Selection::Manual(_) => SelectionMode::Manual,
            Selection::Regexp { .. } => SelectionMode::Regexp,
            Selection::Tags { .. } => SelectionMode::Tags,
            Selection::Rest { .. } => SelectionMode::Rest,
            Selection::None => SelectionMode::None,
        }
    }

    pub fn branch(&self) -> Option<&str> {
        match self {
            Selection::Regexp { branch, .. } | Selection::Tags { branch, .. } | Selection::Rest { branch } => {
                branch.as_deref()
            }
            _ => None,
        }
    }

    fn build(mode: SelectionMode, fields: &Value, projects: Option<&Value>) -> Self {
        let branch = str_field(fields, "branch").map(String::from);
        match mode {
            SelectionMode::Manual => Selection::Manual(projects.map(decode_projects).unwrap_or_default()),
            SelectionMode::Regexp => Selection::Regexp {
                regexp: str_field(fields, "regexp").unwrap_or_default().to_string(),
                branch,
            },
            SelectionMode::Tags => Selection::Tags {
                tags: fields.get("tags").map(value_to_list).unwrap_or_default(),
                branch,
            },
            SelectionMode::Rest => Selection::Rest { branch },
            SelectionMode::None => Selection::None,
        }
    }

    /// Decode the selection of a configuration document.
    ///
    /// A missing mode means [`Selection::None`].
    pub fn from_doc(doc: &Value) -> Result<Self> {
        match doc.get(SELECTION_MODE) {
            None | Some(Value::Null) => Ok(Selection::None),
            Some(Value::String(mode)) => {
                let mut flat = Map::new();
                for (from, to) in [(SELECTION_BRANCH, "branch"), (SELECTION_REGEXP, "regexp"), (SELECTION_TAGS, "tags")] {
                    if let Some(v) = doc.get(from) {
                        flat.insert(to.to_string(), v.clone());
                    }
                }
                Ok(Self::build(mode.parse()?, &Value::Object(flat), doc.get(PROJECTS)))
            }
            Some(obj @ Value::Object(_)) => {
                let mode = str_field(obj, "mode")
                    .ok_or_else(|| SonarError::InvalidData("portfolio selection has no mode".to_string()))?;
                Ok(Self::build(mode.parse()?, obj, obj.get(PROJECTS)))
            }
            Some(other) => Err(SonarError::InvalidData(format!(
                "invalid portfolio project selection {other}"
            ))),
        }
    }

    /// Decode the selection of a `views/show` snapshot.
    ///
    /// Before 9.3 manual selections list project keys only.
    pub fn from_snapshot(data: &Map<String, Value>, version: Version) -> Self {
        let Some(mode) = data.get("selectionMode").and_then(Value::as_str) else {
            return Selection::None;
        };
        let Ok(mode) = mode.parse::<SelectionMode>() else {
            tracing::warn!("Unknown portfolio selection mode '{}', ignored", mode);
            return Selection::None;
        };
        let fields = Value::Object(data.clone());
        if mode != SelectionMode::Manual {
            return Self::build(mode, &fields, None);
        }
        let mut projects = BTreeMap::new();
        if version >= Version::new(9, 3, 0) {
            for p in data.get("selectedProjects").and_then(Value::as_array).into_iter().flatten() {
                let Some(key) = str_field(p, "projectKey") else {
                    continue;
                };
                let branches = p.get("selectedBranches").map(value_to_list).unwrap_or_default();
                let branches = if branches.is_empty() {
                    DEFAULT_BRANCH.to_string()
                } else {
                    list_to_csv(&branches, ", ")
                };
                projects.insert(key.to_string(), branches);
            }
        } else {
            for key in data.get(PROJECTS).map(value_to_list).unwrap_or_default() {
                projects.insert(key, DEFAULT_BRANCH.to_string());
            }
        }
        Selection::Manual(projects)
    }

    /// Flat document keys, as written in exports.
    pub fn to_export(&self) -> Map<String, Value> {
        let mut json = Map::new();
        json.insert(SELECTION_MODE.to_string(), Value::String(self.mode().to_string()));
        match self {
            Selection::Manual(projects) if !projects.is_empty() => {
                let projects = projects
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                json.insert(PROJECTS.to_string(), Value::Object(projects));
            }
            Selection::Regexp { regexp, .. } => {
                json.insert(SELECTION_REGEXP.to_string(), Value::String(regexp.clone()));
            }
            Selection::Tags { tags, .. } => {
                json.insert(SELECTION_TAGS.to_string(), Value::String(list_to_csv(tags, ", ")));
            }
            _ => {}
        }
        if let Some(branch) = self.branch() {
            json.insert(SELECTION_BRANCH.to_string(), Value::String(branch.to_string()));
        }
        json
    }
}

/// Projects as `key -> branches`, from a map or a plain list of keys.
fn decode_projects(value: &Value) -> BTreeMap<String, String> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let branch = match v.as_str() {
                    Some(b) if !b.is_empty() => b.to_string(),
                    _ => DEFAULT_BRANCH.to_string(),
                };
                (k.clone(), branch)
            })
            .collect(),
        other => value_to_list(other)
            .into_iter()
            .map(|k| (k, DEFAULT_BRANCH.to_string()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_and_structured_encodings_agree() {
        let legacy = json!({
            "projectSelectionMode": "TAGS",
            "projectSelectionTags": "back, front",
            "projectSelectionBranch": "develop"
        });
        let structured = json!({
            "projectSelectionMode": {"mode": "TAGS", "tags": ["back", "front"], "branch": "develop"}
        });
        let expected = Selection::Tags {
            tags: vec!["back".to_string(), "front".to_string()],
            branch: Some("develop".to_string()),
        };
        assert_eq!(Selection::from_doc(&legacy).unwrap(), expected);
        assert_eq!(Selection::from_doc(&structured).unwrap(), expected);
    }

    #[test]
    fn test_missing_mode_is_none() {
        assert_eq!(Selection::from_doc(&json!({"name": "x"})).unwrap(), Selection::None);
    }

    #[test]
    fn test_invalid_mode_is_rejected() {
        assert!(Selection::from_doc(&json!({"projectSelectionMode": "ALL"})).is_err());
    }

    #[test]
    fn test_manual_projects_default_branch() {
        let doc = json!({"projectSelectionMode": "MANUAL", "projects": {"p1": "", "p2": "dev"}});
        let Selection::Manual(projects) = Selection::from_doc(&doc).unwrap() else {
            panic!("expected manual selection");
        };
        assert_eq!(projects["p1"], DEFAULT_BRANCH);
        assert_eq!(projects["p2"], "dev");
    }

    #[test]
    fn test_snapshot_selected_branches() {
        let data = json!({
            "selectionMode": "MANUAL",
            "selectedProjects": [
                {"projectKey": "a"},
                {"projectKey": "b", "selectedBranches": ["main", "dev"]}
            ]
        });
        let sel = Selection::from_snapshot(data.as_object().unwrap(), Version::new(9, 9, 0));
        let Selection::Manual(projects) = sel else {
            panic!("expected manual selection");
        };
        assert_eq!(projects["a"], DEFAULT_BRANCH);
        assert_eq!(projects["b"], "main, dev");
    }

    #[test]
    fn test_export_only_carries_current_mode_payload() {
        let exported = Selection::Regexp {
            regexp: "^team-.*".to_string(),
            branch: None,
        }
        .to_export();
        assert_eq!(exported, json!({"projectSelectionMode": "REGEXP", "projectSelectionRegexp": "^team-.*"}).as_object().unwrap().clone());
        let back = Selection::from_doc(&Value::Object(exported)).unwrap();
        assert_eq!(back.mode(), SelectionMode::Regexp);
    }
}
