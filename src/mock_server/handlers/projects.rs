//! Project endpoint handlers: projects, branches, quality gates and
//! profiles, measures, background tasks and zip dumps.

use axum::{
    extract::{Query, State},
    response::Response,
    Form,
};
use serde_json::{json, Map, Value};

use super::{bad_request, missing, no_content, not_found, ok, paged, param, Params, SharedState};
use crate::mock_server::state::{MockLink, MockProject};

fn project_json(project: &MockProject) -> Value {
    let mut json = json!({
        "key": project.key,
        "name": project.name,
        "qualifier": "TRK",
        "visibility": project.visibility,
    });
    if let Some(date) = &project.last_analysis_date {
        json["lastAnalysisDate"] = json!(date);
    }
    json
}

fn project_not_found(key: &str) -> Response {
    not_found(format!("Project '{key}' not found"))
}

// =========================================================================
// Projects
// =========================================================================

/// GET /api/projects/search
pub async fn projects_search(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let state = state.read().await;
    let keys: Option<Vec<&str>> = param(&params, "projects").map(|p| p.split(',').map(str::trim).collect());
    let q = param(&params, "q").map(str::to_lowercase);
    let analyzed_before = param(&params, "analyzedBefore");

    let matching: Vec<Value> = state
        .projects
        .values()
        .filter(|p| keys.as_ref().map_or(true, |k| k.contains(&p.key.as_str())))
        .filter(|p| {
            q.as_ref().map_or(true, |q| {
                p.key.to_lowercase().contains(q) || p.name.to_lowercase().contains(q)
            })
        })
        .filter(|p| {
            analyzed_before.map_or(true, |before| {
                p.last_analysis_date.as_deref().is_some_and(|d| d < before)
            })
        })
        .map(project_json)
        .collect();
    let (components, paging) = paged(&matching, &params);
    ok(json!({"paging": paging, "components": components}))
}

/// POST /api/projects/create
pub async fn projects_create(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let (Some(key), Some(name)) = (param(&params, "project"), param(&params, "name")) else {
        return missing("project");
    };
    let mut state = state.write().await;
    if state.projects.contains_key(key) {
        return bad_request(format!("Could not create Project with key: \"{key}\". A similar key already exists: \"{key}\""));
    }
    let mut project = MockProject::new(key, name);
    if let Some(visibility) = param(&params, "visibility") {
        project.visibility = visibility.to_string();
    }
    let body = json!({"project": project_json(&project)});
    state.projects.insert(key.to_string(), project);
    ok(body)
}

/// POST /api/projects/delete
pub async fn projects_delete(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let Some(key) = param(&params, "project") else {
        return missing("project");
    };
    let mut state = state.write().await;
    if state.projects.remove(key).is_none() {
        return project_not_found(key);
    }
    state.permissions.remove(key);
    state.webhooks.retain(|h| h.project.as_deref() != Some(key));
    no_content()
}

/// POST /api/projects/update_visibility
pub async fn projects_update_visibility(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let (Some(key), Some(visibility)) = (param(&params, "project"), param(&params, "visibility")) else {
        return missing("visibility");
    };
    if !matches!(visibility, "public" | "private") {
        return bad_request(format!("Value of parameter 'visibility' ({visibility}) must be one of: [private, public]"));
    }
    let mut state = state.write().await;
    match state.projects.get_mut(key) {
        Some(project) => {
            project.visibility = visibility.to_string();
            no_content()
        }
        None => project_not_found(key),
    }
}

/// GET /api/components/show
pub async fn components_show(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let Some(key) = param(&params, "component") else {
        return missing("component");
    };
    let state = state.read().await;
    match state.get_project(key) {
        Some(project) => {
            let mut component = project_json(project);
            component["tags"] = json!(project.tags);
            ok(json!({"component": component}))
        }
        None => not_found(format!("Component key '{key}' not found")),
    }
}

/// POST /api/project_tags/set
pub async fn project_tags_set(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let Some(key) = param(&params, "project") else {
        return missing("project");
    };
    let tags: Vec<String> = param(&params, "tags")
        .unwrap_or_default()
        .split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    let mut state = state.write().await;
    match state.projects.get_mut(key) {
        Some(project) => {
            project.tags = tags;
            no_content()
        }
        None => project_not_found(key),
    }
}

/// GET /api/project_links/search
pub async fn project_links_search(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let Some(key) = param(&params, "projectKey") else {
        return missing("projectKey");
    };
    let state = state.read().await;
    let Some(project) = state.get_project(key) else {
        return project_not_found(key);
    };
    let links: Vec<Value> = project
        .links
        .iter()
        .map(|l| json!({"id": l.id, "type": l.link_type, "name": l.name, "url": l.url}))
        .collect();
    ok(json!({"links": links}))
}

/// POST /api/project_links/create
pub async fn project_links_create(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let (Some(key), Some(name), Some(url)) = (
        param(&params, "projectKey"),
        param(&params, "name"),
        param(&params, "url"),
    ) else {
        return missing("projectKey");
    };
    let mut state = state.write().await;
    let id = state.next_id("L");
    let Some(project) = state.projects.get_mut(key) else {
        return project_not_found(key);
    };
    let link = MockLink {
        id: id.clone(),
        link_type: "custom".to_string(),
        name: Some(name.to_string()),
        url: url.to_string(),
    };
    project.links.push(link);
    ok(json!({"link": {"id": id, "name": name, "url": url}}))
}

// =========================================================================
// Branches and pull requests
// =========================================================================

/// GET /api/project_branches/list
pub async fn branches_list(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let Some(key) = param(&params, "project") else {
        return missing("project");
    };
    let state = state.read().await;
    let Some(project) = state.get_project(key) else {
        return project_not_found(key);
    };
    let branches: Vec<Value> = project
        .branches
        .iter()
        .map(|b| {
            let mut json = json!({
                "name": b.name,
                "isMain": b.is_main,
                "type": "BRANCH",
                "excludedFromPurge": b.keep_when_inactive,
            });
            if let Some(date) = &b.analysis_date {
                json["analysisDate"] = json!(date);
            }
            json
        })
        .collect();
    ok(json!({"branches": branches}))
}

/// POST /api/project_branches/rename
pub async fn branches_rename(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let (Some(key), Some(name)) = (param(&params, "project"), param(&params, "name")) else {
        return missing("name");
    };
    let mut state = state.write().await;
    let Some(project) = state.projects.get_mut(key) else {
        return project_not_found(key);
    };
    if project.branches.iter().any(|b| !b.is_main && b.name == name) {
        return bad_request(format!("Impossible to update branch name: a branch with name \"{name}\" already exists"));
    }
    match project.branches.iter_mut().find(|b| b.is_main) {
        Some(main) => {
            main.name = name.to_string();
            no_content()
        }
        None => not_found(format!("Project '{key}' has no main branch")),
    }
}

/// GET /api/project_pull_requests/list
pub async fn pull_requests_list(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let Some(key) = param(&params, "project") else {
        return missing("project");
    };
    let state = state.read().await;
    if state.get_project(key).is_none() {
        return project_not_found(key);
    }
    ok(json!({"pullRequests": []}))
}

// =========================================================================
// Quality gates and profiles
// =========================================================================

/// GET /api/qualitygates/get_by_project
pub async fn gates_get_by_project(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let Some(key) = param(&params, "project") else {
        return missing("project");
    };
    let state = state.read().await;
    let Some(project) = state.get_project(key) else {
        return project_not_found(key);
    };
    let gate = match &project.quality_gate {
        Some(name) => json!({"name": name, "default": *name == state.default_gate}),
        None => json!({"name": state.default_gate, "default": true}),
    };
    ok(json!({"qualityGate": gate}))
}

/// GET /api/qualitygates/list
pub async fn gates_list(State(state): State<SharedState>) -> Response {
    let state = state.read().await;
    let gates: Vec<Value> = state
        .quality_gates
        .iter()
        .map(|name| json!({"name": name, "isDefault": *name == state.default_gate}))
        .collect();
    ok(json!({"qualitygates": gates}))
}

/// POST /api/qualitygates/select
pub async fn gates_select(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let (Some(gate), Some(key)) = (param(&params, "gateName"), param(&params, "projectKey")) else {
        return missing("gateName");
    };
    let mut state = state.write().await;
    if !state.quality_gates.iter().any(|g| g == gate) {
        return not_found(format!("No quality gate has been found for name {gate}"));
    }
    let is_default = gate == state.default_gate;
    match state.projects.get_mut(key) {
        Some(project) => {
            project.quality_gate = (!is_default).then(|| gate.to_string());
            no_content()
        }
        None => project_not_found(key),
    }
}

fn profile_json(language: &str, name: &str, is_default: bool) -> Value {
    json!({
        "key": format!("{language}-{}", name.to_lowercase().replace(' ', "-")),
        "name": name,
        "language": language,
        "isDefault": is_default,
    })
}

/// GET /api/qualityprofiles/search
///
/// With `project`, the profile each language applies to that project.
pub async fn profiles_search(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let state = state.read().await;
    let profiles: Vec<Value> = match param(&params, "project") {
        Some(key) => {
            let Some(project) = state.get_project(key) else {
                return project_not_found(key);
            };
            state
                .default_profiles
                .iter()
                .map(|(language, default)| {
                    let name = project.profiles.get(language).unwrap_or(default);
                    profile_json(language, name, name == default)
                })
                .collect()
        }
        None => state
            .quality_profiles
            .iter()
            .map(|(language, name)| {
                let is_default = state.default_profiles.get(language) == Some(name);
                profile_json(language, name, is_default)
            })
            .collect(),
    };
    ok(json!({"profiles": profiles}))
}

/// POST /api/qualityprofiles/add_project
pub async fn profiles_add_project(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let (Some(language), Some(profile), Some(key)) = (
        param(&params, "language"),
        param(&params, "qualityProfile"),
        param(&params, "project"),
    ) else {
        return missing("qualityProfile");
    };
    let mut state = state.write().await;
    if !state.quality_profiles.iter().any(|(l, n)| l == language && n == profile) {
        return not_found(format!("Quality Profile for language '{language}' and name '{profile}' does not exist"));
    }
    let is_default = state.default_profiles.get(language).map(String::as_str) == Some(profile);
    match state.projects.get_mut(key) {
        Some(project) => {
            if is_default {
                project.profiles.remove(language);
            } else {
                project.profiles.insert(language.to_string(), profile.to_string());
            }
            no_content()
        }
        None => project_not_found(key),
    }
}

// =========================================================================
// Measures
// =========================================================================

/// GET /api/measures/component
///
/// Knows `ncloc` and `ncloc_language_distribution` of projects, and
/// `projects` of portfolios.
pub async fn measures_component(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let Some(key) = param(&params, "component") else {
        return missing("component");
    };
    let metrics: Vec<&str> = param(&params, "metricKeys").unwrap_or_default().split(',').collect();
    let state = state.read().await;
    let mut measures = Vec::new();
    if let Some(project) = state.get_project(key) {
        if param(&params, "pullRequest").is_none() {
            let branch = param(&params, "branch");
            if branch.is_some_and(|b| !project.branches.iter().any(|pb| pb.name == b)) {
                return not_found(format!("Component '{key}' on branch '{}' not found", branch.unwrap_or_default()));
            }
            for metric in &metrics {
                match *metric {
                    "ncloc" => measures.push(json!({"metric": "ncloc", "value": project.ncloc(branch).to_string()})),
                    "ncloc_language_distribution" => {
                        if let Some(d) = &project.language_distribution {
                            measures.push(json!({"metric": metric, "value": d}));
                        }
                    }
                    _ => {}
                }
            }
        }
    } else if state.get_portfolio(key).is_some() {
        if metrics.contains(&"projects") {
            let count = state.portfolio_projects(key).len();
            measures.push(json!({"metric": "projects", "value": count.to_string()}));
        }
    } else {
        return not_found(format!("Component key '{key}' not found"));
    }
    ok(json!({"component": {"key": key, "measures": measures}}))
}

// =========================================================================
// Background tasks and dumps
// =========================================================================

fn task_json(id: &str, status: &str) -> Value {
    json!({"id": id, "status": status, "type": "REPORT"})
}

/// GET /api/ce/task
pub async fn ce_task(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let Some(id) = param(&params, "id") else {
        return missing("id");
    };
    let state = state.read().await;
    match state.tasks.get(id) {
        Some(status) => ok(json!({"task": task_json(id, status)})),
        None => not_found(format!("No activity found for task '{id}'")),
    }
}

/// GET /api/ce/component
pub async fn ce_component(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let Some(key) = param(&params, "component") else {
        return missing("component");
    };
    let state = state.read().await;
    let current = state
        .component_tasks
        .get(key)
        .and_then(|id| state.tasks.get(id).map(|status| task_json(id, status)));
    let mut body = Map::new();
    body.insert("queue".to_string(), json!([]));
    if let Some(task) = current {
        body.insert("current".to_string(), task);
    }
    ok(Value::Object(body))
}

/// POST /api/project_dump/export
pub async fn dump_export(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let Some(key) = param(&params, "key") else {
        return missing("key");
    };
    let mut state = state.write().await;
    if state.get_project(key).is_none() {
        return project_not_found(key);
    }
    let status = state.dump_task_status.clone();
    let task_id = state.add_task(key, &status);
    if status == "SUCCESS" {
        let path = format!("/opt/sonarqube/data/governance/project_dumps/export/{key}.zip");
        state.dumps.insert(key.to_string(), path);
    }
    ok(json!({"taskId": task_id, "projectKey": key}))
}

/// GET /api/project_dump/status
pub async fn dump_status(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let Some(key) = param(&params, "key") else {
        return missing("key");
    };
    let state = state.read().await;
    if state.get_project(key).is_none() {
        return project_not_found(key);
    }
    let mut body = json!({"canBeExported": true, "canBeImported": false});
    if let Some(path) = state.dumps.get(key) {
        body["exportedDump"] = json!(path);
    }
    ok(body)
}

/// POST /api/project_dump/import
pub async fn dump_import(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let Some(key) = param(&params, "key") else {
        return missing("key");
    };
    let mut state = state.write().await;
    if state.get_project(key).is_none() {
        return project_not_found(key);
    }
    if !state.dumps.contains_key(key) {
        return bad_request(format!("Dump file does not exist for project '{key}'"));
    }
    let task_id = state.add_task(key, "SUCCESS");
    ok(json!({"taskId": task_id}))
}
