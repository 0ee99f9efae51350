//! Portfolio endpoint handlers (`api/views/...`).

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    response::Response,
    Form,
};
use serde_json::{json, Map, Value};

use super::{bad_request, missing, no_content, not_found, ok, paged, param, Params, SharedState};
use crate::mock_server::state::{MockPortfolio, MockSelection, MockState};

fn portfolio_not_found(key: &str) -> Response {
    not_found(format!("Portfolio '{key}' not found"))
}

/// Whether the platform lists branches in manual selections (9.3+).
fn has_selected_branches(version: &str) -> bool {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    (major, minor) >= (9, 3)
}

fn search_json(p: &MockPortfolio) -> Value {
    let mut json = json!({
        "key": p.key,
        "name": p.name,
        "qualifier": p.qualifier(),
        "visibility": p.visibility,
    });
    if let Some(desc) = &p.description {
        json["desc"] = json!(desc);
    }
    json
}

/// `views/show` snapshot of a portfolio and its whole subtree.
fn show_json(state: &MockState, p: &MockPortfolio) -> Value {
    let mut json = Map::new();
    json.insert("key".to_string(), json!(p.key));
    json.insert("name".to_string(), json!(p.name));
    json.insert("qualifier".to_string(), json!(p.qualifier()));
    if let Some(desc) = &p.description {
        json.insert("desc".to_string(), json!(desc));
    }
    if p.parent.is_none() {
        json.insert("visibility".to_string(), json!(p.visibility));
    }
    json.insert("selectionMode".to_string(), json!(p.selection.mode()));
    match &p.selection {
        MockSelection::Manual(projects) => {
            if has_selected_branches(&state.version) {
                let selected: Vec<Value> = projects
                    .iter()
                    .map(|(key, branches)| {
                        if branches.is_empty() {
                            json!({"projectKey": key})
                        } else {
                            json!({"projectKey": key, "selectedBranches": branches})
                        }
                    })
                    .collect();
                json.insert("selectedProjects".to_string(), Value::Array(selected));
            } else {
                json.insert("projects".to_string(), json!(projects.keys().collect::<Vec<_>>()));
            }
        }
        MockSelection::Regexp { regexp, branch } => {
            json.insert("regexp".to_string(), json!(regexp));
            if let Some(b) = branch {
                json.insert("branch".to_string(), json!(b));
            }
        }
        MockSelection::Tags { tags, branch } => {
            json.insert("tags".to_string(), json!(tags));
            if let Some(b) = branch {
                json.insert("branch".to_string(), json!(b));
            }
        }
        MockSelection::Rest { branch } => {
            if let Some(b) = branch {
                json.insert("branch".to_string(), json!(b));
            }
        }
        MockSelection::None => {}
    }

    let mut sub_views: Vec<Value> = state.children(&p.key).into_iter().map(|c| show_json(state, c)).collect();
    for reference in &p.references {
        let name = state.get_portfolio(reference).map(|r| r.name.clone()).unwrap_or_default();
        sub_views.push(json!({
            "key": format!("{}:{}", p.key, reference),
            "originalKey": reference,
            "name": name,
            "qualifier": "VW",
        }));
    }
    json.insert("subViews".to_string(), Value::Array(sub_views));
    Value::Object(json)
}

/// GET /api/views/search
pub async fn views_search(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let state = state.read().await;
    let q = param(&params, "q").map(str::to_lowercase);
    let matching: Vec<Value> = state
        .portfolios
        .values()
        .filter(|p| {
            q.as_ref().map_or(true, |q| {
                p.key.to_lowercase().contains(q) || p.name.to_lowercase().contains(q)
            })
        })
        .map(search_json)
        .collect();
    let (components, paging) = paged(&matching, &params);
    ok(json!({"paging": paging, "components": components}))
}

/// GET /api/views/show
pub async fn views_show(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let Some(key) = param(&params, "key") else {
        return missing("key");
    };
    let state = state.read().await;
    match state.get_portfolio(key) {
        Some(p) => ok(show_json(&state, p)),
        None => portfolio_not_found(key),
    }
}

/// POST /api/views/create
pub async fn views_create(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let (Some(key), Some(name)) = (param(&params, "key"), param(&params, "name")) else {
        return missing("name");
    };
    let mut state = state.write().await;
    if state.portfolios.contains_key(key) || state.projects.contains_key(key) {
        return bad_request(format!("Could not create Portfolio with key: \"{key}\". A similar key already exists"));
    }
    let parent = param(&params, "parent").map(String::from);
    if let Some(parent) = &parent {
        if !state.portfolios.contains_key(parent) {
            return portfolio_not_found(parent);
        }
    }
    let mut portfolio = MockPortfolio::new(key, name);
    portfolio.description = param(&params, "description").map(String::from);
    if let Some(visibility) = param(&params, "visibility") {
        portfolio.visibility = visibility.to_string();
    }
    portfolio.parent = parent;
    let body = json!({"key": key, "name": name, "qualifier": portfolio.qualifier()});
    state.portfolios.insert(key.to_string(), portfolio);
    ok(body)
}

/// POST /api/views/delete
pub async fn views_delete(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let Some(key) = param(&params, "key") else {
        return missing("key");
    };
    if state.write().await.remove_portfolio(key) {
        no_content()
    } else {
        portfolio_not_found(key)
    }
}

/// POST /api/views/refresh
pub async fn views_refresh() -> Response {
    no_content()
}

/// Selection described by a mode change request.
fn requested_selection(
    mode: &str,
    params: &Params,
    current: &MockSelection,
) -> Result<MockSelection, Response> {
    let branch = param(params, "branch").map(String::from);
    match mode {
        "manual" | "MANUAL" => Ok(match current {
            MockSelection::Manual(projects) => MockSelection::Manual(projects.clone()),
            _ => MockSelection::Manual(BTreeMap::new()),
        }),
        "tags" | "TAGS" => {
            let tags: Vec<String> = param(params, "tags")
                .unwrap_or_default()
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            if tags.is_empty() {
                return Err(missing("tags"));
            }
            Ok(MockSelection::Tags { tags, branch })
        }
        "regexp" | "REGEXP" => match param(params, "regexp") {
            Some(re) if regex::Regex::new(re).is_ok() => Ok(MockSelection::Regexp {
                regexp: re.to_string(),
                branch,
            }),
            Some(re) => Err(bad_request(format!("Invalid regular expression '{re}'"))),
            None => Err(missing("regexp")),
        },
        "remaining_projects" | "REST" => Ok(MockSelection::Rest { branch }),
        "none" | "NONE" => Ok(MockSelection::None),
        other => Err(bad_request(format!("Unknown selection mode '{other}'"))),
    }
}

async fn change_mode(state: SharedState, key: Option<&str>, mode: &str, params: &Params) -> Response {
    let Some(key) = key else {
        return missing("portfolio");
    };
    let mut state = state.write().await;
    let Some(portfolio) = state.portfolios.get_mut(key) else {
        return portfolio_not_found(key);
    };
    match requested_selection(mode, params, &portfolio.selection) {
        Ok(selection) => {
            portfolio.selection = selection;
            no_content()
        }
        Err(response) => response,
    }
}

/// POST /api/views/set_{manual,tags,regexp,remaining_projects,none}_mode
pub async fn views_set_mode(
    State(state): State<SharedState>,
    Path(action): Path<String>,
    Form(params): Form<Params>,
) -> Response {
    let Some(mode) = action.strip_prefix("set_").and_then(|a| a.strip_suffix("_mode")) else {
        return not_found(format!("Unknown url: /api/views/{action}"));
    };
    change_mode(state, param(&params, "portfolio"), mode, &params).await
}

/// POST /api/views/mode, the selection API before 9.1
pub async fn views_mode(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let Some(mode) = param(&params, "selectionMode") else {
        return missing("selectionMode");
    };
    change_mode(state, param(&params, "key"), mode, &params).await
}

/// POST /api/views/add_project and /api/views/add_project_branch
pub async fn views_add_project(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let (Some(key), Some(project)) = (param(&params, "key"), param(&params, "project")) else {
        return missing("project");
    };
    let branch = param(&params, "branch");
    let mut state = state.write().await;
    match state.get_project(project) {
        None => return not_found(format!("Project '{project}' not found")),
        Some(p) => {
            if branch.is_some_and(|b| !p.branches.iter().any(|pb| pb.name == b)) {
                return not_found(format!("Branch '{}' of project '{project}' not found", branch.unwrap_or_default()));
            }
        }
    }
    let Some(portfolio) = state.portfolios.get_mut(key) else {
        return portfolio_not_found(key);
    };
    let MockSelection::Manual(projects) = &mut portfolio.selection else {
        return bad_request(format!("Portfolio '{key}' is not in manual selection mode"));
    };
    let branches = projects.entry(project.to_string()).or_default();
    if let Some(b) = branch {
        if !branches.iter().any(|existing| existing == b) {
            branches.push(b.to_string());
        }
    }
    no_content()
}

fn add_reference(state: &mut MockState, key: Option<&str>, reference: Option<&str>) -> Response {
    let (Some(key), Some(reference)) = (key, reference) else {
        return missing("reference");
    };
    match state.get_portfolio(reference) {
        Some(r) if r.parent.is_none() => {}
        Some(_) => return bad_request(format!("Portfolio '{reference}' is not a top level portfolio")),
        None => return portfolio_not_found(reference),
    }
    if key == reference {
        return bad_request(format!("Portfolio '{key}' can't reference itself"));
    }
    let Some(portfolio) = state.portfolios.get_mut(key) else {
        return portfolio_not_found(key);
    };
    if !portfolio.references.iter().any(|r| r == reference) {
        portfolio.references.push(reference.to_string());
    }
    no_content()
}

/// POST /api/views/add_portfolio
pub async fn views_add_portfolio(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let mut state = state.write().await;
    add_reference(&mut state, param(&params, "portfolio"), param(&params, "reference"))
}

/// POST /api/views/add_local_view
pub async fn views_add_local_view(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let mut state = state.write().await;
    add_reference(&mut state, param(&params, "key"), param(&params, "ref_key"))
}

/// POST /api/views/add_sub_view
pub async fn views_add_sub_view(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let (Some(key), Some(name), Some(sub_key)) = (
        param(&params, "key"),
        param(&params, "name"),
        param(&params, "subKey"),
    ) else {
        return missing("subKey");
    };
    let mut state = state.write().await;
    if !state.portfolios.contains_key(key) {
        return portfolio_not_found(key);
    }
    if state.portfolios.contains_key(sub_key) {
        return bad_request(format!("A portfolio with key '{sub_key}' already exists"));
    }
    let mut sub = MockPortfolio::new(sub_key, name);
    sub.parent = Some(key.to_string());
    state.portfolios.insert(sub_key.to_string(), sub);
    no_content()
}
