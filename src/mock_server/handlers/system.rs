//! Platform wide endpoints: server info, settings, new code period,
//! webhooks, permissions and DevOps platforms.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Form,
};
use serde_json::{json, Map, Value};

use super::{bad_request, missing, no_content, not_found, ok, paged, param, param_all, Params, SharedState};
use crate::mock_server::state::{MockPermissions, MockState, MockTemplate, MockWebhook, GLOBAL_SCOPE};

/// Settings the platform defines even when they have no value.
const DEFINITIONS: [&str; 6] = [
    "sonar.core.serverBaseURL",
    "sonar.forceAuthentication",
    "sonar.dbcleaner.daysBeforeDeletingClosedIssues",
    "sonar.technicalDebt.ratingGrid",
    "sonar.cpd.cross_project",
    "sonar.exclusions",
];

// =========================================================================
// Server
// =========================================================================

/// GET /api/server/version
pub async fn server_version(State(state): State<SharedState>) -> impl IntoResponse {
    state.read().await.version.clone()
}

/// GET /api/system/info
pub async fn system_info(State(state): State<SharedState>) -> Response {
    let state = state.read().await;
    ok(json!({
        "System": {
            "Server ID": state.server_id,
            "Version": state.version,
            "Edition": capitalize(&state.edition),
        },
        "Statistics": {
            "edition": state.edition,
            "plugins": [],
            "database": {"name": "PostgreSQL", "version": "15.4"},
        },
    }))
}

/// GET /api/system/status
pub async fn system_status(State(state): State<SharedState>) -> Response {
    let state = state.read().await;
    ok(json!({"id": state.server_id, "version": state.version, "status": "UP"}))
}

/// GET /api/authentication/validate
pub async fn validate_credentials(State(state): State<SharedState>) -> Response {
    ok(json!({"valid": state.read().await.default_admin_password}))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// =========================================================================
// Settings
// =========================================================================

fn setting_json(key: &str, value: &Value, inherited: bool) -> Value {
    let mut json = Map::new();
    json.insert("key".to_string(), Value::String(key.to_string()));
    match value {
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
            json.insert("fieldValues".to_string(), value.clone());
        }
        Value::Array(_) => {
            json.insert("values".to_string(), value.clone());
        }
        Value::String(s) => {
            json.insert("value".to_string(), Value::String(s.clone()));
        }
        other => {
            json.insert("value".to_string(), Value::String(other.to_string()));
        }
    }
    json.insert("inherited".to_string(), Value::Bool(inherited));
    Value::Object(json)
}

/// GET /api/settings/values
pub async fn settings_values(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let state = state.read().await;
    let keys: Option<Vec<&str>> = param(&params, "keys").map(|k| k.split(',').map(str::trim).collect());
    let wanted = |key: &str| keys.as_ref().map_or(true, |k| k.contains(&key));

    let mut settings = Vec::new();
    match param(&params, "component") {
        Some(component) => {
            let Some(project) = state.get_project(component) else {
                return not_found(format!("Component key '{component}' not found"));
            };
            for (key, value) in project.settings.iter().filter(|(k, _)| wanted(k.as_str())) {
                settings.push(setting_json(key, value, false));
            }
            for (key, value) in state.settings.iter().filter(|(k, _)| wanted(k.as_str())) {
                if !project.settings.contains_key(key) {
                    settings.push(setting_json(key, value, true));
                }
            }
        }
        None => {
            for (key, value) in state.settings.iter().filter(|(k, _)| wanted(k.as_str())) {
                settings.push(setting_json(key, value, false));
            }
        }
    }
    ok(json!({"settings": settings}))
}

/// GET /api/settings/list_definitions
pub async fn settings_definitions(State(state): State<SharedState>) -> Response {
    let state = state.read().await;
    let mut keys: Vec<&str> = DEFINITIONS.to_vec();
    for key in state.settings.keys() {
        if !keys.contains(&key.as_str()) {
            keys.push(key);
        }
    }
    let definitions: Vec<Value> = keys.into_iter().map(|k| json!({"key": k})).collect();
    ok(json!({"definitions": definitions}))
}

/// Settings map a request targets, global or of the `component` project.
fn settings_target<'a>(
    state: &'a mut MockState,
    params: &Params,
) -> Result<&'a mut BTreeMap<String, Value>, Response> {
    match param(params, "component") {
        Some(component) => state
            .projects
            .get_mut(component)
            .map(|p| &mut p.settings)
            .ok_or_else(|| not_found(format!("Component key '{component}' not found"))),
        None => Ok(&mut state.settings),
    }
}

/// POST /api/settings/set
pub async fn settings_set(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let Some(key) = param(&params, "key") else {
        return missing("key");
    };
    let field_values = param_all(&params, "fieldValues");
    let values = param_all(&params, "values");
    let value = if !field_values.is_empty() {
        let mut parsed = Vec::new();
        for raw in field_values {
            match serde_json::from_str::<Value>(raw) {
                Ok(v) => parsed.push(v),
                Err(_) => return bad_request(format!("Invalid field values for setting '{key}'")),
            }
        }
        Value::Array(parsed)
    } else if !values.is_empty() {
        Value::Array(values.into_iter().map(|v| Value::String(v.to_string())).collect())
    } else if let Some(v) = param(&params, "value") {
        Value::String(v.to_string())
    } else {
        return bad_request("Either 'value', 'values' or 'fieldValues' must be provided");
    };

    let mut state = state.write().await;
    match settings_target(&mut state, &params) {
        Ok(target) => {
            target.insert(key.to_string(), value);
            no_content()
        }
        Err(response) => response,
    }
}

/// POST /api/settings/reset
pub async fn settings_reset(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let Some(keys) = param(&params, "keys") else {
        return missing("keys");
    };
    let keys: Vec<String> = keys.split(',').map(|k| k.trim().to_string()).collect();
    let mut state = state.write().await;
    match settings_target(&mut state, &params) {
        Ok(target) => {
            for key in &keys {
                target.remove(key);
            }
            no_content()
        }
        Err(response) => response,
    }
}

/// GET /api/new_code_periods/show
pub async fn new_code_show(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let state = state.read().await;
    let (global_type, global_value) = &state.new_code;
    match param(&params, "project") {
        Some(key) => {
            let Some(project) = state.get_project(key) else {
                return not_found(format!("Project '{key}' not found"));
            };
            match &project.new_code {
                Some((t, v)) => ok(json!({"projectKey": key, "type": t, "value": v, "inherited": false})),
                None => ok(json!({"projectKey": key, "type": global_type, "value": global_value, "inherited": true})),
            }
        }
        None => ok(json!({"type": global_type, "value": global_value, "inherited": false})),
    }
}

/// POST /api/new_code_periods/set
pub async fn new_code_set(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let Some(period_type) = param(&params, "type") else {
        return missing("type");
    };
    let period = (period_type.to_uppercase(), param(&params, "value").map(String::from));
    let mut state = state.write().await;
    match param(&params, "project") {
        Some(key) => match state.projects.get_mut(key) {
            Some(project) => project.new_code = Some(period),
            None => return not_found(format!("Project '{key}' not found")),
        },
        None => state.new_code = period,
    }
    no_content()
}

// =========================================================================
// Webhooks
// =========================================================================

fn webhook_json(hook: &MockWebhook) -> Value {
    json!({"key": hook.key, "name": hook.name, "url": hook.url})
}

/// GET /api/webhooks/list
pub async fn webhooks_list(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let state = state.read().await;
    let project = param(&params, "project");
    let hooks: Vec<Value> = state
        .webhooks
        .iter()
        .filter(|h| h.project.as_deref() == project)
        .map(webhook_json)
        .collect();
    ok(json!({"webhooks": hooks}))
}

/// POST /api/webhooks/create
pub async fn webhooks_create(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let (Some(name), Some(url)) = (param(&params, "name"), param(&params, "url")) else {
        return missing("name");
    };
    let mut state = state.write().await;
    let project = param(&params, "project").map(String::from);
    if let Some(key) = &project {
        if !state.projects.contains_key(key) {
            return not_found(format!("Project '{key}' not found"));
        }
    }
    let hook = MockWebhook {
        key: state.next_id("WH"),
        name: name.to_string(),
        url: url.to_string(),
        project,
    };
    let body = json!({"webhook": webhook_json(&hook)});
    state.webhooks.push(hook);
    ok(body)
}

/// POST /api/webhooks/update
pub async fn webhooks_update(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let Some(key) = param(&params, "webhook") else {
        return missing("webhook");
    };
    let mut state = state.write().await;
    let Some(hook) = state.webhooks.iter_mut().find(|h| h.key == key) else {
        return not_found(format!("No webhook with key '{key}'"));
    };
    if let Some(name) = param(&params, "name") {
        hook.name = name.to_string();
    }
    if let Some(url) = param(&params, "url") {
        hook.url = url.to_string();
    }
    no_content()
}

// =========================================================================
// Permissions
// =========================================================================

/// Scope key of a permission request, checking that the scope exists.
fn permission_scope(state: &MockState, params: &Params) -> Result<String, Response> {
    if let Some(id) = param(params, "templateId") {
        return if state.templates.iter().any(|t| t.id == id) {
            Ok(id.to_string())
        } else {
            Err(not_found(format!("Permission template with id '{id}' is not found")))
        };
    }
    match param(params, "projectKey") {
        Some(key) if state.projects.contains_key(key) || state.portfolios.contains_key(key) => Ok(key.to_string()),
        Some(key) => Err(not_found(format!("Project key '{key}' not found"))),
        None => Ok(GLOBAL_SCOPE.to_string()),
    }
}

fn principals_page(
    entries: &BTreeMap<String, std::collections::BTreeSet<String>>,
    name_field: &str,
    list_field: &str,
    params: &Params,
) -> Value {
    let all: Vec<Value> = entries
        .iter()
        .map(|(name, perms)| json!({name_field: name, "permissions": perms}))
        .collect();
    let (items, paging) = paged(&all, params);
    json!({list_field: items, "paging": paging})
}

/// GET /api/permissions/users and /api/permissions/template_users
pub async fn permission_users(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let state = state.read().await;
    let scope = match permission_scope(&state, &params) {
        Ok(scope) => scope,
        Err(response) => return response,
    };
    let perms = state.permissions.get(&scope).cloned().unwrap_or_default();
    ok(principals_page(&perms.users, "login", "users", &params))
}

/// GET /api/permissions/groups and /api/permissions/template_groups
pub async fn permission_groups(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let state = state.read().await;
    let scope = match permission_scope(&state, &params) {
        Ok(scope) => scope,
        Err(response) => return response,
    };
    let perms = state.permissions.get(&scope).cloned().unwrap_or_default();
    ok(principals_page(&perms.groups, "name", "groups", &params))
}

/// POST /api/permissions/{add,remove}_{user,group}[_to_template|_from_template]
pub async fn permission_change(
    State(state): State<SharedState>,
    Path(action): Path<String>,
    Form(params): Form<Params>,
) -> Response {
    let add = action.starts_with("add_");
    let (principal, name_param) = if action.contains("_user") {
        ("user", "login")
    } else if action.contains("_group") {
        ("group", "groupName")
    } else {
        return not_found(format!("Unknown url: /api/permissions/{action}"));
    };
    let (Some(name), Some(permission)) = (param(&params, name_param), param(&params, "permission")) else {
        return missing(name_param);
    };
    let mut state = state.write().await;
    let scope = match permission_scope(&state, &params) {
        Ok(scope) => scope,
        Err(response) => return response,
    };
    let perms: &mut MockPermissions = state.permissions.entry(scope).or_default();
    let entries = if principal == "user" { &mut perms.users } else { &mut perms.groups };
    if add {
        entries.entry(name.to_string()).or_default().insert(permission.to_string());
    } else if let Some(set) = entries.get_mut(name) {
        set.remove(permission);
        if set.is_empty() {
            entries.remove(name);
        }
    }
    no_content()
}

fn template_json(t: &MockTemplate) -> Value {
    json!({
        "id": t.id,
        "name": t.name,
        "description": t.description,
        "projectKeyPattern": t.pattern,
    })
}

/// GET /api/permissions/search_templates
pub async fn search_templates(State(state): State<SharedState>) -> Response {
    let state = state.read().await;
    let templates: Vec<Value> = state.templates.iter().map(template_json).collect();
    let defaults: Vec<Value> = state
        .default_templates
        .iter()
        .map(|(qualifier, id)| json!({"templateId": id, "qualifier": qualifier}))
        .collect();
    ok(json!({"permissionTemplates": templates, "defaultTemplates": defaults}))
}

/// POST /api/permissions/create_template
pub async fn create_template(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let Some(name) = param(&params, "name") else {
        return missing("name");
    };
    let mut state = state.write().await;
    if state.templates.iter().any(|t| t.name == name) {
        return bad_request(format!("A template with the name '{name}' already exists (case insensitive)."));
    }
    let template = MockTemplate {
        id: state.next_id("TPL"),
        name: name.to_string(),
        description: param(&params, "description").map(String::from),
        pattern: param(&params, "projectKeyPattern").map(String::from),
    };
    let body = json!({"permissionTemplate": template_json(&template)});
    state.templates.push(template);
    ok(body)
}

/// POST /api/permissions/update_template
pub async fn update_template(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let Some(id) = param(&params, "id") else {
        return missing("id");
    };
    let mut state = state.write().await;
    let Some(template) = state.templates.iter_mut().find(|t| t.id == id) else {
        return not_found(format!("Permission template with id '{id}' is not found"));
    };
    if let Some(name) = param(&params, "name") {
        template.name = name.to_string();
    }
    if let Some(d) = param(&params, "description") {
        template.description = Some(d.to_string());
    }
    if let Some(p) = param(&params, "projectKeyPattern") {
        template.pattern = Some(p.to_string());
    }
    let body = json!({"permissionTemplate": template_json(template)});
    ok(body)
}

/// POST /api/permissions/set_default_template
pub async fn set_default_template(State(state): State<SharedState>, Form(params): Form<Params>) -> Response {
    let (Some(id), Some(qualifier)) = (param(&params, "templateId"), param(&params, "qualifier")) else {
        return missing("templateId");
    };
    let mut state = state.write().await;
    if !state.templates.iter().any(|t| t.id == id) {
        return not_found(format!("Permission template with id '{id}' is not found"));
    }
    state.default_templates.insert(qualifier.to_string(), id.to_string());
    no_content()
}

// =========================================================================
// DevOps platforms
// =========================================================================

/// GET /api/alm_settings/list_definitions
pub async fn alm_definitions(State(state): State<SharedState>) -> Response {
    let state = state.read().await;
    ok(json!(state.devops_platforms))
}

/// GET /api/alm_settings/get_binding
pub async fn alm_get_binding(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let Some(key) = param(&params, "project") else {
        return missing("project");
    };
    let state = state.read().await;
    match state.get_project(key) {
        Some(project) => match &project.binding {
            Some(binding) => ok(binding.clone()),
            None => not_found(format!("Project '{key}' is not bound to any DevOps Platform")),
        },
        None => not_found(format!("Project '{key}' not found")),
    }
}

/// GET /api/alm_settings/validate_binding
pub async fn alm_validate_binding(State(state): State<SharedState>, Query(params): Query<Params>) -> Response {
    let Some(key) = param(&params, "project") else {
        return missing("project");
    };
    let state = state.read().await;
    match state.get_project(key) {
        Some(p) if p.binding.is_some() && p.binding_valid => StatusCode::NO_CONTENT.into_response(),
        Some(_) => bad_request(format!("Binding of project '{key}' is invalid")),
        None => not_found(format!("Project '{key}' not found")),
    }
}

/// POST /api/alm_settings/create_{alm} and /api/alm_settings/set_{alm}_binding
pub async fn alm_action(
    State(state): State<SharedState>,
    Path(action): Path<String>,
    Form(params): Form<Params>,
) -> Response {
    let mut state = state.write().await;
    if let Some(alm) = action.strip_prefix("create_") {
        let Some(key) = param(&params, "key") else {
            return missing("key");
        };
        let exists = state
            .devops_platforms
            .values()
            .flatten()
            .any(|d| d.get("key").and_then(Value::as_str) == Some(key));
        if exists {
            return bad_request(format!("An DevOps Platform setting with key '{key}' already exists"));
        }
        let definition: Map<String, Value> = params
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "clientSecret" | "privateKey" | "personalAccessToken"))
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        state
            .devops_platforms
            .entry(alm.to_string())
            .or_default()
            .push(Value::Object(definition));
        return no_content();
    }

    let Some(alm) = action.strip_prefix("set_").and_then(|a| a.strip_suffix("_binding")) else {
        return not_found(format!("Unknown url: /api/alm_settings/{action}"));
    };
    let (Some(alm_key), Some(project_key)) = (param(&params, "almSetting"), param(&params, "project")) else {
        return missing("almSetting");
    };
    let Some(definition) = state
        .devops_platforms
        .get(alm)
        .into_iter()
        .flatten()
        .find(|d| d.get("key").and_then(Value::as_str) == Some(alm_key))
        .cloned()
    else {
        return not_found(format!("DevOps Platform setting with key '{alm_key}' cannot be found"));
    };
    let (repository, slug) = if alm == "azure" {
        (param(&params, "repositoryName"), param(&params, "projectName"))
    } else {
        (param(&params, "repository"), param(&params, "slug"))
    };
    let mut binding = json!({
        "key": alm_key,
        "alm": alm,
        "repository": repository,
        "url": definition.get("url"),
        "monorepo": param(&params, "monorepo") == Some("true"),
    });
    if let Some(slug) = slug {
        binding["slug"] = json!(slug);
    }
    if let Some(summary) = param(&params, "summaryCommentEnabled") {
        binding["summaryCommentEnabled"] = json!(summary == "true");
    }
    match state.projects.get_mut(project_key) {
        Some(project) => {
            project.binding = Some(binding);
            no_content()
        }
        None => not_found(format!("Project '{project_key}' not found")),
    }
}
