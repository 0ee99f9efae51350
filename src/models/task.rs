//! Background (compute engine) tasks.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audit::{AuditSettings, Problem, RuleId};
use crate::error::Result;
use crate::platform::Platform;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Canceled,
    /// Not a platform status: the wait gave up before a terminal state.
    Timeout,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Canceled => "CANCELED",
            TaskStatus::Timeout => "TIMEOUT",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub warning_count: u32,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    task: Task,
}

#[derive(Debug, Deserialize)]
struct ComponentTasks {
    #[serde(default)]
    current: Option<Task>,
}

pub async fn get(platform: &Platform, id: &str) -> Result<Task> {
    let resp: TaskResponse = platform
        .client()
        .get_json("ce/task", &[("id", id), ("additionalFields", "warnings")])
        .await?;
    Ok(resp.task)
}

/// Poll a task until it reaches a terminal state.
///
/// Returns [`TaskStatus::Timeout`] rather than an error when `timeout`
/// elapses first.
#[tracing::instrument(skip(platform))]
pub async fn wait_for_completion(platform: &Platform, id: &str, timeout: Duration) -> Result<TaskStatus> {
    let poll = async {
        loop {
            let task = get(platform, id).await?;
            tracing::debug!("Task {} is {}", id, task.status);
            if task.status.is_terminal() {
                return Ok::<_, crate::error::SonarError>(task.status);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    };
    match tokio::time::timeout(timeout, poll).await {
        Ok(status) => status,
        Err(_) => {
            tracing::warn!("Task {} did not complete within {:?}", id, timeout);
            Ok(TaskStatus::Timeout)
        }
    }
}

/// Last completed background task of a component.
pub async fn last_task(platform: &Platform, component: &str) -> Result<Option<Task>> {
    let resp: ComponentTasks = platform
        .client()
        .get_json("ce/component", &[("component", component)])
        .await?;
    Ok(resp.current)
}

/// Audit the last background task of a component.
pub async fn audit_last_task(
    platform: &Platform,
    component: &str,
    object: &str,
    settings: &AuditSettings,
) -> Result<Vec<Problem>> {
    let Some(task) = last_task(platform, component).await? else {
        return Ok(Vec::new());
    };
    let mut problems = Vec::new();
    if task.status == TaskStatus::Failed {
        problems.push(Problem::from_rule(RuleId::BgTaskFailed, &[&object]).with_object(object));
    } else if settings.get_bool("audit.projects.analysisWarnings", true)
        && (task.warning_count > 0 || !task.warnings.is_empty())
    {
        problems.push(Problem::from_rule(RuleId::ProjAnalysisWarning, &[&object]).with_object(object));
    }
    Ok(problems)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        for s in [TaskStatus::Success, TaskStatus::Failed, TaskStatus::Canceled, TaskStatus::Timeout] {
            assert!(s.is_terminal());
        }
    }

    #[test]
    fn test_task_deserializes() {
        let t: Task = serde_json::from_str(r#"{"id":"AX1","status":"IN_PROGRESS"}"#).unwrap();
        assert_eq!(t.status, TaskStatus::InProgress);
        assert_eq!(t.warning_count, 0);
    }
}
