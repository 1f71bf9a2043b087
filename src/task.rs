//! Task records and the rules for moving a task between statuses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    Accepted,
    Declined,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Statuses a task in `self` may move to. Staying put is always allowed
    /// and is not listed here.
    pub fn successors(self) -> &'static [TaskStatus] {
        use TaskStatus::*;
        match self {
            Pending => &[Accepted, Declined, Cancelled],
            Accepted => &[InProgress, Completed, Cancelled],
            InProgress => &[Completed, Cancelled],
            Declined => &[Pending, Cancelled],
            Completed => &[InProgress],
            Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        self == next || self.successors().contains(&next)
    }

    /// Still owed by the assignee: counts towards "overdue".
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Accepted | Self::InProgress)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Development,
    Design,
    Testing,
    Documentation,
    Meeting,
    #[default]
    Other,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub category: TaskCategory,
    pub assigned_to: String,
    pub assigned_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declined_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decline_reason: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_hours: Option<f64>,
    pub revision: u64,
}

/// Body of a task creation request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub category: TaskCategory,
    #[serde(default)]
    pub assigned_to: String,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub estimated_hours: Option<f64>,
}

/// Partial update. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub category: Option<TaskCategory>,
    pub assigned_to: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub tags: Option<Vec<String>>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub decline_reason: Option<String>,
    pub expected_revision: Option<u64>,
}

impl TaskPatch {
    /// True when the patch only touches what an assignee is allowed to change.
    pub fn is_assignee_patch(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.category.is_none()
            && self.assigned_to.is_none()
            && self.due_date.is_none()
            && self.tags.is_none()
            && self.estimated_hours.is_none()
    }

    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

impl Task {
    pub fn new(input: NewTask, assigned_by: String, now: DateTime<Utc>) -> Result<Self, AppError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("Title is required".into()));
        }
        if input.assigned_to.trim().is_empty() {
            return Err(AppError::Validation("assignedTo is required".into()));
        }
        validate_hours("estimatedHours", input.estimated_hours)?;

        Ok(Self {
            id: uuid::Uuid::now_v7().to_string(),
            title: title.to_string(),
            description: input.description,
            status: TaskStatus::Pending,
            priority: input.priority,
            category: input.category,
            assigned_to: input.assigned_to.trim().to_string(),
            assigned_by,
            due_date: input.due_date,
            created_at: now,
            updated_at: now,
            accepted_at: None,
            started_at: None,
            completed_at: None,
            declined_at: None,
            decline_reason: None,
            tags: input.tags,
            estimated_hours: input.estimated_hours,
            actual_hours: None,
            revision: 1,
        })
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && self.due_date.is_some_and(|due| due < now)
    }

    /// Move to `next`, stamping the lifecycle timestamps. `reason` is only
    /// consulted when declining.
    pub fn transition(
        &mut self,
        next: TaskStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let current = self.status;
        if !current.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: current,
                to: next,
            });
        }
        if current == next {
            return Ok(());
        }

        match next {
            TaskStatus::Accepted => {
                self.accepted_at.get_or_insert(now);
            }
            TaskStatus::InProgress => {
                self.started_at.get_or_insert(now);
            }
            TaskStatus::Completed => {
                self.completed_at.get_or_insert(now);
            }
            TaskStatus::Declined => {
                let reason = reason.map(str::trim).filter(|r| !r.is_empty()).ok_or_else(|| {
                    AppError::Validation("A reason is required when declining a task".into())
                })?;
                self.declined_at = Some(now);
                self.decline_reason = Some(reason.to_string());
            }
            TaskStatus::Pending => {
                self.declined_at = None;
                self.decline_reason = None;
            }
            TaskStatus::Cancelled => {}
        }
        // reopened
        if current == TaskStatus::Completed {
            self.completed_at = None;
        }

        self.status = next;
        Ok(())
    }

    /// Apply every field of `patch`, status last so a rejected transition
    /// leaves nothing half-written (callers work on a clone).
    pub fn apply(&mut self, patch: &TaskPatch, now: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(expected) = patch.expected_revision {
            if expected != self.revision {
                return Err(AppError::RevisionMismatch {
                    expected,
                    actual: self.revision,
                });
            }
        }
        if patch.decline_reason.is_some() && patch.status != Some(TaskStatus::Declined) {
            return Err(AppError::Validation(
                "declineReason is only accepted together with status declined".into(),
            ));
        }
        if let Some(title) = &patch.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(AppError::Validation("Title is required".into()));
            }
            self.title = title.to_string();
        }
        if let Some(description) = &patch.description {
            self.description.clone_from(description);
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(assignee) = &patch.assigned_to {
            self.assigned_to = assignee.trim().to_string();
        }
        if patch.due_date.is_some() {
            self.due_date = patch.due_date;
        }
        if let Some(tags) = &patch.tags {
            self.tags.clone_from(tags);
        }
        if patch.estimated_hours.is_some() {
            validate_hours("estimatedHours", patch.estimated_hours)?;
            self.estimated_hours = patch.estimated_hours;
        }
        if patch.actual_hours.is_some() {
            validate_hours("actualHours", patch.actual_hours)?;
            self.actual_hours = patch.actual_hours;
        }
        if let Some(status) = patch.status {
            self.transition(status, patch.decline_reason.as_deref(), now)?;
        }

        self.updated_at = now;
        self.revision += 1;
        Ok(())
    }

    /// Hours between acceptance (or creation) and completion.
    pub fn completion_hours(&self) -> Option<f64> {
        let done = self.completed_at?;
        let began = self.accepted_at.unwrap_or(self.created_at);
        let secs = (done - began).num_seconds().max(0);
        Some(secs as f64 / 3600.0)
    }
}

fn validate_hours(field: &str, hours: Option<f64>) -> Result<(), AppError> {
    match hours {
        Some(h) if !h.is_finite() || h < 0.0 => Err(AppError::Validation(format!(
            "{field} must be a non-negative number"
        ))),
        _ => Ok(()),
    }
}
