use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::task::{Task, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
    pub department: Option<String>,
}

impl User {
    pub fn new(input: NewUser, now: DateTime<Utc>) -> Result<Self, AppError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Name is required".into()));
        }
        let email = input.email.trim().to_lowercase();
        if email.is_empty() {
            return Err(AppError::Validation("Email is required".into()));
        }
        if !email.contains('@') {
            return Err(AppError::Validation(format!("Invalid email: {email}")));
        }
        Ok(Self {
            id: uuid::Uuid::now_v7().to_string(),
            name: name.to_string(),
            email,
            role: input.role,
            department: input.department,
            created_at: now,
        })
    }
}

/// Per-user aggregates, always recomputed from the task collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub tasks_completed: usize,
    pub tasks_declined: usize,
    pub tasks_in_progress: usize,
    pub total_tasks_assigned: usize,
    /// Percentage of assigned tasks that are completed.
    pub completion_rate: f64,
    /// Mean hours from acceptance to completion.
    pub average_completion_time: f64,
    /// Consecutive days, ending today or yesterday, with a completion.
    pub current_streak: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWithStats {
    #[serde(flatten)]
    pub user: User,
    pub stats: UserStats,
}

impl UserStats {
    pub fn compute<'a>(tasks: impl IntoIterator<Item = &'a Task>, now: DateTime<Utc>) -> Self {
        let mut stats = Self::default();
        let mut hours = Vec::new();
        let mut days = BTreeSet::new();

        for task in tasks {
            stats.total_tasks_assigned += 1;
            match task.status {
                TaskStatus::Completed => {
                    stats.tasks_completed += 1;
                    if let Some(h) = task.completion_hours() {
                        hours.push(h);
                    }
                    if let Some(done) = task.completed_at {
                        days.insert(done.date_naive());
                    }
                }
                TaskStatus::Declined => stats.tasks_declined += 1,
                TaskStatus::InProgress => stats.tasks_in_progress += 1,
                _ => {}
            }
        }

        stats.completion_rate = percentage(stats.tasks_completed, stats.total_tasks_assigned);
        if !hours.is_empty() {
            stats.average_completion_time = hours.iter().sum::<f64>() / hours.len() as f64;
        }
        stats.current_streak = streak(&days, now.date_naive());
        stats
    }
}

pub(crate) fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn streak(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut day = if days.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };
    let mut count = 0;
    while days.contains(&day) {
        count += 1;
        day -= Duration::days(1);
    }
    count
}
