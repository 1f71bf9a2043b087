//! Aggregates behind the performance and dashboard endpoints.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::task::{Task, TaskStatus};
use crate::user::percentage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Period {
    #[default]
    #[serde(rename = "week")]
    Week,
    #[serde(rename = "month")]
    Month,
    #[serde(rename = "6months")]
    SixMonths,
}

impl Period {
    pub fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        match raw.map(str::trim) {
            None | Some("") | Some("week") => Ok(Self::Week),
            Some("month") => Ok(Self::Month),
            Some("6months") => Ok(Self::SixMonths),
            Some(other) => Err(AppError::Validation(format!(
                "Unknown period '{other}' (expected week, month or 6months)"
            ))),
        }
    }

    /// Start of the window ending at `now`.
    pub fn since(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let months = match self {
            Self::Week => return now - Duration::days(7),
            Self::Month => 1,
            Self::SixMonths => 6,
        };
        now.checked_sub_months(Months::new(months))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelinePoint {
    pub id: String,
    pub date: DateTime<Utc>,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    pub period: Period,
    pub since: DateTime<Utc>,
    pub total: usize,
    pub completed: usize,
    pub completion_rate: f64,
    pub tasks: Vec<TimelinePoint>,
}

/// Performance of one assignee over tasks created inside `period`. The
/// caller scopes `tasks` to that assignee.
pub fn performance<'a>(
    tasks: impl IntoIterator<Item = &'a Task>,
    period: Period,
    now: DateTime<Utc>,
) -> Performance {
    let since = period.since(now);
    let mut points: Vec<TimelinePoint> = tasks
        .into_iter()
        .filter(|t| t.created_at >= since)
        .map(|t| TimelinePoint {
            id: t.id.clone(),
            date: t.completed_at.unwrap_or(t.created_at),
            status: t.status,
        })
        .collect();
    points.sort_by_key(|p| p.date);

    let completed = points
        .iter()
        .filter(|p| p.status == TaskStatus::Completed)
        .count();
    Performance {
        period,
        since,
        total: points.len(),
        completed,
        completion_rate: percentage(completed, points.len()),
        tasks: points,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub pending_tasks: usize,
    pub in_progress_tasks: usize,
    pub overdue_tasks: usize,
    pub tasks_completed_this_week: usize,
    pub tasks_completed_this_month: usize,
    /// Mean hours from acceptance to completion.
    pub average_completion_time: f64,
}

pub fn dashboard<'a>(tasks: impl IntoIterator<Item = &'a Task>, now: DateTime<Utc>) -> DashboardStats {
    let week = Period::Week.since(now);
    let month = Period::Month.since(now);
    let mut stats = DashboardStats::default();
    let mut hours_total = 0.0;
    let mut hours_count = 0usize;

    for task in tasks {
        stats.total_tasks += 1;
        match task.status {
            TaskStatus::Completed => stats.completed_tasks += 1,
            TaskStatus::Pending => stats.pending_tasks += 1,
            TaskStatus::InProgress => stats.in_progress_tasks += 1,
            _ => {}
        }
        if task.is_overdue(now) {
            stats.overdue_tasks += 1;
        }
        if let Some(done) = task.completed_at {
            if done >= week {
                stats.tasks_completed_this_week += 1;
            }
            if done >= month {
                stats.tasks_completed_this_month += 1;
            }
        }
        if let Some(h) = task.completion_hours() {
            hours_total += h;
            hours_count += 1;
        }
    }

    if hours_count > 0 {
        stats.average_completion_time = hours_total / hours_count as f64;
    }
    stats
}
