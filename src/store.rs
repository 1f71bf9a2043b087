//! The document store: every user and task lives in one JSON document that
//! is rewritten on each change.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppError, StoreError};
use crate::task::{NewTask, Task, TaskCategory, TaskPatch, TaskPriority, TaskStatus};
use crate::user::{NewUser, User};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    tasks: Vec<Task>,
}

/// Query over the task collection. Every field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub category: Option<TaskCategory>,
    pub assigned_to: Option<String>,
    pub assigned_by: Option<String>,
    /// Case-insensitive match against title, description and tags.
    pub search: Option<String>,
    pub due_from: Option<DateTime<Utc>>,
    pub due_to: Option<DateTime<Utc>>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if self.status.is_some_and(|s| s != task.status)
            || self.priority.is_some_and(|p| p != task.priority)
            || self.category.is_some_and(|c| c != task.category)
        {
            return false;
        }
        if self.assigned_to.as_deref().is_some_and(|id| id != task.assigned_to)
            || self.assigned_by.as_deref().is_some_and(|id| id != task.assigned_by)
        {
            return false;
        }
        if let Some(from) = self.due_from {
            if task.due_date.map_or(true, |due| due < from) {
                return false;
            }
        }
        if let Some(to) = self.due_to {
            if task.due_date.map_or(true, |due| due > to) {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                task.title.to_lowercase().contains(&needle)
                    || task.description.to_lowercase().contains(&needle)
                    || task.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

#[derive(Debug)]
pub struct TaskStore {
    path: Option<PathBuf>,
    doc: RwLock<Document>,
}

impl TaskStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            doc: RwLock::new(Document::default()),
        }
    }

    /// Open the store backed by `path`, loading it when it already exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let doc = load_from_file(&path)?;
        info!(
            path = %path.display(),
            users = doc.users.len(),
            tasks = doc.tasks.len(),
            "opened task store"
        );
        Ok(Self {
            path: Some(path),
            doc: RwLock::new(doc),
        })
    }

    fn save_to_file(&self, doc: &Document) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(doc)?)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "saved task store");
        Ok(())
    }

    /// Run `f` against a copy of the document and only keep the result when
    /// both `f` and the save succeed.
    fn write<T>(&self, f: impl FnOnce(&mut Document) -> Result<T, AppError>) -> Result<T, AppError> {
        let mut doc = self.doc.write();
        let mut draft = doc.clone();
        let out = f(&mut draft)?;
        self.save_to_file(&draft)?;
        *doc = draft;
        Ok(out)
    }

    pub fn counts(&self) -> (usize, usize) {
        let doc = self.doc.read();
        (doc.users.len(), doc.tasks.len())
    }

    // Users

    pub fn add_user(&self, input: NewUser, now: DateTime<Utc>) -> Result<User, AppError> {
        let user = User::new(input, now)?;
        self.write(|doc| {
            if doc.users.iter().any(|u| u.email == user.email) {
                return Err(AppError::Conflict(format!(
                    "Email already registered: {}",
                    user.email
                )));
            }
            doc.users.push(user.clone());
            Ok(())
        })?;
        info!(user_id = %user.id, role = user.role.as_str(), "registered user");
        Ok(user)
    }

    pub fn get_user(&self, id: &str) -> Option<User> {
        self.doc.read().users.iter().find(|u| u.id == id).cloned()
    }

    pub fn users(&self) -> Vec<User> {
        self.doc.read().users.clone()
    }

    // Tasks

    pub fn add_task(
        &self,
        input: NewTask,
        assigned_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Task, AppError> {
        let task = Task::new(input, assigned_by.to_string(), now)?;
        self.write(|doc| {
            if !doc.users.iter().any(|u| u.id == task.assigned_to) {
                return Err(AppError::Validation(format!(
                    "assignedTo does not reference a known user: {}",
                    task.assigned_to
                )));
            }
            doc.tasks.push(task.clone());
            Ok(())
        })?;
        info!(task_id = %task.id, assigned_to = %task.assigned_to, "created task");
        Ok(task)
    }

    pub fn get_task(&self, id: &str) -> Option<Task> {
        self.doc.read().tasks.iter().find(|t| t.id == id).cloned()
    }

    /// Apply `patch` to the task `id`. `authorize` sees the current task
    /// before anything changes.
    pub fn update_task(
        &self,
        id: &str,
        patch: &TaskPatch,
        now: DateTime<Utc>,
        authorize: impl FnOnce(&Task) -> Result<(), AppError>,
    ) -> Result<Task, AppError> {
        let (before, after) = self.write(|doc| {
            let idx = doc
                .tasks
                .iter()
                .position(|t| t.id == id)
                .ok_or_else(|| AppError::task_not_found(id))?;
            authorize(&doc.tasks[idx])?;
            if let Some(assignee) = &patch.assigned_to {
                if !doc.users.iter().any(|u| u.id == assignee.trim()) {
                    return Err(AppError::Validation(format!(
                        "assignedTo does not reference a known user: {assignee}"
                    )));
                }
            }
            let task = &mut doc.tasks[idx];
            let before = task.status;
            task.apply(patch, now)?;
            Ok((before, task.clone()))
        })?;

        if before != after.status {
            info!(task_id = %id, from = %before, to = %after.status, "task status changed");
        } else {
            debug!(task_id = %id, revision = after.revision, "task updated");
        }
        Ok(after)
    }

    pub fn delete_task(&self, id: &str) -> Result<Task, AppError> {
        let removed = self.write(|doc| {
            let idx = doc
                .tasks
                .iter()
                .position(|t| t.id == id)
                .ok_or_else(|| AppError::task_not_found(id))?;
            Ok(doc.tasks.remove(idx))
        })?;
        info!(task_id = %id, "deleted task");
        Ok(removed)
    }

    /// All tasks matching `filter`, newest first.
    pub fn tasks_where(&self, filter: &TaskFilter) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .doc
            .read()
            .tasks
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        tasks
    }

    /// One page of [`Self::tasks_where`]. `page` is 1-based.
    pub fn list_tasks(&self, filter: &TaskFilter, page: usize, page_size: usize) -> TaskPage {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let all = self.tasks_where(filter);
        let total = all.len();
        let tasks = all
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();
        TaskPage {
            tasks,
            total,
            page,
            page_size,
            total_pages: total.div_ceil(page_size),
        }
    }
}

fn load_from_file(path: &Path) -> Result<Document, StoreError> {
    if !path.exists() {
        debug!(path = %path.display(), "data file not found, starting empty");
        return Ok(Document::default());
    }
    let data = fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(Document::default());
    }
    Ok(serde_json::from_str(&data)?)
}
