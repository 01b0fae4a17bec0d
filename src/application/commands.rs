use crate::application::bootstrap::bootstrap_workspace;
use crate::application::carry_forward::{CarryForwardEngine, ReconcileContext, ReconcileOutcome};
use crate::application::completion::{CompletionService, PhotoUpload};
use crate::application::timezone::{local_today, resolve_timezone};
use crate::domain::duration::format_duration;
use crate::domain::models::{carry_over_note, classify_task, Task, TaskClassification, TaskStatus};
use crate::infrastructure::config::read_default_timezone;
use crate::infrastructure::error::EngineError;
use crate::infrastructure::object_store::FsObjectStore;
use crate::infrastructure::profile_repository::{ProfileRepository, SqliteProfileRepository};
use crate::infrastructure::task_repository::{SqliteTaskRepository, TaskRepository};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    objects_dir: PathBuf,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, EngineError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        Ok(Self {
            config_dir: workspace_root.join("config"),
            database_path: bootstrap.database_path,
            logs_dir: workspace_root.join("logs"),
            objects_dir: bootstrap.objects_dir,
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn command_error(&self, command: &str, error: &EngineError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionTaskItem {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_time: String,
    pub status: String,
    pub classification: String,
    pub missed_days: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub status: String,
    pub today: Option<String>,
    pub rolled: usize,
    pub skipped_stale: usize,
    pub rollover_failures: usize,
    pub tasks: Vec<SessionTaskItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleteTaskResponse {
    pub task: Task,
    pub duration_label: String,
}

fn resolve_user_timezone(state: &AppState, user_id: &str) -> Result<Tz, EngineError> {
    let profiles = SqliteProfileRepository::new(state.database_path());
    let stored = match profiles.timezone(user_id) {
        Ok(value) => value,
        Err(error) => {
            state.log_error(
                "resolve_timezone",
                &format!("profile timezone read failed for {user_id}: {error}"),
            );
            None
        }
    };
    let stored = match stored {
        Some(value) => Some(value),
        None => read_default_timezone(state.config_dir())?,
    };
    Ok(resolve_timezone(stored.as_deref()))
}

fn session_task_item(task: &Task, seed: u64) -> SessionTaskItem {
    let (classification, missed_days) = match classify_task(task) {
        TaskClassification::Pending => ("pending".to_string(), 0),
        TaskClassification::Carried(missed) => ("carried".to_string(), missed),
        TaskClassification::Overdue(missed) => ("overdue".to_string(), missed),
        TaskClassification::Completed => {
            ("completed".to_string(), task.consecutive_missed_days)
        }
    };
    let note = match task.status {
        TaskStatus::Pending => {
            carry_over_note(task.consecutive_missed_days, seed).map(ToOwned::to_owned)
        }
        TaskStatus::Completed => None,
    };

    SessionTaskItem {
        id: task.id.clone(),
        title: task.title.clone(),
        description: task.description.clone(),
        start_time: task.start_time.to_rfc3339(),
        status: match task.status {
            TaskStatus::Pending => "pending".to_string(),
            TaskStatus::Completed => "completed".to_string(),
        },
        classification,
        missed_days,
        duration_label: task.total_time_minutes.map(format_duration),
        note,
    }
}

/// Session entry point: one best-effort reconciliation pass, then today's
/// task list. An anonymous session skips both without error; rollover
/// problems are logged and never surfaced, only the list fetch can fail.
pub async fn start_session_impl(
    state: &AppState,
    user_id: Option<String>,
) -> Result<SessionResponse, EngineError> {
    let Some(user_id) = user_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    else {
        return Ok(SessionResponse {
            status: "anonymous".to_string(),
            today: None,
            rolled: 0,
            skipped_stale: 0,
            rollover_failures: 0,
            tasks: Vec::new(),
        });
    };

    let timezone = resolve_user_timezone(state, &user_id)?;
    let context = ReconcileContext {
        user_id: user_id.clone(),
        timezone,
        now: Utc::now(),
    };
    let repository = Arc::new(SqliteTaskRepository::new(state.database_path()));

    let engine = CarryForwardEngine::new(Arc::clone(&repository));
    let outcome = match engine.reconcile(&context).await {
        Ok(outcome) => outcome,
        Err(error) => {
            state.log_error("start_session", &format!("reconciliation failed: {error}"));
            ReconcileOutcome::default()
        }
    };
    for failure in &outcome.failures {
        state.log_error("start_session", failure);
    }
    state.log_info(
        "start_session",
        &format!(
            "reconciled user={user_id} timezone={timezone} rolled={} skipped_stale={} failures={}",
            outcome.rolled,
            outcome.skipped_stale,
            outcome.failures.len()
        ),
    );

    let today = local_today(timezone, context.now);
    let tasks = repository.list_for_date(&user_id, today)?;
    let seed = context.now.timestamp() as u64;
    let items = tasks
        .iter()
        .map(|task| session_task_item(task, seed))
        .collect();

    Ok(SessionResponse {
        status: "ok".to_string(),
        today: Some(today.to_string()),
        rolled: outcome.rolled,
        skipped_stale: outcome.skipped_stale,
        rollover_failures: outcome.failures.len(),
        tasks: items,
    })
}

pub fn create_task_impl(
    state: &AppState,
    user_id: String,
    title: String,
    description: Option<String>,
    start_time: String,
) -> Result<Task, EngineError> {
    let start_time = DateTime::parse_from_rfc3339(start_time.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| {
            EngineError::Validation(format!("start_time must be RFC 3339: {error}"))
        })?;
    let timezone = resolve_user_timezone(state, &user_id)?;

    let task = Task {
        id: next_id("tsk"),
        user_id,
        title,
        description,
        start_time,
        end_time: None,
        total_time_minutes: None,
        status: TaskStatus::Pending,
        task_date: start_time.with_timezone(&timezone).date_naive(),
        consecutive_missed_days: 0,
        image_path: None,
    };
    task.validate().map_err(EngineError::Validation)?;

    let repository = SqliteTaskRepository::new(state.database_path());
    repository.insert(&task)?;
    state.log_info(
        "create_task",
        &format!("created task id={} date={}", task.id, task.task_date),
    );
    Ok(task)
}

pub async fn complete_task_impl(
    state: &AppState,
    user_id: String,
    task_id: String,
    completed_at: Option<String>,
    photo: Option<PhotoUpload>,
) -> Result<CompleteTaskResponse, EngineError> {
    let completed_at = match completed_at {
        Some(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .map(|value| value.with_timezone(&Utc))
            .map_err(|error| {
                EngineError::Validation(format!("completed_at must be RFC 3339: {error}"))
            })?,
        None => Utc::now(),
    };

    let repository = Arc::new(SqliteTaskRepository::new(state.database_path()));
    let object_store = Arc::new(FsObjectStore::new(&state.objects_dir));
    let service = CompletionService::new(repository, object_store);

    let task = service
        .complete_task(&user_id, &task_id, completed_at, photo)
        .await?;
    let duration_label = format_duration(task.total_time_minutes.unwrap_or(0));
    state.log_info(
        "complete_task",
        &format!("completed task id={task_id} duration={duration_label}"),
    );

    Ok(CompleteTaskResponse {
        task,
        duration_label,
    })
}

pub fn set_timezone_impl(
    state: &AppState,
    user_id: String,
    timezone: String,
) -> Result<String, EngineError> {
    let parsed = timezone
        .trim()
        .parse::<Tz>()
        .map_err(|_| EngineError::Validation(format!("unknown timezone: {timezone}")))?;

    let profiles = SqliteProfileRepository::new(state.database_path());
    profiles.save_timezone(&user_id, parsed.name())?;
    state.log_info(
        "set_timezone",
        &format!("saved timezone {parsed} for user {user_id}"),
    );
    Ok(parsed.name().to_string())
}
