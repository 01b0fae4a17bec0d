use crate::domain::models::{CompletionUpdate, RolloverUpdate, Task, TaskStatus};
use crate::infrastructure::error::EngineError;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const DATE_FORMAT: &str = "%Y-%m-%d";

const TASK_COLUMNS: &str = "id, user_id, title, description, start_time, end_time, \
     total_time_minutes, status, task_date, consecutive_missed_days, image_path";

pub trait TaskRepository: Send + Sync {
    fn insert(&self, task: &Task) -> Result<(), EngineError>;
    fn get_by_id(&self, task_id: &str) -> Result<Option<Task>, EngineError>;
    /// Pending tasks for the user whose task_date is strictly before `date`.
    fn list_pending_before(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Task>, EngineError>;
    /// All tasks for the user on `date`, ordered by start_time ascending.
    fn list_for_date(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Task>, EngineError>;
    /// Conditional rollover: applies only while the row is still pending and
    /// still carries the previously-read task_date. Returns false when a
    /// concurrent pass already moved the row.
    fn apply_rollover(&self, update: &RolloverUpdate) -> Result<bool, EngineError>;
    /// Marks a pending task completed in a single update. Returns false when
    /// the row was no longer pending.
    fn apply_completion(
        &self,
        task_id: &str,
        completion: &CompletionUpdate,
    ) -> Result<bool, EngineError>;
}

#[derive(Debug, Clone)]
pub struct SqliteTaskRepository {
    db_path: PathBuf,
}

impl SqliteTaskRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, EngineError> {
        Connection::open(&self.db_path).map_err(EngineError::from)
    }
}

type RawTaskRow = (
    String,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<u32>,
    String,
    String,
    u32,
    Option<String>,
);

fn raw_task_row(row: &Row<'_>) -> rusqlite::Result<RawTaskRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

fn parse_utc(value: &str, field_name: &str) -> Result<DateTime<Utc>, EngineError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| {
            EngineError::InvalidConfig(format!("invalid tasks.{field_name} '{value}': {error}"))
        })
}

fn parse_date(value: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|error| {
        EngineError::InvalidConfig(format!("invalid tasks.task_date '{value}': {error}"))
    })
}

fn parse_status(value: &str) -> Result<TaskStatus, EngineError> {
    match value {
        "pending" => Ok(TaskStatus::Pending),
        "completed" => Ok(TaskStatus::Completed),
        other => Err(EngineError::InvalidConfig(format!(
            "invalid tasks.status value: {other}"
        ))),
    }
}

fn status_to_string(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Completed => "completed",
    }
}

fn task_from_raw(raw: RawTaskRow) -> Result<Task, EngineError> {
    let (
        id,
        user_id,
        title,
        description,
        start_time_raw,
        end_time_raw,
        total_time_minutes,
        status_raw,
        task_date_raw,
        consecutive_missed_days,
        image_path,
    ) = raw;

    let end_time = end_time_raw
        .as_deref()
        .map(|value| parse_utc(value, "end_time"))
        .transpose()?;

    Ok(Task {
        id,
        user_id,
        title,
        description,
        start_time: parse_utc(&start_time_raw, "start_time")?,
        end_time,
        total_time_minutes,
        status: parse_status(&status_raw)?,
        task_date: parse_date(&task_date_raw)?,
        consecutive_missed_days,
        image_path,
    })
}

impl TaskRepository for SqliteTaskRepository {
    fn insert(&self, task: &Task) -> Result<(), EngineError> {
        task.validate().map_err(EngineError::Validation)?;
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO tasks (id, user_id, title, description, start_time, end_time,
                 total_time_minutes, status, task_date, consecutive_missed_days, image_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                task.id,
                task.user_id,
                task.title,
                task.description,
                task.start_time.to_rfc3339(),
                task.end_time.map(|value| value.to_rfc3339()),
                task.total_time_minutes,
                status_to_string(task.status),
                task.task_date.format(DATE_FORMAT).to_string(),
                task.consecutive_missed_days,
                task.image_path,
            ],
        )?;
        Ok(())
    }

    fn get_by_id(&self, task_id: &str) -> Result<Option<Task>, EngineError> {
        let connection = self.connect()?;
        let raw = connection
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![task_id],
                raw_task_row,
            )
            .optional()?;
        raw.map(task_from_raw).transpose()
    }

    fn list_pending_before(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Task>, EngineError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE user_id = ?1 AND status = 'pending' AND task_date < ?2
             ORDER BY task_date ASC, start_time ASC"
        ))?;
        let rows = statement.query_map(
            params![user_id, date.format(DATE_FORMAT).to_string()],
            raw_task_row,
        )?;

        let mut tasks = Vec::new();
        for raw in rows {
            tasks.push(task_from_raw(raw?)?);
        }
        Ok(tasks)
    }

    fn list_for_date(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Task>, EngineError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE user_id = ?1 AND task_date = ?2
             ORDER BY start_time ASC"
        ))?;
        let rows = statement.query_map(
            params![user_id, date.format(DATE_FORMAT).to_string()],
            raw_task_row,
        )?;

        let mut tasks = Vec::new();
        for raw in rows {
            tasks.push(task_from_raw(raw?)?);
        }
        Ok(tasks)
    }

    fn apply_rollover(&self, update: &RolloverUpdate) -> Result<bool, EngineError> {
        let connection = self.connect()?;
        let affected = connection.execute(
            "UPDATE tasks SET
                 task_date = ?1,
                 start_time = ?2,
                 consecutive_missed_days = ?3
             WHERE id = ?4 AND status = 'pending' AND task_date = ?5",
            params![
                update.new_task_date.format(DATE_FORMAT).to_string(),
                update.new_start_time.to_rfc3339(),
                update.new_missed_days,
                update.task_id,
                update.previous_task_date.format(DATE_FORMAT).to_string(),
            ],
        )?;
        Ok(affected == 1)
    }

    fn apply_completion(
        &self,
        task_id: &str,
        completion: &CompletionUpdate,
    ) -> Result<bool, EngineError> {
        let connection = self.connect()?;
        let affected = connection.execute(
            "UPDATE tasks SET
                 status = 'completed',
                 end_time = ?1,
                 total_time_minutes = ?2,
                 image_path = COALESCE(?3, image_path)
             WHERE id = ?4 AND status = 'pending'",
            params![
                completion.end_time.to_rfc3339(),
                completion.total_time_minutes,
                completion.image_path,
                task_id,
            ],
        )?;
        Ok(affected == 1)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTaskRepository {
    tasks: Mutex<HashMap<String, Task>>,
}

impl InMemoryTaskRepository {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Task>>, EngineError> {
        self.tasks
            .lock()
            .map_err(|error| EngineError::InvalidConfig(format!("task lock poisoned: {error}")))
    }
}

impl TaskRepository for InMemoryTaskRepository {
    fn insert(&self, task: &Task) -> Result<(), EngineError> {
        task.validate().map_err(EngineError::Validation)?;
        let mut tasks = self.lock()?;
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn get_by_id(&self, task_id: &str) -> Result<Option<Task>, EngineError> {
        Ok(self.lock()?.get(task_id).cloned())
    }

    fn list_pending_before(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Task>, EngineError> {
        let tasks = self.lock()?;
        let mut selected: Vec<Task> = tasks
            .values()
            .filter(|task| {
                task.user_id == user_id
                    && task.status == TaskStatus::Pending
                    && task.task_date < date
            })
            .cloned()
            .collect();
        selected.sort_by(|left, right| {
            (left.task_date, left.start_time).cmp(&(right.task_date, right.start_time))
        });
        Ok(selected)
    }

    fn list_for_date(&self, user_id: &str, date: NaiveDate) -> Result<Vec<Task>, EngineError> {
        let tasks = self.lock()?;
        let mut selected: Vec<Task> = tasks
            .values()
            .filter(|task| task.user_id == user_id && task.task_date == date)
            .cloned()
            .collect();
        selected.sort_by_key(|task| task.start_time);
        Ok(selected)
    }

    fn apply_rollover(&self, update: &RolloverUpdate) -> Result<bool, EngineError> {
        let mut tasks = self.lock()?;
        let Some(task) = tasks.get_mut(&update.task_id) else {
            return Ok(false);
        };
        if task.status != TaskStatus::Pending || task.task_date != update.previous_task_date {
            return Ok(false);
        }
        task.task_date = update.new_task_date;
        task.start_time = update.new_start_time;
        task.consecutive_missed_days = update.new_missed_days;
        Ok(true)
    }

    fn apply_completion(
        &self,
        task_id: &str,
        completion: &CompletionUpdate,
    ) -> Result<bool, EngineError> {
        let mut tasks = self.lock()?;
        let Some(task) = tasks.get_mut(task_id) else {
            return Ok(false);
        };
        if task.status != TaskStatus::Pending {
            return Ok(false);
        }
        task.status = TaskStatus::Completed;
        task.end_time = Some(completion.end_time);
        task.total_time_minutes = Some(completion.total_time_minutes);
        if completion.image_path.is_some() {
            task.image_path = completion.image_path.clone();
        }
        Ok(true)
    }
}
