use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_time_minutes: Option<u32>,
    pub status: TaskStatus,
    pub task_date: NaiveDate,
    pub consecutive_missed_days: u32,
    pub image_path: Option<String>,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.user_id, "task.user_id")?;
        validate_non_empty(&self.title, "task.title")?;
        if let Some(end_time) = self.end_time {
            if end_time < self.start_time {
                return Err("task.end_time must be >= task.start_time".to_string());
            }
        }
        if self.status == TaskStatus::Completed && self.end_time.is_none() {
            return Err("completed task must carry task.end_time".to_string());
        }
        Ok(())
    }
}

/// Display classification derived from status and accumulated missed days.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskClassification {
    Pending,
    Carried(u32),
    Overdue(u32),
    Completed,
}

const OVERDUE_THRESHOLD: u32 = 3;

/// Total over the input domain: completed wins regardless of missed count,
/// pending splits on exact integer boundaries (0, 1..=2, >=3).
pub fn classify_task(task: &Task) -> TaskClassification {
    match task.status {
        TaskStatus::Completed => TaskClassification::Completed,
        TaskStatus::Pending => match task.consecutive_missed_days {
            0 => TaskClassification::Pending,
            missed if missed >= OVERDUE_THRESHOLD => TaskClassification::Overdue(missed),
            missed => TaskClassification::Carried(missed),
        },
    }
}

/// The four fields a carry-forward writes as one atomic row update, plus the
/// previously-read date used as the optimistic-concurrency witness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloverUpdate {
    pub task_id: String,
    pub previous_task_date: NaiveDate,
    pub new_task_date: NaiveDate,
    pub new_start_time: DateTime<Utc>,
    pub new_missed_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionUpdate {
    pub end_time: DateTime<Utc>,
    pub total_time_minutes: u32,
    pub image_path: Option<String>,
}

const CARRIED_NOTES: [&str; 3] = [
    "Still on your list, moved to today.",
    "Rolled forward, ready when you are.",
    "Yesterday slipped, today counts.",
];

const OVERDUE_NOTES: [&str; 3] = [
    "This one has waited a while now.",
    "A few days behind, small start helps.",
    "Long overdue, tackle it first today.",
];

/// Deterministic cosmetic note for a carried task. The seed is injected by
/// the caller so presentation stays reproducible in tests.
pub fn carry_over_note(missed_days: u32, seed: u64) -> Option<&'static str> {
    if missed_days == 0 {
        return None;
    }
    let table: &[&'static str] = if missed_days >= OVERDUE_THRESHOLD {
        &OVERDUE_NOTES
    } else {
        &CARRIED_NOTES
    };
    Some(table[(seed % table.len() as u64) as usize])
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
