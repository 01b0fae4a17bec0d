use crate::application::timezone::{local_today, resolve_local_datetime};
use crate::domain::models::{RolloverUpdate, Task, TaskStatus};
use crate::infrastructure::error::EngineError;
use crate::infrastructure::task_repository::TaskRepository;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::task::JoinSet;

const ROLLOVER_CONCURRENCY: usize = 4;

/// Explicit per-pass context. Nothing about the user or the clock is held as
/// ambient state between passes.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    pub user_id: String,
    pub timezone: Tz,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub rolled: usize,
    /// Updates rejected by the conditional write: another session already
    /// moved the row.
    pub skipped_stale: usize,
    pub failures: Vec<String>,
}

/// Computes the rollover fields for one overdue task, or `None` when the task
/// is not a candidate. Pure; day arithmetic happens on local calendar dates so
/// a DST boundary cannot produce a fractional-day error.
pub fn plan_rollover(task: &Task, today: NaiveDate, timezone: Tz) -> Option<RolloverUpdate> {
    if task.status != TaskStatus::Pending || task.task_date >= today {
        return None;
    }

    let days_missed = (today - task.task_date).num_days() as u32;
    let time_of_day = task.start_time.with_timezone(&timezone).time();
    let new_start_time = resolve_local_datetime(timezone, today.and_time(time_of_day));

    Some(RolloverUpdate {
        task_id: task.id.clone(),
        previous_task_date: task.task_date,
        new_task_date: today,
        new_start_time,
        new_missed_days: task.consecutive_missed_days + days_missed,
    })
}

pub struct CarryForwardEngine<R>
where
    R: TaskRepository + 'static,
{
    task_repository: Arc<R>,
    concurrency: usize,
}

impl<R> CarryForwardEngine<R>
where
    R: TaskRepository + 'static,
{
    pub fn new(task_repository: Arc<R>) -> Self {
        Self {
            task_repository,
            concurrency: ROLLOVER_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// One reconciliation pass: select pending tasks dated before the user's
    /// local today, roll each forward with a conditional update. Per-task
    /// write failures are collected, never fatal; rows they leave behind are
    /// picked up again on the next pass with a freshly computed day count.
    pub async fn reconcile(&self, context: &ReconcileContext) -> Result<ReconcileOutcome, EngineError> {
        let today = local_today(context.timezone, context.now);
        let candidates = self
            .task_repository
            .list_pending_before(&context.user_id, today)?;

        let mut outcome = ReconcileOutcome::default();
        let mut updates: JoinSet<(String, Result<bool, EngineError>)> = JoinSet::new();

        for task in &candidates {
            let Some(update) = plan_rollover(task, today, context.timezone) else {
                continue;
            };
            let repository = Arc::clone(&self.task_repository);
            updates.spawn_blocking(move || {
                let task_id = update.task_id.clone();
                (task_id, repository.apply_rollover(&update))
            });

            if updates.len() >= self.concurrency {
                collect_apply_result(&mut updates, &mut outcome).await;
            }
        }

        while !updates.is_empty() {
            collect_apply_result(&mut updates, &mut outcome).await;
        }

        Ok(outcome)
    }
}

async fn collect_apply_result(
    updates: &mut JoinSet<(String, Result<bool, EngineError>)>,
    outcome: &mut ReconcileOutcome,
) {
    let Some(join_result) = updates.join_next().await else {
        return;
    };
    match join_result {
        Ok((_, Ok(true))) => outcome.rolled += 1,
        Ok((_, Ok(false))) => outcome.skipped_stale += 1,
        Ok((task_id, Err(error))) => outcome
            .failures
            .push(format!("rollover failed for {task_id}: {error}")),
        Err(error) => outcome
            .failures
            .push(format!("rollover task panicked: {error}")),
    }
}
