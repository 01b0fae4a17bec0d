use crate::domain::duration::compute_duration;
use crate::domain::models::{CompletionUpdate, Task, TaskStatus};
use crate::infrastructure::error::EngineError;
use crate::infrastructure::object_store::ObjectStore;
use crate::infrastructure::task_repository::TaskRepository;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub bytes: Vec<u8>,
    pub extension: String,
}

pub struct CompletionService<R, O>
where
    R: TaskRepository,
    O: ObjectStore,
{
    task_repository: Arc<R>,
    object_store: Arc<O>,
}

impl<R, O> CompletionService<R, O>
where
    R: TaskRepository,
    O: ObjectStore,
{
    pub fn new(task_repository: Arc<R>, object_store: Arc<O>) -> Self {
        Self {
            task_repository,
            object_store,
        }
    }

    /// Marks a pending task completed: validates the completion instant,
    /// uploads the photo first when one is supplied (fail closed, no row
    /// mutation on upload failure), then writes status, end time, duration
    /// and image path as one update.
    pub async fn complete_task(
        &self,
        user_id: &str,
        task_id: &str,
        completed_at: DateTime<Utc>,
        photo: Option<PhotoUpload>,
    ) -> Result<Task, EngineError> {
        let task = self
            .task_repository
            .get_by_id(task_id)?
            .ok_or_else(|| EngineError::Validation(format!("unknown task id: {task_id}")))?;

        if task.user_id != user_id {
            return Err(EngineError::Validation(format!(
                "task {task_id} does not belong to the requesting user"
            )));
        }
        if task.status == TaskStatus::Completed {
            return Err(EngineError::Validation(format!(
                "task {task_id} is already completed"
            )));
        }
        if completed_at < task.start_time {
            return Err(EngineError::Validation(
                "completion time must not be earlier than the scheduled start".to_string(),
            ));
        }

        let total_time_minutes = compute_duration(task.start_time, completed_at)?;

        let image_path = match photo {
            Some(photo) => {
                let key = completion_image_key(user_id, task_id, completed_at, &photo.extension);
                Some(self.object_store.put(&key, &photo.bytes).await?)
            }
            None => None,
        };

        let completion = CompletionUpdate {
            end_time: completed_at,
            total_time_minutes,
            image_path,
        };
        let applied = self.task_repository.apply_completion(task_id, &completion)?;
        if !applied {
            return Err(EngineError::Validation(format!(
                "task {task_id} was completed by another session"
            )));
        }

        self.task_repository
            .get_by_id(task_id)?
            .ok_or_else(|| EngineError::Validation(format!("task {task_id} vanished after completion")))
    }
}

fn completion_image_key(
    user_id: &str,
    task_id: &str,
    completed_at: DateTime<Utc>,
    extension: &str,
) -> String {
    let extension = extension.trim().trim_start_matches('.');
    let extension = if extension.is_empty() { "jpg" } else { extension };
    format!(
        "{user_id}/{task_id}-completion-{}.{extension}",
        completed_at.timestamp()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::object_store::InMemoryObjectStore;
    use crate::infrastructure::task_repository::InMemoryTaskRepository;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_task() -> Task {
        Task {
            id: "tsk-1".to_string(),
            user_id: "usr-1".to_string(),
            title: "Evening run".to_string(),
            description: None,
            start_time: fixed_time("2025-01-10T09:00:00Z"),
            end_time: None,
            total_time_minutes: None,
            status: TaskStatus::Pending,
            task_date: NaiveDate::from_ymd_opt(2025, 1, 10).expect("valid date"),
            consecutive_missed_days: 0,
            image_path: None,
        }
    }

    fn service_with_task() -> (
        CompletionService<InMemoryTaskRepository, InMemoryObjectStore>,
        Arc<InMemoryTaskRepository>,
        Arc<InMemoryObjectStore>,
    ) {
        let repository = Arc::new(InMemoryTaskRepository::default());
        repository.insert(&sample_task()).expect("insert task");
        let store = Arc::new(InMemoryObjectStore::default());
        let service = CompletionService::new(Arc::clone(&repository), Arc::clone(&store));
        (service, repository, store)
    }

    #[tokio::test]
    async fn completion_sets_all_fields_in_one_update() {
        let (service, repository, _store) = service_with_task();

        let completed = service
            .complete_task("usr-1", "tsk-1", fixed_time("2025-01-10T10:15:00Z"), None)
            .await
            .expect("complete task");

        assert_eq!(completed.status, TaskStatus::Completed);
        assert_eq!(completed.end_time, Some(fixed_time("2025-01-10T10:15:00Z")));
        assert_eq!(completed.total_time_minutes, Some(75));
        assert_eq!(completed.image_path, None);

        let stored = repository
            .get_by_id("tsk-1")
            .expect("get task")
            .expect("task exists");
        assert_eq!(stored, completed);
    }

    #[tokio::test]
    async fn completion_with_photo_stores_blob_under_completion_key() {
        let (service, _repository, store) = service_with_task();
        let completed_at = fixed_time("2025-01-10T10:15:00Z");
        let photo = PhotoUpload {
            bytes: b"jpeg-bytes".to_vec(),
            extension: ".jpg".to_string(),
        };

        let completed = service
            .complete_task("usr-1", "tsk-1", completed_at, Some(photo))
            .await
            .expect("complete task");

        let expected_key = format!("usr-1/tsk-1-completion-{}.jpg", completed_at.timestamp());
        assert_eq!(completed.image_path.as_deref(), Some(expected_key.as_str()));
        assert_eq!(store.get(&expected_key), Some(b"jpeg-bytes".to_vec()));
    }

    #[tokio::test]
    async fn completion_before_start_fails_and_mutates_nothing() {
        let (service, repository, _store) = service_with_task();

        let result = service
            .complete_task("usr-1", "tsk-1", fixed_time("2025-01-10T08:59:00Z"), None)
            .await;

        assert!(matches!(result, Err(EngineError::Validation(_))));
        let stored = repository
            .get_by_id("tsk-1")
            .expect("get task")
            .expect("task exists");
        assert_eq!(stored, sample_task());
    }

    #[tokio::test]
    async fn upload_failure_aborts_before_any_row_mutation() {
        struct FailingObjectStore;

        #[async_trait]
        impl ObjectStore for FailingObjectStore {
            async fn put(&self, _path: &str, _bytes: &[u8]) -> Result<String, EngineError> {
                Err(EngineError::Upload("bucket unavailable".to_string()))
            }
        }

        let repository = Arc::new(InMemoryTaskRepository::default());
        repository.insert(&sample_task()).expect("insert task");
        let service = CompletionService::new(Arc::clone(&repository), Arc::new(FailingObjectStore));

        let result = service
            .complete_task(
                "usr-1",
                "tsk-1",
                fixed_time("2025-01-10T10:15:00Z"),
                Some(PhotoUpload {
                    bytes: b"jpeg-bytes".to_vec(),
                    extension: "jpg".to_string(),
                }),
            )
            .await;

        assert!(matches!(result, Err(EngineError::Upload(_))));
        let stored = repository
            .get_by_id("tsk-1")
            .expect("get task")
            .expect("task exists");
        assert_eq!(stored.status, TaskStatus::Pending);
        assert_eq!(stored.image_path, None);
        assert_eq!(stored.end_time, None);
    }

    #[tokio::test]
    async fn completion_rejects_foreign_and_already_completed_tasks() {
        let (service, _repository, _store) = service_with_task();

        let foreign = service
            .complete_task("usr-2", "tsk-1", fixed_time("2025-01-10T10:00:00Z"), None)
            .await;
        assert!(matches!(foreign, Err(EngineError::Validation(_))));

        service
            .complete_task("usr-1", "tsk-1", fixed_time("2025-01-10T10:00:00Z"), None)
            .await
            .expect("first completion");
        let again = service
            .complete_task("usr-1", "tsk-1", fixed_time("2025-01-10T11:00:00Z"), None)
            .await;
        assert!(matches!(again, Err(EngineError::Validation(_))));
    }
}
