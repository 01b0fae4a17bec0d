pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::carry_forward::{
    plan_rollover, CarryForwardEngine, ReconcileContext, ReconcileOutcome,
};
pub use application::commands::{
    complete_task_impl, create_task_impl, set_timezone_impl, start_session_impl, AppState,
    CompleteTaskResponse, SessionResponse, SessionTaskItem,
};
pub use application::completion::{CompletionService, PhotoUpload};
pub use application::timezone::{
    local_day_bounds, local_today, resolve_timezone, start_of_local_day,
};
pub use domain::duration::{compute_duration, format_duration};
pub use domain::models::{
    carry_over_note, classify_task, Task, TaskClassification, TaskStatus,
};
pub use infrastructure::error::EngineError;
