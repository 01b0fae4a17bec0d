pub mod config;
pub mod error;
pub mod object_store;
pub mod profile_repository;
pub mod storage;
pub mod task_repository;
