pub mod duration;
pub mod models;
