pub mod bootstrap;
pub mod carry_forward;
pub mod commands;
pub mod completion;
pub mod timezone;
