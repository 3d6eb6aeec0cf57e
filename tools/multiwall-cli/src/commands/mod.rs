pub mod classify;
pub mod config;
pub mod partition;
pub mod simulate;
