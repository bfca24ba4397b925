pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod monitoring;
pub mod orchestrator;
pub mod reporting;
