pub mod backoff;
pub mod cli;
pub mod command;
pub mod config;
pub mod context;
pub mod defaults;
pub mod event;
pub mod file_reader;
pub mod health;
pub mod logging;
pub mod operator;
pub mod package;
pub mod publisher;
pub mod reconciler;
pub mod render;
pub mod status;
pub mod utils;
pub mod validation_regexes;
