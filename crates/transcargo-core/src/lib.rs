//! TransCargo Core: error taxonomy, configuration, shared time helpers.

pub mod config;
pub mod error;
pub mod time;

pub use config::{AppConfig, DataPaths, JobSettings, OpenAiSettings};
pub use error::{Error, Result};
