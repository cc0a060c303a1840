//! Grant tracker core library — domain types, configuration, errors.
//!
//! - [`types`] — newtypes, grant records, section names, field rows
//! - [`config`] — `~/.grant-tracker/config.yaml` load / save
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::TrackerConfig;
pub use error::ConfigError;
pub use types::{mask, DocumentId, FieldRow, GrantId, GrantRecord, SectionName};
