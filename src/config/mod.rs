pub mod loader;
pub mod payload;
pub mod schema;

pub use loader::{load_from_path, load_from_str, load_or_default, ConfigError};
pub use payload::{parse_batch, parse_changes, parse_recommendation, PayloadError};
pub use schema::{
    CorrectionSettings, EngineConfig, HistorySettings, ValidationError, ValidationIssue,
};
