//! Pure text-to-record parsing of scheduler console output.

pub mod ai;
pub mod answers;
pub mod fields;
pub mod listing;
pub mod record;
pub mod script;

use thiserror::Error;

use crate::core::model::TaskId;

pub use ai::{extract_generation, is_generation_failure, parse_generated_command, synthesize_name};
pub use answers::{ApiKeyStatus, parse_api_key_status};
pub use listing::{ListingStrategy, extract_ids, parse_added_id, parse_blocks};
pub use record::parse_record;
pub use script::extract_script;

/// Why a detail block could not be turned into a record.
///
/// Every variant is reported to callers as "not found".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no output to parse")]
    Empty,

    #[error("scheduler reported task {} not found", .id.map_or_else(|| "?".to_string(), |id| id.to_string()))]
    NotFound { id: Option<TaskId> },

    #[error("required field `{0}` missing")]
    MissingField(&'static str),
}
