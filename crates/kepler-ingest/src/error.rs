//! Extraction errors

use thiserror::Error;

pub type ExtractResult<T> = std::result::Result<T, ExtractError>;

/// Failures while reading a metadata document or building a record from it.
///
/// Malformed input is always reported; a half-read document would otherwise
/// end up as a corrupt catalog record.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Malformed XML at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("Malformed XML attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("Document ended inside <{0}>")]
    Truncated(String),

    #[error("Invalid value for {field}: '{value}'")]
    InvalidValue { field: String, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    pub fn invalid(field: &str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            value: value.into(),
        }
    }
}
