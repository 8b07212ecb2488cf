use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Harness and environment failures.
///
/// Schema violations found in an input fragment are never reported through
/// this type; they come back from the harness as
/// [`ValidationEvent`](crate::event::ValidationEvent)s.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("IO error: {path} - {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema document is not well-formed: {name} - {details}")]
    SchemaNotWellFormed { name: String, details: String },

    #[error("Not an XML Schema document: {name} - root element is '{root}'")]
    NotASchema { name: String, root: String },

    #[error("Schema set composition failed: {details}")]
    SchemaComposition { details: String },

    #[error("Schema parsing error: {details}")]
    SchemaParsing { details: String },

    #[error("Malformed XML input at line {line}: {details}")]
    MalformedXml { line: i32, details: String },

    #[error("LibXML2 internal error: {0}")]
    LibXml2(LibXml2Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// LibXML2-specific error types
#[derive(Error, Debug)]
pub enum LibXml2Error {
    #[error("Schema parsing failed: {}", errors.join("; "))]
    SchemaParseFailed { errors: Vec<String> },

    #[error("Validation context creation failed")]
    ValidationContextCreationFailed,

    #[error("Document parsing failed at line {line}: {message}")]
    DocumentParseFailed { line: i32, message: String },

    #[error("Input of {size} bytes exceeds the libxml2 buffer limit")]
    InputTooLarge { size: usize },

    #[error("Memory allocation failed in libxml2")]
    MemoryAllocation,

    #[error("Schema validation internal error: code {code}")]
    InternalError { code: i32 },
}

impl From<LibXml2Error> for HarnessError {
    fn from(err: LibXml2Error) -> Self {
        match err {
            LibXml2Error::SchemaParseFailed { errors } => HarnessError::SchemaParsing {
                details: errors.join("; "),
            },
            LibXml2Error::DocumentParseFailed { line, message } => HarnessError::MalformedXml {
                line,
                details: message,
            },
            other => HarnessError::LibXml2(other),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, HarnessError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;
