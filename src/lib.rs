//! # settings-schema
//!
//! Validation harness for the `Settings.xsd` configuration schema. Literal XML
//! fragments are validated through libxml2 against the schema under test,
//! optionally combined with a helper schema, and the resulting validation
//! events are returned for assertion.

pub mod config;
pub mod error;
pub mod event;
pub mod harness;
pub mod libxml2;
pub mod schema;

pub use config::{ConfigError, ConfigManager, EnvProvider, HarnessConfig, SystemEnvProvider};
pub use error::{HarnessError, LibXml2Error, Result};
pub use event::{Severity, ValidationEvent};
pub use harness::{HELPER_SCHEMA, ValidationHarness, ValidationSettings};
pub use libxml2::{CompiledSchema, LibXml2Wrapper, ValidationReport};
pub use schema::{SchemaDocument, SchemaSet};
