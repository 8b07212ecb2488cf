//! Validation harness: run an XML fragment through a fresh schema set and
//! collect every validation event it raises.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::{ConfigManager, EnvProvider, HarnessConfig, SystemEnvProvider};
use crate::error::Result;
use crate::event::{self, ValidationEvent};
use crate::libxml2::LibXml2Wrapper;
use crate::schema::{SchemaDocument, SchemaSet};

/// Auxiliary schema exposing `Setting_Type` and `ServiceTypeInitializer_Type`
/// through global elements, so those types can be validated without a
/// surrounding `Settings` document.
pub const HELPER_SCHEMA: &str = concat!(
    r#"<?xml version="1.0" encoding="utf-8"?>"#,
    r#"<xs:schema attributeFormDefault="unqualified" elementFormDefault="qualified" xmlns:xs="http://www.w3.org/2001/XMLSchema">"#,
    r#"  <xs:element name="Setting" type="Setting_Type" />"#,
    r#"  <xs:element name="ServiceTypeInitializer" type="ServiceTypeInitializer_Type" />"#,
    r#"</xs:schema>"#,
);

/// Reader configuration applied to every validation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationSettings {
    /// Keep warning-level events; when false only errors are returned
    pub report_warnings: bool,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            report_warnings: true,
        }
    }
}

impl From<&HarnessConfig> for ValidationSettings {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            report_warnings: config.report_warnings,
        }
    }
}

/// Validates fragments against the schema under test, optionally joined by the helper schema.
///
/// Both schema documents are loaded once and shared read-only; a new schema
/// set and event list are built for every call, so calls never observe each
/// other and one harness can serve concurrent tests.
pub struct ValidationHarness {
    schema_under_test: Arc<SchemaDocument>,
    helper_schema: Arc<SchemaDocument>,
    settings: ValidationSettings,
    wrapper: LibXml2Wrapper,
}

impl ValidationHarness {
    pub fn new(
        schema_under_test: Arc<SchemaDocument>,
        helper_schema: Arc<SchemaDocument>,
        settings: ValidationSettings,
    ) -> Self {
        Self {
            schema_under_test,
            helper_schema,
            settings,
            wrapper: LibXml2Wrapper::new(),
        }
    }

    /// Load the schema under test from `config.schema_path` and the inline helper schema.
    ///
    /// A missing schema file is a hard failure.
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        let schema_under_test = SchemaDocument::from_file(&config.schema_path)?;
        let helper_schema = SchemaDocument::from_source("helper schema", HELPER_SCHEMA)?;

        Ok(Self::new(
            Arc::new(schema_under_test),
            Arc::new(helper_schema),
            config.into(),
        ))
    }

    /// Build a harness from layered configuration: defaults, then
    /// `config_file` if given, then `SETTINGS_SCHEMA_*` environment variables.
    pub fn from_environment(config_file: Option<&Path>) -> Result<Self> {
        Self::from_environment_with(&SystemEnvProvider, config_file)
    }

    pub fn from_environment_with(
        env: &impl EnvProvider,
        config_file: Option<&Path>,
    ) -> Result<Self> {
        let config = ConfigManager::load_config_with(env, config_file)?;
        debug!(
            schema_path = %config.schema_path.display(),
            report_warnings = config.report_warnings,
            "loaded harness configuration"
        );
        Self::from_config(&config)
    }

    pub fn settings(&self) -> ValidationSettings {
        self.settings
    }

    /// Validate `input_xml` and return every event in emission order.
    ///
    /// An empty result means the fragment is valid against the active schema
    /// set. Malformed XML, schema compilation failures and engine faults are
    /// returned as errors, never as events.
    pub fn run_validation(
        &self,
        input_xml: &str,
        include_helper_schema: bool,
    ) -> Result<Vec<ValidationEvent>> {
        let mut schemas = SchemaSet::new();
        schemas.add(Arc::clone(&self.schema_under_test));
        if include_helper_schema {
            schemas.add(Arc::clone(&self.helper_schema));
        }

        let compiled = schemas.compile(&self.wrapper)?;
        let document = self.wrapper.parse_document_from_memory(input_xml.as_bytes())?;
        let report = self.wrapper.validate_document(&compiled, &document)?;

        let events: Vec<ValidationEvent> = report
            .diagnostics
            .iter()
            .map(|diagnostic| event::translate(diagnostic, &schemas))
            .filter(|event| self.settings.report_warnings || !event.is_warning())
            .collect();

        debug!(
            include_helper_schema,
            valid = report.is_valid(),
            events = events.len(),
            "validation finished"
        );

        Ok(events)
    }
}
