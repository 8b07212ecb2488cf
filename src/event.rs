//! Validation events and the translation of raw libxml2 diagnostics into them.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use tracing::trace;

use crate::libxml2::{DiagnosticLevel, RawDiagnostic};
use crate::schema::SchemaSet;

/// Classification of a validation event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The document is invalid
    Error,
    /// The document may be valid but schema coverage is incomplete
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "Error"),
            Severity::Warning => write!(f, "Warning"),
        }
    }
}

/// One issue reported while validating a fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationEvent {
    pub severity: Severity,
    pub message: String,
    /// Line in the input fragment, 0 when unknown
    pub line: i32,
}

impl ValidationEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            line: 0,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            line: 0,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl fmt::Display for ValidationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

static CONTEXT_REGEX: OnceLock<Regex> = OnceLock::new();
static EXPECTED_REGEX: OnceLock<Regex> = OnceLock::new();
static QUOTED_REGEX: OnceLock<Regex> = OnceLock::new();

/// `Element '<qname>'[, attribute '<name>']: <detail>`
fn get_context_regex() -> &'static Regex {
    CONTEXT_REGEX.get_or_init(|| {
        Regex::new(r"(?s)^Element '(?P<element>[^']+)'(?:, attribute '(?P<attribute>[^']+)')?: (?P<detail>.*)$")
            .expect("Failed to compile diagnostic context regex")
    })
}

/// `Expected is ( a, b )` / `Expected is one of ( a, b )`
fn get_expected_regex() -> &'static Regex {
    EXPECTED_REGEX.get_or_init(|| {
        Regex::new(r"Expected is (?:one of )?\( (?P<expected>.+?) \)")
            .expect("Failed to compile expected-elements regex")
    })
}

/// First single-quoted token of a detail message
fn get_quoted_regex() -> &'static Regex {
    QUOTED_REGEX.get_or_init(|| {
        Regex::new(r"'(?P<token>[^']+)'").expect("Failed to compile quoted-token regex")
    })
}

/// Element name as libxml2 prints it: `local` or `{namespace}local`
#[derive(Debug, Clone, PartialEq, Eq)]
struct ElementName<'a> {
    namespace: Option<&'a str>,
    local: &'a str,
}

impl<'a> ElementName<'a> {
    fn parse(raw: &'a str) -> Self {
        match raw.strip_prefix('{').and_then(|rest| rest.split_once('}')) {
            Some((namespace, local)) => ElementName {
                namespace: Some(namespace).filter(|ns| !ns.is_empty()),
                local,
            },
            None => ElementName {
                namespace: None,
                local: raw,
            },
        }
    }
}

impl fmt::Display for ElementName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace {
            Some(ns) => write!(f, "{}:{}", ns, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

/// Expected-element lists print namespaced names as `{ns}local`; render them like element names.
fn expected_list(detail: &str) -> Option<String> {
    let caps = get_expected_regex().captures(detail)?;
    let names: Vec<String> = caps["expected"]
        .split(',')
        .map(|n| ElementName::parse(n.trim()).to_string())
        .collect();
    Some(names.join(", "))
}

fn first_quoted(detail: &str) -> Option<&str> {
    get_quoted_regex()
        .captures(detail)
        .and_then(|c| c.name("token"))
        .map(|m| m.as_str())
}

fn passthrough(diagnostic: &RawDiagnostic, severity: Severity, raw: &str) -> (Severity, String) {
    trace!(code = diagnostic.code, line = diagnostic.line, "untranslated diagnostic");
    (severity, raw.to_string())
}

/// Translate one libxml2 diagnostic into a validation event.
///
/// `schemas` decides whether an undeclared root is an error (its namespace is
/// covered by the set) or a warning (nothing in the set targets it).
pub fn translate(diagnostic: &RawDiagnostic, schemas: &SchemaSet) -> ValidationEvent {
    let engine_severity = match diagnostic.level {
        DiagnosticLevel::Warning => Severity::Warning,
        DiagnosticLevel::Error | DiagnosticLevel::Fatal => Severity::Error,
    };

    let raw = diagnostic.message.trim();
    let (severity, message) = match get_context_regex().captures(raw) {
        Some(caps) => {
            let element = ElementName::parse(caps.name("element").map_or("", |m| m.as_str()));
            let detail = caps
                .name("detail")
                .map_or("", |m| m.as_str())
                .trim_end_matches('.');
            translate_detail(&element, detail, diagnostic, schemas)
                .unwrap_or_else(|| passthrough(diagnostic, engine_severity, raw))
        }
        None => passthrough(diagnostic, engine_severity, raw),
    };

    ValidationEvent {
        severity,
        message,
        line: diagnostic.line,
    }
}

fn translate_detail(
    element: &ElementName<'_>,
    detail: &str,
    diagnostic: &RawDiagnostic,
    schemas: &SchemaSet,
) -> Option<(Severity, String)> {
    if detail.starts_with("No matching global declaration available for the validation root") {
        return Some(if schemas.targets_namespace(element.namespace) {
            (
                Severity::Error,
                format!("The '{element}' element is not declared."),
            )
        } else {
            (
                Severity::Warning,
                format!("Could not find schema information for the element '{element}'."),
            )
        });
    }

    if detail.ends_with("is required but missing") {
        let attribute = first_quoted(detail)?;
        return Some((
            Severity::Error,
            format!("The required attribute '{attribute}' is missing."),
        ));
    }

    if detail.starts_with("The attribute") && detail.ends_with("is not allowed") {
        let attribute = first_quoted(detail)?;
        return Some((
            Severity::Error,
            format!("The '{attribute}' attribute is not declared."),
        ));
    }

    if detail.starts_with("This element is not expected") {
        let parent = diagnostic.parent_element.as_deref()?;
        let mut message = format!("The element '{parent}' has invalid child element '{element}'.");
        if let Some(expected) = expected_list(detail) {
            message.push_str(&format!(" List of possible elements expected: '{expected}'."));
        }
        return Some((Severity::Error, message));
    }

    if detail.starts_with("Missing child element(s)") {
        let mut message = format!("The element '{element}' has incomplete content.");
        if let Some(expected) = expected_list(detail) {
            message.push_str(&format!(" List of possible elements expected: '{expected}'."));
        }
        return Some((Severity::Error, message));
    }

    if detail.starts_with("Character content is not allowed, because the content type is empty") {
        return Some((
            Severity::Error,
            format!("The element '{element}' cannot contain text. Content model is empty."),
        ));
    }

    if detail.starts_with("Character content other than whitespace is not allowed") {
        return Some((
            Severity::Error,
            format!("The element '{element}' cannot contain text."),
        ));
    }

    if detail.starts_with("Element content is not allowed, because the content type is empty") {
        return Some((
            Severity::Error,
            format!(
                "The element '{element}' cannot contain child elements. Content model is empty."
            ),
        ));
    }

    None
}
