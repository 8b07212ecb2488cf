//! Schema documents and per-call schema sets.
//!
//! libxml2 compiles one schema document at a time and cannot resolve
//! references between separately compiled schemas. A [`SchemaSet`] therefore
//! composes its members into a single in-memory `xs:schema` document before
//! compiling it, which makes the top-level components of every member visible
//! to every other member.

use std::fs;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::{debug, warn};

use crate::error::{HarnessError, Result};
use crate::libxml2::{CompiledSchema, LibXml2Wrapper};

pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// Schema-level attributes whose value applies to a whole document
const DOCUMENT_DEFAULTS: [&str; 4] = [
    "elementFormDefault",
    "attributeFormDefault",
    "blockDefault",
    "finalDefault",
];

/// Namespace declaration on a schema root; an empty prefix is the default namespace
#[derive(Debug, Clone, PartialEq, Eq)]
struct NamespaceDecl {
    prefix: String,
    uri: String,
}

/// An immutable, inspected XML Schema document
#[derive(Debug)]
pub struct SchemaDocument {
    name: String,
    source: String,
    root_name: String,
    namespaces: Vec<NamespaceDecl>,
    /// Non-namespace root attributes, unescaped
    attributes: Vec<(String, String)>,
    target_namespace: Option<String>,
    content: Range<usize>,
}

impl SchemaDocument {
    /// Load a schema document from disk.
    ///
    /// A missing or unreadable file is a `HarnessError::Io`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| HarnessError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_source(path.display().to_string(), source)
    }

    /// Inspect a schema document held in memory. `name` only labels errors and logs.
    pub fn from_source(name: impl Into<String>, source: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let source = source.into();

        let not_well_formed = |details: String| HarnessError::SchemaNotWellFormed {
            name: name.clone(),
            details,
        };

        let mut reader = Reader::from_str(&source);

        let (root, content) = loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let root = e.into_owned();
                    let span = reader
                        .read_to_end(root.name())
                        .map_err(|e| not_well_formed(e.to_string()))?;
                    let start = usize::try_from(span.start)
                        .map_err(|e| not_well_formed(e.to_string()))?;
                    let end =
                        usize::try_from(span.end).map_err(|e| not_well_formed(e.to_string()))?;
                    break (root, start..end);
                }
                Ok(Event::Empty(e)) => {
                    let at = usize::try_from(reader.buffer_position())
                        .map_err(|e| not_well_formed(e.to_string()))?;
                    break (e.into_owned(), at..at);
                }
                Ok(Event::Eof) => {
                    return Err(not_well_formed("document has no root element".to_string()));
                }
                Ok(Event::Text(t)) if t.iter().all(u8::is_ascii_whitespace) => {}
                Ok(Event::Text(_)) | Ok(Event::CData(_)) => {
                    return Err(not_well_formed(
                        "content before the root element".to_string(),
                    ));
                }
                Ok(_) => {}
                Err(e) => return Err(not_well_formed(e.to_string())),
            }
        };

        let inspected = inspect_root(&root).map_err(not_well_formed)?;

        let root_prefix = root
            .name()
            .prefix()
            .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
            .unwrap_or_default();
        let root_namespace = inspected
            .namespaces
            .iter()
            .find(|ns| ns.prefix == root_prefix)
            .map(|ns| ns.uri.as_str());
        let root_name = String::from_utf8_lossy(root.name().as_ref()).into_owned();

        if root.local_name().as_ref() != b"schema" || root_namespace != Some(XSD_NAMESPACE) {
            return Err(HarnessError::NotASchema {
                name,
                root: root_name,
            });
        }

        debug!(
            schema = %name,
            target_namespace = inspected.target_namespace.as_deref().unwrap_or(""),
            "loaded schema document"
        );

        Ok(SchemaDocument {
            name,
            source,
            root_name,
            namespaces: inspected.namespaces,
            attributes: inspected.attributes,
            target_namespace: inspected.target_namespace,
            content,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `targetNamespace` of the document, `None` for a no-namespace schema
    pub fn target_namespace(&self) -> Option<&str> {
        self.target_namespace.as_deref()
    }

    /// Top-level schema components, verbatim
    pub fn content(&self) -> &str {
        &self.source[self.content.clone()]
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

struct InspectedRoot {
    namespaces: Vec<NamespaceDecl>,
    attributes: Vec<(String, String)>,
    target_namespace: Option<String>,
}

fn inspect_root(root: &BytesStart<'_>) -> std::result::Result<InspectedRoot, String> {
    let mut namespaces = Vec::new();
    let mut attributes = Vec::new();
    let mut target_namespace = None;

    for attr in root.attributes() {
        let attr = attr.map_err(|e| format!("invalid attribute on schema root: {e}"))?;
        let key = std::str::from_utf8(attr.key.as_ref()).map_err(|e| e.to_string())?;
        let raw = std::str::from_utf8(&attr.value).map_err(|e| e.to_string())?;
        let value = unescape(raw).map_err(|e| e.to_string())?.into_owned();

        if key == "xmlns" {
            namespaces.push(NamespaceDecl {
                prefix: String::new(),
                uri: value,
            });
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            namespaces.push(NamespaceDecl {
                prefix: prefix.to_string(),
                uri: value,
            });
        } else {
            if key == "targetNamespace" && !value.is_empty() {
                target_namespace = Some(value.clone());
            }
            attributes.push((key.to_string(), value));
        }
    }

    Ok(InspectedRoot {
        namespaces,
        attributes,
        target_namespace,
    })
}

/// An ordered collection of schema documents presented together to the validator
#[derive(Debug, Default, Clone)]
pub struct SchemaSet {
    documents: Vec<Arc<SchemaDocument>>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document. Adding a document that is already a member is a no-op.
    pub fn add(&mut self, document: Arc<SchemaDocument>) -> &mut Self {
        if !self.documents.iter().any(|d| Arc::ptr_eq(d, &document)) {
            self.documents.push(document);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Distinct target namespaces of the members, in insertion order
    pub fn target_namespaces(&self) -> Vec<Option<&str>> {
        let mut namespaces = Vec::new();
        for ns in self.documents.iter().map(|d| d.target_namespace()) {
            if !namespaces.contains(&ns) {
                namespaces.push(ns);
            }
        }
        namespaces
    }

    /// Whether some member declares components in `namespace`
    pub fn targets_namespace(&self, namespace: Option<&str>) -> bool {
        self.documents
            .iter()
            .any(|d| d.target_namespace() == namespace)
    }

    /// Merge the members into one schema document.
    ///
    /// The root element and schema-level attributes come from the first
    /// member; namespace declarations are the union over all members.
    pub fn compose(&self) -> Result<String> {
        let Some(first) = self.documents.first() else {
            return Err(HarnessError::SchemaComposition {
                details: "schema set is empty".to_string(),
            });
        };

        let mut namespaces: Vec<&NamespaceDecl> = Vec::new();
        for document in &self.documents {
            if document.target_namespace() != first.target_namespace() {
                return Err(HarnessError::SchemaComposition {
                    details: format!(
                        "'{}' targets namespace '{}' but '{}' targets '{}'",
                        document.name(),
                        document.target_namespace().unwrap_or(""),
                        first.name(),
                        first.target_namespace().unwrap_or("")
                    ),
                });
            }

            for decl in &document.namespaces {
                match namespaces.iter().find(|d| d.prefix == decl.prefix).copied() {
                    Some(existing) if existing.uri != decl.uri => {
                        return Err(HarnessError::SchemaComposition {
                            details: format!(
                                "prefix '{}' is bound to '{}' in '{}' and to '{}' elsewhere",
                                decl.prefix,
                                decl.uri,
                                document.name(),
                                existing.uri
                            ),
                        });
                    }
                    Some(_) => {}
                    None => namespaces.push(decl),
                }
            }

            for key in DOCUMENT_DEFAULTS {
                if document.attribute(key) != first.attribute(key) {
                    warn!(
                        schema = document.name(),
                        attribute = key,
                        "schema-level default differs from the first member; the first member's value applies"
                    );
                }
            }
        }

        let mut composed = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<");
        composed.push_str(&first.root_name);
        for decl in namespaces {
            if decl.prefix.is_empty() {
                composed.push_str(&format!(" xmlns=\"{}\"", escape_attribute(&decl.uri)));
            } else {
                composed.push_str(&format!(
                    " xmlns:{}=\"{}\"",
                    decl.prefix,
                    escape_attribute(&decl.uri)
                ));
            }
        }
        for (key, value) in &first.attributes {
            composed.push_str(&format!(" {key}=\"{}\"", escape_attribute(value)));
        }
        composed.push('>');
        for document in &self.documents {
            composed.push('\n');
            composed.push_str(document.content());
        }
        composed.push_str("\n</");
        composed.push_str(&first.root_name);
        composed.push_str(">\n");

        Ok(composed)
    }

    /// Compose and compile the set into a schema libxml2 can validate against
    pub fn compile(&self, wrapper: &LibXml2Wrapper) -> Result<CompiledSchema> {
        let composed = self.compose()?;
        let schema = wrapper.parse_schema_from_memory(composed.as_bytes())?;

        debug!(
            members = self.documents.len(),
            names = ?self.documents.iter().map(|d| d.name()).collect::<Vec<_>>(),
            target_namespaces = ?self.target_namespaces(),
            "compiled schema set"
        );

        Ok(schema)
    }
}

fn escape_attribute(value: &str) -> String {
    quick_xml::escape::escape(value).into_owned()
}
