//! LibXML2 FFI wrapper
//!
//! Safe access to the parts of libxml2 the harness needs: schema compilation
//! from memory, in-memory document parsing, and document validation with a
//! structured error sink scoped to a single call.
//!
//! ## Thread Safety
//!
//! - **Initialisation**: guarded by `std::sync::Once`.
//! - **Schema parsing**: NOT thread-safe in libxml2, so every call to
//!   [`LibXml2Wrapper::parse_schema_from_memory`] holds a process-wide lock.
//! - **Validation**: thread-safe for distinct documents; each call creates its
//!   own validation context and error sink, so no lock is taken.
//!
//! Every libxml2 allocation is owned by a guard whose `Drop` frees it, so
//! resources are released on early returns as well as on success.

use std::ffi::CStr;
use std::marker::PhantomData;
use std::sync::{Mutex, Once, PoisonError};

use libc::{c_char, c_int, c_void};
use tracing::trace;

use crate::error::{LibXml2Error, LibXml2Result};

/// Global initialization flag for libxml2
static LIBXML2_INIT: Once = Once::new();

/// Serialises schema compilation across threads
static SCHEMA_PARSE_LOCK: Mutex<()> = Mutex::new(());

/// Parser options for input documents: entities substituted (the schema
/// validator rejects entity-reference nodes), no network access, and no
/// printing of parse errors to stderr (they are read back through
/// `xmlGetLastError`).
const XML_PARSE_NOENT: c_int = 1 << 1;
const XML_PARSE_NOERROR: c_int = 1 << 5;
const XML_PARSE_NOWARNING: c_int = 1 << 6;
const XML_PARSE_NONET: c_int = 1 << 11;
const DOCUMENT_PARSE_OPTIONS: c_int =
    XML_PARSE_NOENT | XML_PARSE_NOERROR | XML_PARSE_NOWARNING | XML_PARSE_NONET;

const XML_ELEMENT_NODE: c_int = 1;
const XML_ATTRIBUTE_NODE: c_int = 2;

const DOCUMENT_URL: &CStr = c"input.xml";

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

/// Leading fields of libxml2's public `xmlNode` struct (tree.h).
///
/// Only ever read through a pointer handed out by libxml2; never constructed.
#[repr(C)]
struct XmlNodeHead {
    _private: *mut c_void,
    node_type: c_int,
    name: *const c_char,
    _children: *mut XmlNodeHead,
    _last: *mut XmlNodeHead,
    parent: *mut XmlNodeHead,
}

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *mut xmlError)>;

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();

    // Schema parsing functions
    pub fn xmlSchemaNewMemParserCtxt(
        buffer: *const c_char,
        size: c_int,
    ) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaSetParserStructuredErrors(
        ctxt: *mut XmlSchemaParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);

    // Document parsing functions
    pub fn xmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);
    pub fn xmlGetLastError() -> *const xmlError;
    pub fn xmlResetLastError();

    // Schema validation functions
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        sherr: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaValidateDoc(ctxt: *const XmlSchemaValidCtxt, doc: *mut XmlDoc) -> c_int;
}

/// Severity level libxml2 attached to a diagnostic (`xmlErrorLevel`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Warning,
    Error,
    Fatal,
}

impl DiagnosticLevel {
    fn from_raw(level: c_int) -> Self {
        match level {
            1 => DiagnosticLevel::Warning,
            3 => DiagnosticLevel::Fatal,
            _ => DiagnosticLevel::Error,
        }
    }
}

/// One diagnostic exactly as libxml2 reported it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDiagnostic {
    pub level: DiagnosticLevel,
    pub(crate) code: i32,
    /// Message text with the trailing newline removed
    pub message: String,
    pub line: i32,
    /// Local name of the parent of the element the diagnostic refers to
    pub parent_element: Option<String>,
}

unsafe fn c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

/// Walks from the reported node to the parent of its owning element.
unsafe fn parent_element_name(node: *mut c_void) -> Option<String> {
    let mut current = node as *const XmlNodeHead;
    if current.is_null() {
        return None;
    }

    unsafe {
        if (*current).node_type == XML_ATTRIBUTE_NODE {
            current = (*current).parent;
            if current.is_null() {
                return None;
            }
        }
        if (*current).node_type != XML_ELEMENT_NODE {
            return None;
        }

        let parent = (*current).parent;
        if parent.is_null() || (*parent).node_type != XML_ELEMENT_NODE {
            return None;
        }
        c_string((*parent).name)
    }
}

/// Callback for libxml2 to report diagnostics (structured)
///
/// `user_data` must point at the `Vec<RawDiagnostic>` owned by the caller
/// that registered this callback.
unsafe extern "C" fn structured_error_callback(user_data: *mut c_void, error: *mut xmlError) {
    if user_data.is_null() || error.is_null() {
        return;
    }

    let sink = unsafe { &mut *(user_data as *mut Vec<RawDiagnostic>) };
    let error = unsafe { &*error };

    let message = unsafe { c_string(error.message) }
        .map(|m| m.trim().to_string())
        .unwrap_or_default();

    trace!(code = error.code, line = error.line, %message, "libxml2 diagnostic");

    sink.push(RawDiagnostic {
        level: DiagnosticLevel::from_raw(error.level),
        code: error.code,
        message,
        line: error.line,
        parent_element: unsafe { parent_element_name(error.node) },
    });
}

/// Compiled libxml2 schema, freed on drop
#[derive(Debug)]
pub struct CompiledSchema {
    ptr: *mut XmlSchema,
    _phantom: PhantomData<XmlSchema>,
}

// Safety: libxml2 documentation states that xmlSchema structures are thread-safe for reading
// See: http://xmlsoft.org/threads.html
unsafe impl Send for CompiledSchema {}
unsafe impl Sync for CompiledSchema {}

impl CompiledSchema {
    pub(crate) fn as_ptr(&self) -> *const XmlSchema {
        self.ptr
    }
}

impl Drop for CompiledSchema {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                xmlSchemaFree(self.ptr);
            }
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// Parsed input document, freed on drop
#[derive(Debug)]
pub struct ParsedDocument {
    ptr: *mut XmlDoc,
}

impl Drop for ParsedDocument {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                xmlFreeDoc(self.ptr);
            }
        }
    }
}

struct ParserCtxtGuard(*mut XmlSchemaParserCtxt);

impl Drop for ParserCtxtGuard {
    fn drop(&mut self) {
        unsafe { xmlSchemaFreeParserCtxt(self.0) }
    }
}

struct ValidCtxtGuard(*mut XmlSchemaValidCtxt);

impl Drop for ValidCtxtGuard {
    fn drop(&mut self) {
        unsafe { xmlSchemaFreeValidCtxt(self.0) }
    }
}

/// Outcome of validating one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// libxml2 return code: 0 when valid, the error count otherwise
    pub(crate) code: i32,
    /// Diagnostics in the order libxml2 emitted them
    pub diagnostics: Vec<RawDiagnostic>,
}

impl ValidationReport {
    /// Build a report from a libxml2 return code and captured diagnostics.
    /// Negative codes are internal libxml2 failures.
    pub fn from_code(code: c_int, diagnostics: Vec<RawDiagnostic>) -> LibXml2Result<Self> {
        if code < 0 {
            return Err(LibXml2Error::InternalError { code });
        }
        Ok(ValidationReport { code, diagnostics })
    }

    pub fn is_valid(&self) -> bool {
        self.code == 0
    }
}

fn buffer_len(data: &[u8]) -> LibXml2Result<c_int> {
    c_int::try_from(data.len()).map_err(|_| LibXml2Error::InputTooLarge { size: data.len() })
}

/// Safe entry point to libxml2
pub struct LibXml2Wrapper {
    _phantom: PhantomData<()>,
}

impl Default for LibXml2Wrapper {
    fn default() -> Self {
        Self::new()
    }
}

impl LibXml2Wrapper {
    /// Create a wrapper, initialising libxml2 on first use.
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
        });

        LibXml2Wrapper {
            _phantom: PhantomData,
        }
    }

    /// Compile a schema document held in memory.
    ///
    /// # Errors
    ///
    /// Returns `LibXml2Error::SchemaParseFailed` with every diagnostic the
    /// schema parser reported if the document is not a usable schema.
    pub fn parse_schema_from_memory(&self, schema_data: &[u8]) -> LibXml2Result<CompiledSchema> {
        let size = buffer_len(schema_data)?;
        let _lock = SCHEMA_PARSE_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut diagnostics: Vec<RawDiagnostic> = Vec::new();

        let schema_ptr = unsafe {
            let parser_ctxt =
                xmlSchemaNewMemParserCtxt(schema_data.as_ptr() as *const c_char, size);
            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }
            let parser_ctxt = ParserCtxtGuard(parser_ctxt);

            xmlSchemaSetParserStructuredErrors(
                parser_ctxt.0,
                Some(structured_error_callback),
                &mut diagnostics as *mut Vec<RawDiagnostic> as *mut c_void,
            );

            xmlSchemaParse(parser_ctxt.0)
        };

        if schema_ptr.is_null() {
            return Err(LibXml2Error::SchemaParseFailed {
                errors: diagnostics.into_iter().map(|d| d.message).collect(),
            });
        }

        Ok(CompiledSchema {
            ptr: schema_ptr,
            _phantom: PhantomData,
        })
    }

    /// Parse an input document held in memory.
    ///
    /// # Errors
    ///
    /// Returns `LibXml2Error::DocumentParseFailed` when the input is not
    /// well-formed XML.
    pub fn parse_document_from_memory(&self, content: &[u8]) -> LibXml2Result<ParsedDocument> {
        let size = buffer_len(content)?;

        unsafe {
            xmlResetLastError();
            let doc = xmlReadMemory(
                content.as_ptr() as *const c_char,
                size,
                DOCUMENT_URL.as_ptr(),
                std::ptr::null(),
                DOCUMENT_PARSE_OPTIONS,
            );

            if doc.is_null() {
                let last = xmlGetLastError();
                let (line, message) = if last.is_null() {
                    (0, "unknown parse error".to_string())
                } else {
                    let message = c_string((*last).message)
                        .map(|m| m.trim().to_string())
                        .unwrap_or_else(|| "unknown parse error".to_string());
                    ((*last).line, message)
                };
                xmlResetLastError();
                return Err(LibXml2Error::DocumentParseFailed { line, message });
            }

            Ok(ParsedDocument { ptr: doc })
        }
    }

    /// Validate a parsed document against a compiled schema.
    ///
    /// Diagnostics go to a sink owned by this call, so concurrent or repeated
    /// calls never observe each other's output.
    pub fn validate_document(
        &self,
        schema: &CompiledSchema,
        document: &ParsedDocument,
    ) -> LibXml2Result<ValidationReport> {
        let mut diagnostics: Vec<RawDiagnostic> = Vec::new();

        let code = unsafe {
            let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
            if valid_ctxt.is_null() {
                return Err(LibXml2Error::ValidationContextCreationFailed);
            }
            let valid_ctxt = ValidCtxtGuard(valid_ctxt);

            xmlSchemaSetValidStructuredErrors(
                valid_ctxt.0,
                Some(structured_error_callback),
                &mut diagnostics as *mut Vec<RawDiagnostic> as *mut c_void,
            );

            xmlSchemaValidateDoc(valid_ctxt.0, document.ptr)
        };

        ValidationReport::from_code(code, diagnostics)
    }
}
