//! Minimal `.docx` support: the OPC container, an owned XML tree, and the
//! WordprocessingML table/paragraph operations the forms need.

pub mod document;
pub mod package;
pub mod xml;

pub use document::WordDocument;
pub use package::{DocxPackage, DOCUMENT_PART};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("template is not a valid docx archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("template is missing part `{0}`")]
    MissingPart(String),
    #[error("malformed XML in template: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed XML in template: {0}")]
    MalformedXml(String),
    #[error("I/O error while writing document: {0}")]
    Io(#[from] std::io::Error),
    #[error("template table layout does not match: {0}")]
    Shape(String),
    #[error("table {table} row {row} has no cell {col}")]
    MissingCell { table: usize, row: usize, col: usize },
    #[error("template contains unknown placeholders: {}", .0.join(", "))]
    UnknownPlaceholders(Vec<String>),
}
