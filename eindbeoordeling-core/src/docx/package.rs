//! The `.docx` container: a ZIP of XML parts.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use tracing::{debug, error, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::TemplateError;

/// Main document part of a WordprocessingML package.
pub const DOCUMENT_PART: &str = "word/document.xml";

/// A `.docx` file held in memory, read once per run.
#[derive(Debug, Clone)]
pub struct DocxPackage {
    bytes: Vec<u8>,
    part_names: Vec<String>,
}

impl DocxPackage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        info!(template_path = ?path, "Reading template");
        let bytes = fs::read(path).map_err(|source| {
            error!(error = %source, template_path = ?path, "Failed to read template file");
            TemplateError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, TemplateError> {
        let part_names: Vec<String> = {
            let archive = ZipArchive::new(Cursor::new(bytes.as_slice()))?;
            archive.file_names().map(str::to_string).collect()
        };
        if !part_names.iter().any(|n| n == DOCUMENT_PART) {
            return Err(TemplateError::MissingPart(DOCUMENT_PART.to_string()));
        }
        debug!(parts = part_names.len(), "Template package opened");
        Ok(Self { bytes, part_names })
    }

    pub fn part_names(&self) -> &[String] {
        &self.part_names
    }

    pub fn read_part(&self, name: &str) -> Result<Vec<u8>, TemplateError> {
        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
        let mut file = match archive.by_name(name) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(TemplateError::MissingPart(name.to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        let mut out = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Write a copy of the package with some parts replaced. Untouched parts
    /// are raw-copied without recompression.
    pub fn with_replaced_parts(
        &self,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> Result<Vec<u8>, TemplateError> {
        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for i in 0..archive.len() {
            let file = archive.by_index(i)?;
            let name = file.name().to_string();
            match replacements.get(&name) {
                Some(bytes) => {
                    zip.start_file(name, options)?;
                    zip.write_all(bytes)?;
                }
                None => zip.raw_copy_file(file)?,
            }
        }

        Ok(zip.finish()?.into_inner())
    }
}
