//! End-to-end generation run: roster + template in, archive file out.

use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{error, info};

use crate::form::{FillMode, FormTemplate};
use crate::generate::{archive_file_name, generate_archive, GenerateError, GeneratedEntry};
use crate::metadata::CommonMetadata;
use crate::roster::{load_roster, Roster};

/// Everything one run needs.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub roster: PathBuf,
    pub sheet: Option<String>,
    pub template: PathBuf,
    /// Target file or directory. `None` writes into the working directory.
    pub output: Option<PathBuf>,
    pub metadata: CommonMetadata,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub output_path: PathBuf,
    pub archive_name: String,
    pub students: usize,
    pub mode: FillMode,
    pub entries: Vec<GeneratedEntry>,
}

/// Load the roster and template, render every form and write the archive.
///
/// Roster and template are both validated before any document is rendered,
/// and the archive only appears on disk once every form succeeded.
pub fn generate_forms(config: &GenerationConfig) -> Result<GenerationReport, GenerateError> {
    let roster = load_roster(&config.roster, config.sheet.as_deref())?;
    let template = FormTemplate::open(&config.template)?;

    let archive = generate_archive(&template, &roster.students, &config.metadata)?;

    let archive_name = archive_file_name(&config.metadata);
    let output_path = resolve_output_path(config.output.as_deref(), &archive_name);
    write_atomically(&output_path, &archive.bytes)?;

    info!(
        output_path = ?output_path,
        documents = archive.entries.len(),
        "Archive written"
    );
    Ok(GenerationReport {
        output_path,
        archive_name,
        students: roster.len(),
        mode: template.mode(),
        entries: archive.entries,
    })
}

/// Load a roster for display without touching any template.
pub fn preview_roster(path: &Path, sheet: Option<&str>) -> Result<Roster, GenerateError> {
    Ok(load_roster(path, sheet)?)
}

/// Where the archive goes: an existing directory gets the default archive
/// name appended, anything else is taken as the file path.
pub fn resolve_output_path(output: Option<&Path>, archive_name: &str) -> PathBuf {
    match output {
        None => PathBuf::from(archive_name),
        Some(dir) if dir.is_dir() => dir.join(archive_name),
        Some(path) => path.to_path_buf(),
    }
}

/// Write via a temp file in the target directory, then rename into place.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), GenerateError> {
    let to_write_error = |source: std::io::Error| {
        error!(error = %source, output_path = ?path, "Failed to write archive");
        GenerateError::Write {
            path: path.to_path_buf(),
            source,
        }
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(parent).map_err(to_write_error)?;
    file.write_all(bytes).map_err(to_write_error)?;
    file.persist(path).map_err(|e| to_write_error(e.error))?;
    Ok(())
}
