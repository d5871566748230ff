//! Batch generation: one form per student, packed into a single ZIP archive.
//!
//! Rendering goes through the [`FormRenderer`] trait so the batch logic
//! (naming, duplicate detection, all-or-nothing packaging) can be tested
//! against a mock. [`FormTemplate`] is the real implementation.

use mockall::automock;
use serde::Serialize;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::docx::TemplateError;
use crate::form::{FormTemplate, FormValues};
use crate::metadata::CommonMetadata;
use crate::roster::{RosterError, StudentRecord};

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Roster(#[from] RosterError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("failed to render form for student {student_number} ({name}): {source}")]
    Render {
        student_number: i64,
        name: String,
        #[source]
        source: TemplateError,
    },
    #[error("two students map to the same archive entry `{0}`")]
    DuplicateEntry(String),
    #[error("failed to build archive: {0}")]
    Archive(#[from] ZipError),
    #[error("failed to write archive {path:?}: {source}")]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Renders one filled form document.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait FormRenderer {
    fn render_form(&self, values: &FormValues) -> Result<Vec<u8>, TemplateError>;
}

impl FormRenderer for FormTemplate {
    fn render_form(&self, values: &FormValues) -> Result<Vec<u8>, TemplateError> {
        self.render(values)
    }
}

/// One document inside the generated archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedEntry {
    pub file_name: String,
    pub student_number: i64,
    pub name: String,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct GeneratedArchive {
    pub bytes: Vec<u8>,
    pub entries: Vec<GeneratedEntry>,
}

/// Make a student name safe for use in a file name: commas and path
/// characters are dropped, whitespace runs become `_`.
pub fn sanitize_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| {
            !c.is_control()
                && !matches!(c, ',' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
        })
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Archive entry name for a student's form.
pub fn document_file_name(student: &StudentRecord) -> String {
    format!(
        "Eindbeoordeling_{}_{}.docx",
        sanitize_name(&student.name),
        student.student_number
    )
}

/// Download name of the archive for a run.
pub fn archive_file_name(common: &CommonMetadata) -> String {
    format!("Eindbeoordelingen_{}.zip", common.date_label())
}

/// Render a form for every student and pack them into a ZIP archive.
///
/// Any failure aborts the run; no partial archive is returned.
pub fn generate_archive<R>(
    renderer: &R,
    students: &[StudentRecord],
    common: &CommonMetadata,
) -> Result<GeneratedArchive, GenerateError>
where
    R: FormRenderer + ?Sized,
{
    info!(students = students.len(), "Generating forms");
    if students.is_empty() {
        warn!("Roster has no students; archive will be empty");
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(students.len());

    for student in students {
        let file_name = document_file_name(student);
        if !seen.insert(file_name.clone()) {
            error!(file_name = %file_name, "Duplicate archive entry");
            return Err(GenerateError::DuplicateEntry(file_name));
        }

        let values = FormValues::new(student, common);
        let document = renderer.render_form(&values).map_err(|source| {
            error!(
                student_number = student.student_number,
                error = %source,
                "Rendering form failed"
            );
            GenerateError::Render {
                student_number: student.student_number,
                name: student.name.clone(),
                source,
            }
        })?;

        zip.start_file(file_name.as_str(), options)?;
        zip.write_all(&document).map_err(ZipError::from)?;
        debug!(file_name = %file_name, size = document.len(), "Added form to archive");

        entries.push(GeneratedEntry {
            file_name,
            student_number: student.student_number,
            name: student.name.clone(),
            size: document.len(),
        });
    }

    let bytes = zip.finish()?.into_inner();
    info!(documents = entries.len(), size = bytes.len(), "Archive assembled");
    Ok(GeneratedArchive { bytes, entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Attempt;
    use chrono::NaiveDate;
    use std::io::Read;
    use zip::ZipArchive;

    fn student(number: i64, name: &str) -> StudentRecord {
        StudentRecord {
            student_number: number,
            name: name.to_string(),
            anam_lo: Some(6.0),
            verslag: Some(6.5),
            reflectie: Some(7.0),
            onderdeel_a: Some(6.0),
            onderdeel_b: Some(6.5),
            onderdeel_c: Some(7.0),
            totaal: Some(19.5),
            eindscore: Some(6.5),
        }
    }

    fn common() -> CommonMetadata {
        CommonMetadata::new(
            "Jan de Vries",
            NaiveDate::from_ymd_opt(2026, 6, 30).unwrap(),
            Attempt::First,
        )
        .unwrap()
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_name("Jansen, Piet"), "Jansen_Piet");
        assert_eq!(sanitize_name("  de  Vries,  Anne-Marie "), "de_Vries_Anne-Marie");
        assert_eq!(sanitize_name("a/b\\c:d*e?f\"g<h>i|j"), "abcdefghij");
        assert_eq!(sanitize_name("Özil, Mesut"), "Özil_Mesut");
    }

    #[test]
    fn whitespace_runs_collapse_to_one_underscore() {
        assert_eq!(sanitize_name("Jansen,  Piet"), "Jansen_Piet");
        assert_eq!(
            document_file_name(&student(500124, "Jansen,  Piet")),
            "Eindbeoordeling_Jansen_Piet_500124.docx"
        );
    }

    #[test]
    fn file_names_follow_pattern() {
        assert_eq!(
            document_file_name(&student(500123, "Jansen, Piet")),
            "Eindbeoordeling_Jansen_Piet_500123.docx"
        );
        assert_eq!(archive_file_name(&common()), "Eindbeoordelingen_30-06-2026.zip");
    }

    #[test]
    fn one_entry_per_student_with_rendered_content() {
        let mut renderer = MockFormRenderer::new();
        renderer
            .expect_render_form()
            .times(3)
            .returning(|values| Ok(values.naam.clone().into_bytes()));

        let students = vec![student(1, "A B"), student(2, "C, D"), student(3, "E")];
        let archive = generate_archive(&renderer, &students, &common()).unwrap();

        let names: Vec<&str> = archive.entries.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Eindbeoordeling_A_B_1.docx",
                "Eindbeoordeling_C_D_2.docx",
                "Eindbeoordeling_E_3.docx"
            ]
        );

        let mut zip = ZipArchive::new(Cursor::new(archive.bytes)).unwrap();
        assert_eq!(zip.len(), 3);
        let mut content = String::new();
        zip.by_name("Eindbeoordeling_C_D_2.docx")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "C, D (2)");
    }

    #[test]
    fn render_failure_aborts_the_run() {
        let mut renderer = MockFormRenderer::new();
        renderer.expect_render_form().returning(|values| {
            if values.studentnummer == "2" {
                Err(TemplateError::MissingCell {
                    table: 1,
                    row: 5,
                    col: 2,
                })
            } else {
                Ok(Vec::new())
            }
        });

        let students = vec![student(1, "A"), student(2, "B"), student(3, "C")];
        let err = generate_archive(&renderer, &students, &common()).unwrap_err();
        match err {
            GenerateError::Render {
                student_number,
                name,
                ..
            } => {
                assert_eq!(student_number, 2);
                assert_eq!(name, "B");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_entries_are_rejected_before_rendering_twice() {
        let mut renderer = MockFormRenderer::new();
        renderer
            .expect_render_form()
            .times(1)
            .returning(|_| Ok(Vec::new()));

        let students = vec![student(7, "Jansen, Piet"), student(7, "Jansen Piet")];
        let err = generate_archive(&renderer, &students, &common()).unwrap_err();
        assert!(
            matches!(err, GenerateError::DuplicateEntry(ref n) if n == "Eindbeoordeling_Jansen_Piet_7.docx")
        );
    }

    #[test]
    fn empty_roster_yields_empty_archive() {
        let renderer = MockFormRenderer::new();
        let archive = generate_archive(&renderer, &[], &common()).unwrap();
        assert!(archive.entries.is_empty());
        let zip = ZipArchive::new(Cursor::new(archive.bytes)).unwrap();
        assert_eq!(zip.len(), 0);
    }
}
