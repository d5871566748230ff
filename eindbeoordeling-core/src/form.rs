//! Filling the assessment form for one student.
//!
//! Two template styles are supported:
//!
//! - **Placeholders**: the template text carries `{{ key }}` markers (see
//!   [`PLACEHOLDER_KEYS`]), filled by name wherever they appear in the body,
//!   headers or footers.
//! - **Table layout**: the original form without markers. Values go into
//!   fixed cells of two tables, and the sub-assessment label cells get their
//!   trailing score swapped (see [`substitute_trailing_score`]).
//!
//! The style is picked once when the template is loaded, and the template is
//! validated at that point so a mismatched form fails before any document is
//! produced.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, error, info};

use crate::docx::{DocxPackage, TemplateError, WordDocument, DOCUMENT_PART};
use crate::metadata::CommonMetadata;
use crate::roster::StudentRecord;
use crate::score::format_score;

/// Keys accepted inside `{{ ... }}` markers.
pub const PLACEHOLDER_KEYS: [&str; 14] = [
    "naam",
    "student_naam",
    "studentnummer",
    "examinator",
    "datum",
    "gelegenheid",
    "eindscore",
    "anam_lo",
    "verslag",
    "reflectie",
    "onderdeel_a",
    "onderdeel_b",
    "onderdeel_c",
    "totaal",
];

/// The rendered strings for one student's form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormValues {
    /// Name followed by the student number in parentheses.
    pub naam: String,
    pub student_naam: String,
    pub studentnummer: String,
    pub examinator: String,
    pub datum: String,
    pub gelegenheid: String,
    pub eindscore: String,
    pub anam_lo: String,
    pub verslag: String,
    pub reflectie: String,
    pub onderdeel_a: String,
    pub onderdeel_b: String,
    pub onderdeel_c: String,
    pub totaal: String,
}

impl FormValues {
    pub fn new(student: &StudentRecord, common: &CommonMetadata) -> Self {
        Self {
            naam: student.display_name(),
            student_naam: student.name.clone(),
            studentnummer: student.student_number.to_string(),
            examinator: common.examiner().to_string(),
            datum: common.date_label(),
            gelegenheid: common.attempt().label().to_string(),
            eindscore: format_score(student.eindscore),
            anam_lo: format_score(student.anam_lo),
            verslag: format_score(student.verslag),
            reflectie: format_score(student.reflectie),
            onderdeel_a: format_score(student.onderdeel_a),
            onderdeel_b: format_score(student.onderdeel_b),
            onderdeel_c: format_score(student.onderdeel_c),
            totaal: format_score(student.totaal),
        }
    }

    /// Value for a placeholder key.
    pub fn get(&self, key: &str) -> Option<&str> {
        let value = match key {
            "naam" => &self.naam,
            "student_naam" => &self.student_naam,
            "studentnummer" => &self.studentnummer,
            "examinator" => &self.examinator,
            "datum" => &self.datum,
            "gelegenheid" => &self.gelegenheid,
            "eindscore" => &self.eindscore,
            "anam_lo" => &self.anam_lo,
            "verslag" => &self.verslag,
            "reflectie" => &self.reflectie,
            "onderdeel_a" => &self.onderdeel_a,
            "onderdeel_b" => &self.onderdeel_b,
            "onderdeel_c" => &self.onderdeel_c,
            "totaal" => &self.totaal,
            _ => return None,
        };
        Some(value.as_str())
    }
}

fn trailing_score_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+[,.]\d+$").expect("valid regex"))
}

/// Put `score` at the end of a label cell.
///
/// When the trimmed text already ends in a score (`5,7`, `6.0`), only that
/// number is replaced and the label before it is kept verbatim. Otherwise
/// the score is appended after two spaces.
pub fn substitute_trailing_score(cell_text: &str, score: &str) -> String {
    let trimmed = cell_text.trim();
    match trailing_score_pattern().find(trimmed) {
        Some(m) => format!("{}{}", &trimmed[..m.start()], score),
        None => format!("{}  {}", cell_text.trim_end(), score),
    }
}

/// How values are placed into the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    Placeholders,
    TableLayout,
}

// Fixed layout of the marker-less form.
const INFO_TABLE: usize = 0;
const INFO_ROWS: usize = 5;
const INFO_VALUE_COL: usize = 1;
const SCORE_TABLE: usize = 1;
const SCORE_ROWS: usize = 6;
const SCORE_LABEL_COL: usize = 0;
const SCORE_VALUE_COL: usize = 2;
const SUB_ASSESSMENT_ROWS: [usize; 3] = [2, 3, 4];
const TOTAL_ROW: usize = 5;

/// Check that the document has the two tables the marker-less form needs.
pub fn validate_table_layout(document: &WordDocument) -> Result<(), TemplateError> {
    let shapes = document.table_shapes();
    let shape_error = |msg: String| {
        error!(detail = %msg, "Template table layout mismatch");
        TemplateError::Shape(msg)
    };

    if shapes.len() < 2 {
        return Err(shape_error(format!(
            "expected at least 2 tables, found {}",
            shapes.len()
        )));
    }

    let info = &shapes[INFO_TABLE];
    if info.len() != INFO_ROWS {
        return Err(shape_error(format!(
            "table 1 has {} rows, expected {INFO_ROWS}",
            info.len()
        )));
    }
    for (row, cells) in info.iter().enumerate() {
        if *cells <= INFO_VALUE_COL {
            return Err(shape_error(format!(
                "table 1 row {row} has {cells} cells, expected at least {}",
                INFO_VALUE_COL + 1
            )));
        }
    }

    let scores = &shapes[SCORE_TABLE];
    if scores.len() != SCORE_ROWS {
        return Err(shape_error(format!(
            "table 2 has {} rows, expected {SCORE_ROWS}",
            scores.len()
        )));
    }
    for row in SUB_ASSESSMENT_ROWS.into_iter().chain([TOTAL_ROW]) {
        let cells = scores[row];
        if cells <= SCORE_VALUE_COL {
            return Err(shape_error(format!(
                "table 2 row {row} has {cells} cells, expected at least {}",
                SCORE_VALUE_COL + 1
            )));
        }
    }
    Ok(())
}

/// Write one student's values into the fixed table layout.
pub fn fill_table_layout(
    document: &mut WordDocument,
    values: &FormValues,
) -> Result<(), TemplateError> {
    let info = [
        &values.naam,
        &values.examinator,
        &values.datum,
        &values.gelegenheid,
        &values.eindscore,
    ];
    for (row, value) in info.into_iter().enumerate() {
        document.set_cell_text(INFO_TABLE, row, INFO_VALUE_COL, value)?;
    }

    let sub_assessments = [
        (&values.anam_lo, &values.onderdeel_a),
        (&values.verslag, &values.onderdeel_b),
        (&values.reflectie, &values.onderdeel_c),
    ];
    for (row, (label_score, part_score)) in SUB_ASSESSMENT_ROWS.into_iter().zip(sub_assessments) {
        let label = document
            .cell_text(SCORE_TABLE, row, SCORE_LABEL_COL)
            .ok_or(TemplateError::MissingCell {
                table: SCORE_TABLE,
                row,
                col: SCORE_LABEL_COL,
            })?;
        let updated = substitute_trailing_score(&label, label_score);
        debug!(row, from = %label, to = %updated, "Substituted sub-assessment score");
        document.set_cell_text(SCORE_TABLE, row, SCORE_LABEL_COL, &updated)?;
        document.set_cell_text(SCORE_TABLE, row, SCORE_VALUE_COL, part_score)?;
    }

    document.set_cell_text(SCORE_TABLE, TOTAL_ROW, SCORE_VALUE_COL, &values.totaal)
}

fn is_header_or_footer(name: &str) -> bool {
    name.strip_prefix("word/")
        .map(|rest| {
            (rest.starts_with("header") || rest.starts_with("footer"))
                && rest.ends_with(".xml")
                && !rest.contains('/')
        })
        .unwrap_or(false)
}

/// A validated form template, loaded once and rendered per student.
#[derive(Debug, Clone)]
pub struct FormTemplate {
    package: DocxPackage,
    document: WordDocument,
    /// Header/footer parts that carry placeholders.
    extra_parts: Vec<(String, WordDocument)>,
    mode: FillMode,
}

impl FormTemplate {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        Self::from_package(DocxPackage::open(path)?)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, TemplateError> {
        Self::from_package(DocxPackage::from_bytes(bytes)?)
    }

    fn from_package(package: DocxPackage) -> Result<Self, TemplateError> {
        let document = WordDocument::parse(&package.read_part(DOCUMENT_PART)?)?;

        let mut extra_parts = Vec::new();
        for name in package.part_names().iter().filter(|n| is_header_or_footer(n)) {
            let part = WordDocument::parse(&package.read_part(name)?)?;
            if !part.placeholders().is_empty() {
                extra_parts.push((name.clone(), part));
            }
        }

        let mut keys = document.placeholders();
        for (_, part) in &extra_parts {
            keys.extend(part.placeholders());
        }

        let mode = if keys.is_empty() {
            validate_table_layout(&document)?;
            FillMode::TableLayout
        } else {
            let unknown: Vec<String> = keys
                .iter()
                .filter(|k| !PLACEHOLDER_KEYS.contains(&k.as_str()))
                .cloned()
                .collect();
            if !unknown.is_empty() {
                error!(unknown = ?unknown, "Template uses unknown placeholders");
                return Err(TemplateError::UnknownPlaceholders(unknown));
            }
            FillMode::Placeholders
        };

        info!(?mode, placeholders = keys.len(), "Template validated");
        Ok(Self {
            package,
            document,
            extra_parts,
            mode,
        })
    }

    pub fn mode(&self) -> FillMode {
        self.mode
    }

    /// Produce a filled `.docx` for one student.
    pub fn render(&self, values: &FormValues) -> Result<Vec<u8>, TemplateError> {
        let mut replacements = HashMap::new();
        match self.mode {
            FillMode::TableLayout => {
                let mut document = self.document.clone();
                fill_table_layout(&mut document, values)?;
                replacements.insert(DOCUMENT_PART.to_string(), document.to_bytes()?);
            }
            FillMode::Placeholders => {
                let parts = std::iter::once((DOCUMENT_PART, &self.document))
                    .chain(self.extra_parts.iter().map(|(n, d)| (n.as_str(), d)));
                for (name, part) in parts {
                    let mut part = part.clone();
                    if part.replace_placeholders(|key| values.get(key))? > 0 {
                        replacements.insert(name.to_string(), part.to_bytes()?);
                    }
                }
            }
        }
        self.package.with_replaced_parts(&replacements)
    }
}
