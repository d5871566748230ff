//! Roster ingestion: header discovery, column lookup and row filtering.
//!
//! Spreadsheet exports usually carry a preamble (course name, cohort, ...)
//! above the real header. The header is the first row with a cell reading
//! `Studentnummer`; everything above it is ignored. Rows without a student
//! number are footer or blank rows and are dropped.

use calamine::{open_workbook_auto, Data, Reader};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::score::parse_score;

/// Marker cell identifying the header row.
pub const HEADER_MARKER: &str = "Studentnummer";

/// Columns the roster must provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    StudentNumber,
    Name,
    AnamLo,
    Verslag,
    Reflectie,
    OnderdeelA,
    OnderdeelB,
    OnderdeelC,
    Totaal,
    Eindscore,
}

impl Column {
    pub const ALL: [Column; 10] = [
        Column::StudentNumber,
        Column::Name,
        Column::AnamLo,
        Column::Verslag,
        Column::Reflectie,
        Column::OnderdeelA,
        Column::OnderdeelB,
        Column::OnderdeelC,
        Column::Totaal,
        Column::Eindscore,
    ];

    /// Header text as it appears in the spreadsheet.
    pub fn header(self) -> &'static str {
        match self {
            Column::StudentNumber => HEADER_MARKER,
            Column::Name => "Naam",
            Column::AnamLo => "Anam/LO",
            Column::Verslag => "Verslag",
            Column::Reflectie => "Reflectie",
            Column::OnderdeelA => "Onderdeel A",
            Column::OnderdeelB => "Onderdeel B",
            Column::OnderdeelC => "Onderdeel C",
            Column::Totaal => "Totaal",
            Column::Eindscore => "Eindscore",
        }
    }
}

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("failed to read spreadsheet {path:?}: {source}")]
    Spreadsheet {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },
    #[error("spreadsheet {0:?} contains no worksheets")]
    NoWorksheet(PathBuf),
    #[error("worksheet `{0}` not found")]
    SheetNotFound(String),
    #[error("could not find a header row containing `{marker}`")]
    MissingHeader { marker: &'static str },
    #[error("header row {row} is missing required columns: {}", .missing.join(", "))]
    MissingColumns { row: usize, missing: Vec<String> },
    #[error("row {row}: invalid student number `{value}`")]
    InvalidStudentNumber { row: usize, value: String },
    #[error("row {row}: column `{column}` has non-numeric value `{value}`")]
    InvalidScore {
        row: usize,
        column: &'static str,
        value: String,
    },
}

/// One student's row from the roster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRecord {
    pub student_number: i64,
    pub name: String,
    pub anam_lo: Option<f64>,
    pub verslag: Option<f64>,
    pub reflectie: Option<f64>,
    pub onderdeel_a: Option<f64>,
    pub onderdeel_b: Option<f64>,
    pub onderdeel_c: Option<f64>,
    pub totaal: Option<f64>,
    pub eindscore: Option<f64>,
}

impl StudentRecord {
    /// Name followed by the student number, as printed on the form.
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.name, self.student_number)
    }
}

/// The filtered student rows of one worksheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Roster {
    /// 1-based sheet row of the header.
    pub header_row: usize,
    pub students: Vec<StudentRecord>,
}

impl Roster {
    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    /// Build a roster from raw cell rows.
    ///
    /// `first_row` is the 0-based sheet row of `rows[0]`, used so that error
    /// messages point at the row a user sees in their spreadsheet.
    pub fn from_rows<R: AsRef<[Data]>>(rows: &[R], first_row: usize) -> Result<Self, RosterError> {
        let header_idx = find_header_row(rows).ok_or_else(|| {
            error!(marker = HEADER_MARKER, "No header row found in roster");
            RosterError::MissingHeader {
                marker: HEADER_MARKER,
            }
        })?;
        let header_row = first_row + header_idx + 1;
        let columns = ColumnMap::from_header(rows[header_idx].as_ref(), header_row)?;
        debug!(header_row, "Located roster header");

        let mut students = Vec::new();
        for (offset, row) in rows[header_idx + 1..].iter().enumerate() {
            let sheet_row = header_row + offset + 1;
            let row = row.as_ref();
            let Some(student_number) =
                student_number(columns.cell(row, Column::StudentNumber), sheet_row)?
            else {
                debug!(row = sheet_row, "Skipping row without student number");
                continue;
            };
            let score = |column: Column| score_cell(columns.cell(row, column), sheet_row, column);
            students.push(StudentRecord {
                student_number,
                name: text_cell(columns.cell(row, Column::Name)),
                anam_lo: score(Column::AnamLo)?,
                verslag: score(Column::Verslag)?,
                reflectie: score(Column::Reflectie)?,
                onderdeel_a: score(Column::OnderdeelA)?,
                onderdeel_b: score(Column::OnderdeelB)?,
                onderdeel_c: score(Column::OnderdeelC)?,
                totaal: score(Column::Totaal)?,
                eindscore: score(Column::Eindscore)?,
            });
        }

        info!(header_row, students = students.len(), "Parsed roster");
        Ok(Roster {
            header_row,
            students,
        })
    }
}

/// Open a spreadsheet and parse the roster from `sheet` (or the first worksheet).
pub fn load_roster(path: impl AsRef<Path>, sheet: Option<&str>) -> Result<Roster, RosterError> {
    let path = path.as_ref();
    info!(roster_path = ?path, sheet = sheet.unwrap_or("<first>"), "Loading roster");

    let spreadsheet_error = |source: calamine::Error| {
        error!(error = %source, roster_path = ?path, "Failed to read roster spreadsheet");
        RosterError::Spreadsheet {
            path: path.to_path_buf(),
            source,
        }
    };

    let mut workbook = open_workbook_auto(path).map_err(spreadsheet_error)?;
    let range = match sheet {
        Some(name) => {
            if !workbook.sheet_names().iter().any(|n| n == name) {
                return Err(RosterError::SheetNotFound(name.to_string()));
            }
            workbook.worksheet_range(name).map_err(spreadsheet_error)?
        }
        None => workbook
            .worksheet_range_at(0)
            .ok_or_else(|| RosterError::NoWorksheet(path.to_path_buf()))?
            .map_err(spreadsheet_error)?,
    };

    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let rows: Vec<&[Data]> = range.rows().collect();
    Roster::from_rows(&rows, first_row)
}

fn find_header_row<R: AsRef<[Data]>>(rows: &[R]) -> Option<usize> {
    rows.iter().position(|row| {
        row.as_ref()
            .iter()
            .any(|cell| matches!(cell, Data::String(s) if s.trim() == HEADER_MARKER))
    })
}

/// Column positions of the required headers within a row.
struct ColumnMap {
    positions: [usize; Column::ALL.len()],
}

impl ColumnMap {
    fn from_header(header: &[Data], row: usize) -> Result<Self, RosterError> {
        let mut positions = [0usize; Column::ALL.len()];
        let mut missing = Vec::new();
        for column in Column::ALL {
            let found = header
                .iter()
                .position(|cell| matches!(cell, Data::String(s) if s.trim() == column.header()));
            match found {
                Some(pos) => positions[column as usize] = pos,
                None => missing.push(column.header().to_string()),
            }
        }
        if !missing.is_empty() {
            error!(row, missing = ?missing, "Roster header is missing required columns");
            return Err(RosterError::MissingColumns { row, missing });
        }
        Ok(Self { positions })
    }

    fn cell<'a>(&self, row: &'a [Data], column: Column) -> &'a Data {
        row.get(self.positions[column as usize])
            .unwrap_or(&Data::Empty)
    }
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn student_number(cell: &Data, row: usize) -> Result<Option<i64>, RosterError> {
    if is_blank(cell) {
        return Ok(None);
    }
    let invalid = || RosterError::InvalidStudentNumber {
        row,
        value: cell.to_string(),
    };
    let number = match cell {
        Data::Int(n) => *n,
        Data::Float(f) if f.fract() == 0.0 && f.is_finite() => *f as i64,
        Data::String(s) => s.trim().parse::<i64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };
    Ok(Some(number))
}

fn score_cell(cell: &Data, row: usize, column: Column) -> Result<Option<f64>, RosterError> {
    let invalid = || RosterError::InvalidScore {
        row,
        column: column.header(),
        value: cell.to_string(),
    };
    match cell {
        Data::Empty => Ok(None),
        Data::Int(n) => Ok(Some(*n as f64)),
        Data::Float(f) => Ok(Some(*f)),
        Data::String(s) => parse_score(s).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn text_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}
