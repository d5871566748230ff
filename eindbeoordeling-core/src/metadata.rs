//! Common metadata applied identically to every form in a run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Date format printed on the forms and in archive names.
pub const DATE_FORMAT: &str = "%d-%m-%Y";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("examiner name is required")]
    MissingExaminer,
    #[error("unknown attempt type `{0}` (expected `1e` or `herkansing`)")]
    InvalidAttempt(String),
    #[error("invalid date `{0}` (expected dd-mm-yyyy or yyyy-mm-dd)")]
    InvalidDate(String),
}

/// Whether this assessment is the first sitting or a retake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Attempt {
    #[default]
    First,
    Retake,
}

impl Attempt {
    /// Label as printed on the form.
    pub fn label(self) -> &'static str {
        match self {
            Attempt::First => "1e",
            Attempt::Retake => "Herkansing",
        }
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Attempt {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1e" | "1" | "first" | "eerste" => Ok(Attempt::First),
            "herkansing" | "retake" | "2e" => Ok(Attempt::Retake),
            other => Err(MetadataError::InvalidAttempt(other.to_string())),
        }
    }
}

impl TryFrom<String> for Attempt {
    type Error = MetadataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Attempt> for String {
    fn from(value: Attempt) -> Self {
        value.label().to_string()
    }
}

/// Parse an assessment date from `dd-mm-yyyy` or ISO `yyyy-mm-dd`.
pub fn parse_date(raw: &str) -> Result<NaiveDate, MetadataError> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"))
        .map_err(|_| MetadataError::InvalidDate(trimmed.to_string()))
}

/// Examiner, date and attempt type shared by all forms of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonMetadata {
    examiner: String,
    date: NaiveDate,
    attempt: Attempt,
}

impl CommonMetadata {
    pub fn new(
        examiner: impl Into<String>,
        date: NaiveDate,
        attempt: Attempt,
    ) -> Result<Self, MetadataError> {
        let examiner = examiner.into().trim().to_string();
        if examiner.is_empty() {
            return Err(MetadataError::MissingExaminer);
        }
        Ok(Self {
            examiner,
            date,
            attempt,
        })
    }

    pub fn examiner(&self) -> &str {
        &self.examiner
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn attempt(&self) -> Attempt {
        self.attempt
    }

    /// The date as printed on the form, e.g. `16-10-2026`.
    pub fn date_label(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }
}
