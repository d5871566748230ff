//! Shared fixtures: roster workbooks written with `rust_xlsxwriter`.

#![allow(dead_code)]

use rust_xlsxwriter::Workbook;
use std::path::{Path, PathBuf};

pub const HEADERS: [&str; 10] = [
    "Studentnummer",
    "Naam",
    "Anam/LO",
    "Verslag",
    "Reflectie",
    "Onderdeel A",
    "Onderdeel B",
    "Onderdeel C",
    "Totaal",
    "Eindscore",
];

/// A roster row: number, name and the eight scores in header order.
pub struct Row {
    pub number: Option<f64>,
    pub name: &'static str,
    pub scores: [Option<f64>; 8],
}

pub fn student(number: u32, name: &'static str, eindscore: f64) -> Row {
    Row {
        number: Some(number as f64),
        name,
        scores: [
            Some(6.0),
            Some(7.5),
            Some(8.25),
            Some(6.0),
            Some(7.0),
            Some(8.0),
            Some(21.0),
            Some(eindscore),
        ],
    }
}

/// Write a workbook with a two-line preamble above the header.
pub fn write_roster(dir: &Path, rows: &[Row]) -> PathBuf {
    let path = dir.join("roster.xlsx");
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Cijfers").unwrap();
    sheet.write_string(0, 0, "KH1 AGZ PvB").unwrap();
    sheet.write_string(1, 0, "Cohort 2026").unwrap();

    let header_row = 3;
    for (col, header) in HEADERS.iter().enumerate() {
        sheet.write_string(header_row, col as u16, *header).unwrap();
    }
    for (i, row) in rows.iter().enumerate() {
        let r = header_row + 1 + i as u32;
        if let Some(number) = row.number {
            sheet.write_number(r, 0, number).unwrap();
        }
        sheet.write_string(r, 1, row.name).unwrap();
        for (j, score) in row.scores.iter().enumerate() {
            if let Some(score) = score {
                sheet.write_number(r, 2 + j as u16, *score).unwrap();
            }
        }
    }
    workbook.save(&path).unwrap();
    path
}
