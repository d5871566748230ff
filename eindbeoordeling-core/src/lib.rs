#![doc = "eindbeoordeling-core: roster parsing and form generation for eindbeoordeling."]

//! This crate holds the logic behind the `eindbeoordeling` CLI: reading the
//! assessment roster, formatting scores, filling the `.docx` form template
//! and packing one form per student into a ZIP archive.
//!
//! # Usage
//! Build a [`pipeline::GenerationConfig`] and call [`pipeline::generate_forms`],
//! or use the modules directly for finer control.

pub mod docx;
pub mod form;
pub mod generate;
pub mod metadata;
pub mod pipeline;
pub mod roster;
pub mod score;

#[cfg(any(test, feature = "test-export-mocks"))]
pub mod testing;
