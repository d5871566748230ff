///
/// This module implements the CLI interface for eindbeoordeling: command parsing,
/// argument resolution against the config file, and user-visible output.
///
/// All business logic (roster parsing, template filling, archive assembly) lives in the
/// [`eindbeoordeling-core`] crate. This module is CLI glue only.
///
/// ## How To Use
/// - For command-line users: use the installed `eindbeoordeling` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`eindbeoordeling-core`]: ../../eindbeoordeling-core/
use crate::load_config::{load_config, resolve_template};
use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use eindbeoordeling_core::metadata::{parse_date, Attempt, CommonMetadata};
use eindbeoordeling_core::pipeline::{generate_forms, preview_roster, GenerationConfig};
use eindbeoordeling_core::score::format_score;
use serde::Serialize;
use std::path::PathBuf;

/// CLI for eindbeoordeling: fill the assessment form for every student on a roster.
#[derive(Parser)]
#[clap(
    name = "eindbeoordeling",
    version,
    about = "Generate Eindbeoordeling forms (KH1 AGZ PvB) from a roster spreadsheet"
)]
pub struct Cli {
    /// Print machine-readable JSON on stdout
    #[clap(long, global = true)]
    pub json: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fill one form per student and write them to a ZIP archive
    Generate(GenerateArgs),
    /// Show the students that would get a form
    Preview {
        /// Roster spreadsheet (.xlsx, .xls, .ods)
        #[clap(long)]
        roster: PathBuf,
        /// Worksheet to read instead of the first one
        #[clap(long)]
        sheet: Option<String>,
    },
}

#[derive(Args, Debug, Default)]
pub struct GenerateArgs {
    /// Roster spreadsheet (.xlsx, .xls, .ods)
    #[clap(long)]
    pub roster: PathBuf,
    /// Examiner name printed on every form
    #[clap(long)]
    pub examiner: Option<String>,
    /// Assessment date, dd-mm-yyyy (defaults to today)
    #[clap(long)]
    pub date: Option<String>,
    /// Attempt type: 1e or herkansing
    #[clap(long)]
    pub attempt: Option<Attempt>,
    /// Form template (.docx)
    #[clap(long)]
    pub template: Option<PathBuf>,
    /// Output archive path, or a directory to place it in
    #[clap(long)]
    pub output: Option<PathBuf>,
    /// Worksheet to read instead of the first one
    #[clap(long)]
    pub sheet: Option<String>,
    /// Path to a YAML file with defaults
    #[clap(long)]
    pub config: Option<PathBuf>,
}

#[derive(Serialize)]
struct JsonOut<T: Serialize> {
    ok: bool,
    data: T,
}

fn print_json<T: Serialize>(data: T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(&JsonOut { ok: true, data })?
    );
    Ok(())
}

#[derive(Serialize)]
struct PreviewRow<'a> {
    student_number: i64,
    name: &'a str,
    eindscore: String,
}

/// Merge flags with the config file into a ready-to-run generation config.
pub fn resolve_generation(args: GenerateArgs) -> Result<GenerationConfig> {
    let config = match &args.config {
        Some(path) => Some(load_config(path)?),
        None => None,
    };
    let defaults = config.clone().unwrap_or_default();

    let template = resolve_template(args.template, config.as_ref());
    let examiner = args.examiner.or(defaults.examiner).unwrap_or_default();
    let attempt = args.attempt.or(defaults.attempt).unwrap_or_default();
    let date = match args.date {
        Some(raw) => parse_date(&raw).context("Invalid --date")?,
        None => Local::now().date_naive(),
    };
    let metadata = CommonMetadata::new(examiner, date, attempt)
        .context("An examiner name is required (--examiner or `examiner:` in the config)")?;

    Ok(GenerationConfig {
        roster: args.roster,
        sheet: args.sheet.or(defaults.sheet),
        template,
        output: args.output.or(defaults.output_dir),
        metadata,
    })
}

/// CLI logic entrypoint for integration tests and main()
pub fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Generate(args) => {
            let config = resolve_generation(args)?;
            tracing::info!(
                command = "generate",
                roster = ?config.roster,
                template = ?config.template,
                "Starting form generation"
            );
            match generate_forms(&config) {
                Ok(report) => {
                    tracing::info!(
                        command = "generate",
                        documents = report.entries.len(),
                        "Generation complete"
                    );
                    if cli.json {
                        print_json(&report)?;
                    } else {
                        for entry in &report.entries {
                            println!("{}", entry.file_name);
                        }
                        println!(
                            "{} forms written to {}",
                            report.entries.len(),
                            report.output_path.display()
                        );
                    }
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "generate", error = %e, "Generation failed");
                    Err(anyhow::Error::new(e).context("Generating forms failed"))
                }
            }
        }
        Commands::Preview { roster, sheet } => {
            let loaded = preview_roster(&roster, sheet.as_deref())
                .with_context(|| format!("Reading roster {}", roster.display()))?;
            tracing::info!(command = "preview", students = loaded.len(), "Roster loaded");
            let rows: Vec<PreviewRow> = loaded
                .students
                .iter()
                .map(|s| PreviewRow {
                    student_number: s.student_number,
                    name: &s.name,
                    eindscore: format_score(s.eindscore),
                })
                .collect();
            if cli.json {
                print_json(&rows)?;
            } else {
                println!("Header found on row {}", loaded.header_row);
                for row in &rows {
                    println!("{}\t{}\t{}", row.student_number, row.name, row.eindscore);
                }
                println!("{} students", rows.len());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_and_defaults_apply() {
        let args = GenerateArgs {
            roster: PathBuf::from("roster.xlsx"),
            examiner: Some("  Jan de Vries ".to_string()),
            date: Some("03-07-2026".to_string()),
            attempt: Some(Attempt::Retake),
            template: Some(PathBuf::from("form.docx")),
            ..Default::default()
        };
        let config = resolve_generation(args).unwrap();
        assert_eq!(config.template, PathBuf::from("form.docx"));
        assert_eq!(config.metadata.examiner(), "Jan de Vries");
        assert_eq!(config.metadata.date_label(), "03-07-2026");
        assert_eq!(config.metadata.attempt(), Attempt::Retake);
        assert_eq!(config.output, None);
    }

    #[test]
    fn missing_examiner_is_an_error() {
        let args = GenerateArgs {
            roster: PathBuf::from("roster.xlsx"),
            template: Some(PathBuf::from("form.docx")),
            ..Default::default()
        };
        let err = resolve_generation(args).unwrap_err();
        assert!(format!("{err:#}").contains("examiner"), "got: {err:#}");
    }

    #[test]
    fn invalid_date_is_an_error() {
        let args = GenerateArgs {
            roster: PathBuf::from("roster.xlsx"),
            examiner: Some("X".to_string()),
            date: Some("31-02-2026".to_string()),
            template: Some(PathBuf::from("form.docx")),
            ..Default::default()
        };
        assert!(resolve_generation(args).is_err());
    }

    #[test]
    fn cli_parses_generate_flags() {
        let cli = Cli::try_parse_from([
            "eindbeoordeling",
            "--json",
            "generate",
            "--roster",
            "r.xlsx",
            "--examiner",
            "Jan",
            "--attempt",
            "herkansing",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.roster, PathBuf::from("r.xlsx"));
                assert_eq!(args.attempt, Some(Attempt::Retake));
            }
            Commands::Preview { .. } => panic!("expected generate"),
        }
    }

    #[test]
    fn unknown_attempt_is_rejected_by_parser() {
        let result = Cli::try_parse_from([
            "eindbeoordeling",
            "generate",
            "--roster",
            "r.xlsx",
            "--attempt",
            "derde",
        ]);
        assert!(result.is_err());
    }
}
