use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rulescan_xlsx::extract_workbook_rules;

use crate::catalog::error_message;
use crate::config::ScanConfig;
use crate::scan::run_scan;

#[derive(Parser)]
#[command(
    name = "rulescan",
    about = "Catalog and diff rule evidence across versioned XLSX compliance templates."
)]
pub struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a folder of template families and write the report set.
    Scan {
        /// Folder whose subfolders are template families.
        #[arg(long, value_name = "DIR")]
        root: PathBuf,

        /// Output folder. Defaults to `scan-YYYY-MM-DD` in the current directory.
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Skip the XML CF evidence stream, range drift and review flags.
        #[arg(long)]
        skip_xml_cf: bool,

        /// Extract files in parallel (requires the `parallel` build feature).
        #[arg(long)]
        parallel: bool,
    },
    /// Print the sheets of one workbook and the rules found on each.
    Inspect {
        workbook: PathBuf,
    },
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    run_with_args(args)
}

pub fn run_with_args(args: Args) -> Result<()> {
    match args.command {
        Command::Scan {
            root,
            out,
            skip_xml_cf,
            parallel,
        } => {
            let out_dir = out.unwrap_or_else(|| {
                ScanConfig::dated_out_dir(Path::new("."), chrono::Local::now().date_naive())
            });
            let config = ScanConfig {
                template_root: root,
                out_dir,
                skip_xml_cf,
                parallel,
            };
            let summary = run_scan(&config)?;
            println!(
                "Scanned {} file(s) across {} template(s) into {}",
                summary.files_scanned,
                summary.templates,
                config.out_dir.display()
            );
            if summary.files_skipped + summary.sheets_skipped > 0 {
                println!(
                    "Skipped: {} file(s), {} sheet(s) (see skipped.csv)",
                    summary.files_skipped, summary.sheets_skipped
                );
            }
            Ok(())
        }
        Command::Inspect { workbook } => inspect(&workbook),
    }
}

fn inspect(path: &Path) -> Result<()> {
    let extraction = extract_workbook_rules(path)
        .with_context(|| format!("read workbook {}", path.display()))?;

    println!("{}", path.display());
    for sheet in &extraction.sheets {
        let name = &sheet.sheet.name;
        let state = sheet.sheet.state.as_str();
        match &sheet.rules {
            Ok(rules) => println!(
                "  {name} [{state}] {}: cf={} (standard={} extension={}) dv={} formulas={}",
                sheet.sheet.part,
                rules.conditional_formats.len(),
                rules.standard_cf_count(),
                rules.extension_cf_count(),
                rules.data_validations.len(),
                rules.formulas.len()
            ),
            Err(err) => println!(
                "  {name} [{state}] {}: unreadable ({}): {}",
                sheet.sheet.part,
                err.class(),
                error_message(err)
            ),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn scan_flags_parse() {
        let args = Args::try_parse_from([
            "rulescan",
            "scan",
            "--root",
            "templates",
            "--out",
            "out",
            "--skip-xml-cf",
        ])
        .expect("parse");
        match args.command {
            Command::Scan {
                root,
                out,
                skip_xml_cf,
                parallel,
            } => {
                assert_eq!(root, PathBuf::from("templates"));
                assert_eq!(out, Some(PathBuf::from("out")));
                assert!(skip_xml_cf);
                assert!(!parallel);
            }
            Command::Inspect { .. } => panic!("expected scan"),
        }
    }
}
