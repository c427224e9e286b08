//! Output rendering
//!
//! Decoded calls render as a text table, JSON or CSV, to stdout or to a
//! timestamped file under the data dir (`exports/`).

mod csv_export;
mod json_export;

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use crate::app::DecodeReport;
use crate::domain::abi::AbiDefinition;

pub use csv_export::write_args;
pub use json_export::write_report;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Table => "txt",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

/// Render a report in the given format
pub fn render<W: Write>(writer: W, report: &DecodeReport, format: OutputFormat) -> Result<usize> {
    match format {
        OutputFormat::Table => write_table(writer, report),
        OutputFormat::Json => write_report(writer, report),
        OutputFormat::Csv => write_args(writer, report),
    }
}

/// Human-readable rendering
pub fn write_table<W: Write>(mut writer: W, report: &DecodeReport) -> Result<usize> {
    writeln!(writer, "function  {}", report.signature)?;
    writeln!(writer, "selector  {}", report.selector)?;
    if let Some(tx_hash) = &report.tx_hash {
        writeln!(writer, "tx        {}", tx_hash)?;
    }
    if let Some(contract) = &report.contract {
        let mut line = contract.address.clone();
        if let Some(name) = &contract.name {
            line.push_str(&format!(" ({})", name));
        }
        if !contract.is_verified {
            line.push_str(" [unverified]");
        }
        if contract.is_proxy {
            let kind = contract
                .proxy_kind
                .map(|kind| kind.as_str())
                .unwrap_or("unknown");
            match &contract.implementation {
                Some(implementation) => {
                    line.push_str(&format!(" [proxy: {} -> {}]", kind, implementation))
                }
                None => line.push_str(&format!(" [proxy: {}]", kind)),
            }
        }
        if report.cache_used {
            line.push_str(" (cached)");
        }
        writeln!(writer, "contract  {}", line)?;
    }

    if report.args.is_empty() {
        writeln!(writer, "\n(no arguments)")?;
        return Ok(0);
    }

    let rows: Vec<[String; 4]> = report
        .args
        .iter()
        .map(|arg| {
            [
                arg.index.to_string(),
                arg.name.clone(),
                arg.kind.clone(),
                arg.value.clone(),
            ]
        })
        .collect();
    write_columns(&mut writer, ["#", "name", "type", "value"], &rows)?;
    Ok(rows.len())
}

/// Selector listing for an ABI
pub fn write_selectors<W: Write>(
    mut writer: W,
    abi: &AbiDefinition,
    format: OutputFormat,
) -> Result<usize> {
    let functions: Vec<_> = abi.functions().collect();
    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = functions
                .iter()
                .map(|f| {
                    serde_json::json!({
                        "selector": f.selector_hex(),
                        "signature": f.signature(),
                        "state_mutability": f.state_mutability,
                    })
                })
                .collect();
            serde_json::to_writer_pretty(&mut writer, &rows)?;
            writeln!(writer)?;
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(writer);
            wtr.write_record(["selector", "signature"])?;
            for f in &functions {
                wtr.write_record([f.selector_hex().as_str(), f.signature()])?;
            }
            wtr.flush()?;
        }
        OutputFormat::Table => {
            for f in &functions {
                writeln!(writer, "{}  {}", f.selector_hex(), f.signature())?;
            }
        }
    }
    Ok(functions.len())
}

fn write_columns<W: Write>(writer: &mut W, header: [&str; 4], rows: &[[String; 4]]) -> Result<()> {
    let mut widths = header.map(|h| h.chars().count());
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    writeln!(writer)?;
    writeln!(
        writer,
        "{:<w0$}  {:<w1$}  {:<w2$}  {}",
        header[0],
        header[1],
        header[2],
        header[3],
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2]
    )?;
    for row in rows {
        writeln!(
            writer,
            "{:<w0$}  {:<w1$}  {:<w2$}  {}",
            row[0],
            row[1],
            row[2],
            row[3],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2]
        )?;
    }
    Ok(())
}

/// Get the export directory path, creating it if needed
fn get_export_dir() -> Result<PathBuf> {
    let export_dir = crate::config::data_dir()
        .map(|dir| dir.join("exports"))
        .unwrap_or_else(|| PathBuf::from(".abilens").join("exports"));
    fs::create_dir_all(&export_dir)
        .with_context(|| format!("create export dir {}", export_dir.display()))?;
    Ok(export_dir)
}

/// Generate a timestamped filename
fn generate_filename(prefix: &str, extension: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d-%H%M%S");
    format!("{}-{}.{}", prefix, timestamp, extension)
}

/// Write the report to a new file in the export directory
pub fn export_to_file(report: &DecodeReport, format: OutputFormat) -> Result<PathBuf> {
    let path = get_export_dir()?.join(generate_filename(&report.function, format.extension()));
    let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
    render(file, report, format)?;
    Ok(path)
}
