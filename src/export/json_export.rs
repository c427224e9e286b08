//! JSON Export
//!
//! Writes a decoded call as pretty-printed JSON.

use anyhow::Result;
use serde::Serialize;
use std::io::Write;

use crate::app::{ContractSummary, DecodeReport};

/// Exportable decode (flattens the argument list)
#[derive(Serialize)]
struct ExportableReport<'a> {
    function: &'a str,
    signature: &'a str,
    selector: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tx_hash: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    contract: Option<&'a ContractSummary>,
    cache_used: bool,
    args: Vec<ExportableArg<'a>>,
}

#[derive(Serialize)]
struct ExportableArg<'a> {
    name: &'a str,
    kind: &'a str,
    value: &'a str,
}

impl<'a> From<&'a DecodeReport> for ExportableReport<'a> {
    fn from(report: &'a DecodeReport) -> Self {
        Self {
            function: &report.function,
            signature: &report.signature,
            selector: &report.selector,
            tx_hash: report.tx_hash.as_deref(),
            contract: report.contract.as_ref(),
            cache_used: report.cache_used,
            args: report
                .args
                .iter()
                .map(|arg| ExportableArg {
                    name: &arg.name,
                    kind: &arg.kind,
                    value: &arg.value,
                })
                .collect(),
        }
    }
}

/// Write the report as JSON, returning the argument count
pub fn write_report<W: Write>(mut writer: W, report: &DecodeReport) -> Result<usize> {
    let exportable = ExportableReport::from(report);
    serde_json::to_writer_pretty(&mut writer, &exportable)?;
    writeln!(writer)?;
    Ok(report.args.len())
}
