//! CSV Export
//!
//! Writes decoded arguments as CSV rows.

use anyhow::Result;
use std::io::Write;

use crate::app::DecodeReport;

/// Write one row per decoded argument, returning the row count
pub fn write_args<W: Write>(writer: W, report: &DecodeReport) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);

    wtr.write_record(["function", "selector", "index", "name", "type", "value"])?;

    for arg in &report.args {
        wtr.write_record([
            report.signature.clone(),
            report.selector.clone(),
            arg.index.to_string(),
            arg.name.clone(),
            arg.kind.clone(),
            arg.value.clone(),
        ])?;
    }

    wtr.flush()?;
    Ok(report.args.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::decode_manual;

    #[test]
    fn test_write_args() {
        let report = decode_manual(
            r#"[{"type":"function","name":"setNote","inputs":[{"name":"note","type":"string"}]}]"#,
            // setNote("a,b")
            "0x2d7b299d\
             0000000000000000000000000000000000000000000000000000000000000020\
             0000000000000000000000000000000000000000000000000000000000000003\
             612c620000000000000000000000000000000000000000000000000000000000",
        )
        .unwrap();

        let mut out = Vec::new();
        assert_eq!(write_args(&mut out, &report).unwrap(), 1);
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("function,selector,index,name,type,value"));
        assert_eq!(
            lines.next(),
            Some("setNote(string),0x2d7b299d,0,note,string,\"a,b\"")
        );
    }
}
