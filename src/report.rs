//! Thin serialization of result collections to table, CSV, or JSON files.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;

use crate::config::ReportFormat;
use crate::error::Error;
use crate::model::{Discrepancy, MissingRecord, RecordData, ValidationRecord};

pub fn write_discrepancies(
    discrepancies: &[Discrepancy],
    path: &Path,
    format: ReportFormat,
) -> Result<(), Error> {
    if discrepancies.is_empty() {
        info!("no discrepancies found");
        return Ok(());
    }
    let mut out = BufWriter::new(File::create(path)?);
    match format {
        ReportFormat::Json => serde_json::to_writer_pretty(&mut out, discrepancies)?,
        ReportFormat::Csv => {
            writeln!(out, "FQDN,Type,Zone,Expected,Actual,ExpectedTTL,ActualTTL,Server,Message")?;
            for d in discrepancies {
                writeln!(
                    out,
                    "{},{},{},{},{},{},{},{},{}",
                    csv_field(&d.fqdn),
                    csv_field(&d.record_type),
                    csv_field(&d.zone_name),
                    csv_field(&stringify(&d.expected)),
                    csv_field(&stringify(&d.actual)),
                    d.expected_ttl,
                    d.actual_ttl,
                    csv_field(&d.server),
                    csv_field(&d.message),
                )?;
            }
        }
        ReportFormat::Table => {
            for d in discrepancies {
                writeln!(
                    out,
                    "FQDN: {}\nType: {}\nZone: {}\nExpected: {}\nActual: {}\nExpected TTL: {}\nActual TTL: {}\nServer: {}\nMessage: {}\n",
                    d.fqdn,
                    d.record_type,
                    d.zone_name,
                    stringify(&d.expected),
                    stringify(&d.actual),
                    d.expected_ttl,
                    d.actual_ttl,
                    d.server,
                    d.message,
                )?;
            }
        }
    }
    out.flush()?;
    info!("wrote {} discrepancies to {}", discrepancies.len(), path.display());
    Ok(())
}

pub fn write_missing(
    missing: &[MissingRecord],
    path: &Path,
    format: ReportFormat,
) -> Result<(), Error> {
    if missing.is_empty() {
        return Ok(());
    }
    let mut out = BufWriter::new(File::create(path)?);
    match format {
        ReportFormat::Json => serde_json::to_writer_pretty(&mut out, missing)?,
        ReportFormat::Csv => {
            writeln!(out, "FQDN,Type,Zone,Values,TTL,Server")?;
            for m in missing {
                writeln!(
                    out,
                    "{},{},{},{},{},{}",
                    csv_field(&m.fqdn),
                    csv_field(&m.record_type),
                    csv_field(&m.zone_name),
                    csv_field(&m.values.join(", ")),
                    m.ttl,
                    csv_field(&m.server),
                )?;
            }
        }
        ReportFormat::Table => {
            for m in missing {
                writeln!(
                    out,
                    "FQDN: {}\nType: {}\nZone: {}\nValues: {}\nTTL: {}\nServer: {}\n",
                    m.fqdn,
                    m.record_type,
                    m.zone_name,
                    m.values.join(", "),
                    m.ttl,
                    m.server,
                )?;
            }
        }
    }
    out.flush()?;
    info!("wrote {} orphan records to {}", missing.len(), path.display());
    Ok(())
}

pub fn write_successes(successes: &[ValidationRecord], path: &Path) -> Result<(), Error> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, successes)?;
    out.flush()?;
    info!("wrote {} successful validations to {}", successes.len(), path.display());
    Ok(())
}

fn stringify(data: &Option<RecordData>) -> String {
    data.as_ref().map(|d| d.to_string()).unwrap_or_default()
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
