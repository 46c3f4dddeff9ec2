use std::{fs, path::Path};

use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;

use crate::config::OutputFormat;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HospitalizationRecord {
    pub date: NaiveDate,
    pub hospitalized: Option<i64>,
    pub require_ventilator_or_in_icu: Option<i64>,
    pub source: String,
}

impl HospitalizationRecord {
    pub fn empty(date: NaiveDate, source: String) -> Self {
        Self {
            date,
            hospitalized: None,
            require_ventilator_or_in_icu: None,
            source,
        }
    }
}

pub fn to_csv_string(records: &[HospitalizationRecord]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    if records.is_empty() {
        writer.write_record(["date", "hospitalized", "require_ventilator_or_in_icu", "source"])?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    let bytes = writer.into_inner().context("failed to flush CSV writer")?;
    Ok(String::from_utf8(bytes)?)
}

pub fn to_json_string(records: &[HospitalizationRecord]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

pub fn write_records(
    path: &Path,
    format: OutputFormat,
    records: &[HospitalizationRecord],
) -> anyhow::Result<()> {
    let contents = match format {
        OutputFormat::Csv => to_csv_string(records)?,
        OutputFormat::Json => to_json_string(records)?,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
