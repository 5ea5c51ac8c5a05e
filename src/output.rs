//! Export of normalized records as JSON or flat CSV, optionally gzipped.

use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::CanonicalPriceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

/// Writes `value` as pretty-printed JSON followed by a newline.
pub fn write_json<T, W>(mut writer: W, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
    W: Write,
{
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Writes one CSV row per record with a header row. Unknown transaction
/// times become empty cells.
pub fn write_csv<W: Write>(writer: W, records: &[CanonicalPriceRecord]) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(writer);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_records<W: Write>(
    writer: W,
    records: &[CanonicalPriceRecord],
    format: ExportFormat,
) -> Result<()> {
    match format {
        ExportFormat::Json => write_json(writer, records),
        ExportFormat::Csv => write_csv(writer, records),
    }
}

/// Exports `records` to a file at `path`, gzip-compressed if asked.
pub fn export_to_path(
    path: &Path,
    records: &[CanonicalPriceRecord],
    format: ExportFormat,
    gzip: bool,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = BufWriter::new(File::create(path)?);
    debug!(path = %path.display(), ?format, gzip, "Writing export");

    if gzip {
        let mut encoder = GzEncoder::new(file, Compression::default());
        write_records(&mut encoder, records, format)?;
        encoder.finish()?.flush()?;
    } else {
        write_records(file, records, format)?;
    }

    info!(path = %path.display(), records = records.len(), "Export written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SiteId, TransactionTime};
    use chrono::{TimeZone, Utc};
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn records() -> Vec<CanonicalPriceRecord> {
        let known = CanonicalPriceRecord {
            site_id: SiteId::new("61401008"),
            site_name: Some("Shell Toowong".into()),
            brand: Some("Shell".into()),
            address: None,
            suburb: Some("Toowong".into()),
            state: Some("QLD".into()),
            postcode: Some("4066".into()),
            latitude: Some(-27.48),
            longitude: Some(152.99),
            fuel_type: "Unleaded".into(),
            price_minor_units: 1959.0,
            price_dollars: 1.959,
            transaction_time: TransactionTime::Known(
                Utc.with_ymd_and_hms(2025, 1, 6, 23, 15, 0).unwrap(),
            ),
        };
        let unknown = CanonicalPriceRecord {
            site_id: SiteId::new("61401009"),
            transaction_time: TransactionTime::Unknown,
            ..known.clone()
        };
        vec![known, unknown]
    }

    #[test]
    fn test_csv_has_header_and_empty_unknown_time() {
        let mut buf = Vec::new();
        write_csv(&mut buf, &records()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("site_id,site_name,brand"));
        assert!(lines[0].ends_with("transaction_time"));
        assert!(lines[1].ends_with("2025-01-06T23:15:00Z"));
        assert!(lines[2].ends_with(','));
    }

    #[test]
    fn test_json_array() {
        let mut buf = Vec::new();
        write_json(&mut buf, &records()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();

        assert_eq!(value[0]["site_id"], "61401008");
        assert_eq!(value[0]["price_dollars"], 1.959);
        assert!(value[1]["transaction_time"].is_null());
    }

    #[test]
    fn test_gzip_export_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prices.csv.gz");

        export_to_path(&path, &records(), ExportFormat::Csv, true).unwrap();

        let mut text = String::new();
        GzDecoder::new(File::open(&path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_plain_json_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.json");

        export_to_path(&path, &records(), ExportFormat::Json, false).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"fuel_type\": \"Unleaded\""));
    }
}
