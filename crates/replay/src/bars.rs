//! CSV bar loading.
//!
//! Expected columns: `timestamp,open,high,low,close`, with an optional `volume`; any other
//! column is ignored. Timestamps are bar open times, as epoch milliseconds or RFC 3339.

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use sweep_core::{Bar, TimestampMs};

#[derive(Debug, Deserialize)]
struct BarRecord {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

fn parse_timestamp(raw: &str) -> Result<TimestampMs> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(ms);
    }
    let dt = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("timestamp {raw:?} is neither epoch ms nor RFC 3339"))?;
    Ok(dt.timestamp_millis())
}

/// Read bars from any CSV source, sorted by open time.
pub fn read_bars<R: Read>(reader: R) -> Result<Vec<Bar>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();
    for (row, record) in rdr.deserialize::<BarRecord>().enumerate() {
        let record = record.with_context(|| format!("bad CSV row {}", row + 1))?;
        let bar = Bar {
            ts_ms: parse_timestamp(&record.timestamp).with_context(|| format!("row {}", row + 1))?,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        };
        if !bar.is_well_formed() {
            bail!("row {}: inconsistent OHLC {:?}", row + 1, bar);
        }
        bars.push(bar);
    }
    bars.sort_by_key(|b| b.ts_ms);
    Ok(bars)
}

pub fn load_bars(path: &Path) -> Result<Vec<Bar>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_bars(file).with_context(|| format!("reading {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reads_ms_and_rfc3339() {
        let csv = "timestamp,open,high,low,close,volume\n\
                   2024-03-04T14:35:00Z,101,102,100.5,101.5,900\n\
                   1709562600000, 100, 101, 99.5, 100.5, 1200\n";
        let bars = read_bars(csv.as_bytes()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].ts_ms, 1_709_562_600_000);
        assert_eq!(bars[1].ts_ms, 1_709_562_900_000);
        assert_relative_eq!(bars[1].close, 101.5);
        assert_relative_eq!(bars[0].volume, 1200.0);
    }

    #[test]
    fn test_rejects_bad_rows() {
        let csv = "timestamp,open,high,low,close\nyesterday,1,2,0.5,1\n";
        assert!(read_bars(csv.as_bytes()).is_err());

        let csv = "timestamp,open,high,low,close\n0,1,0.5,2,1\n";
        assert!(read_bars(csv.as_bytes()).is_err());

        // Close above the high.
        let csv = "timestamp,open,high,low,close\n0,1,2,0.5,2.5\n";
        assert!(read_bars(csv.as_bytes()).is_err());
    }
}
