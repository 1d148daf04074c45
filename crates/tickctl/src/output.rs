//! Cycle rows and end-of-run summary, as CSV or JSON lines.

use std::io::{self, Write};

use serde::Serialize;
use serde_json::json;

use periodic_waiter::{Resolution, Statistics};

pub const CSV_HEADER: &str = "n,dt,min,max,mean,sd,tet";

/// One printed cycle. Values are counts of the waiter's resolution unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CycleRow {
    pub n: u64,
    pub dt: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub sd: f64,
    pub tet: f64,
}

impl CycleRow {
    pub fn new(stats: &Statistics, dt: f64) -> Self {
        Self {
            n: stats.count,
            dt,
            min: stats.min,
            max: stats.max,
            mean: stats.mean,
            sd: stats.standard_deviation,
            tet: stats.time_erosion,
        }
    }
}

pub fn write_csv_header(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{CSV_HEADER}")
}

pub fn write_row(out: &mut impl Write, row: &CycleRow, json: bool) -> anyhow::Result<()> {
    if json {
        serde_json::to_writer(&mut *out, row)?;
        writeln!(out)?;
    } else {
        writeln!(
            out,
            "{},{},{},{},{},{},{}",
            row.n, row.dt, row.min, row.max, row.mean, row.sd, row.tet
        )?;
    }
    Ok(())
}

pub fn write_summary(
    out: &mut impl Write,
    stats: &Statistics,
    resolution: Resolution,
    json: bool,
) -> anyhow::Result<()> {
    if json {
        let summary = json!({
            "summary": {
                "unit": resolution.suffix(),
                "count": stats.count,
                "min": stats.min,
                "max": stats.max,
                "mean": stats.mean,
                "standard_deviation": stats.standard_deviation,
                "time_erosion": stats.time_erosion,
            }
        });
        serde_json::to_writer(&mut *out, &summary)?;
        writeln!(out)?;
        return Ok(());
    }

    let unit = resolution.suffix();
    writeln!(out)?;
    writeln!(out, "Waiter stopped after {} cycles.", stats.count)?;
    if stats.count > 0 {
        writeln!(out, "Min time: {} {unit}", stats.min)?;
        writeln!(out, "Max time: {} {unit}", stats.max)?;
        writeln!(out, "Mean time: {} {unit}", stats.mean)?;
        writeln!(out, "Mean time erosion: {} {unit}", stats.time_erosion)?;
        writeln!(out, "Standard deviation: {} {unit}", stats.standard_deviation)?;
    }
    Ok(())
}
