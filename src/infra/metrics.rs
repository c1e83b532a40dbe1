// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records every epoch's losses and metric summaries to a CSV
// file in long format, one value per row:
//
//   epoch,stage,name,value
//   1,train,loss,1.093412
//   1,train,accuracy,0.412500
//   1,validation,loss,1.010233
//   ...
//
// Long format keeps the file stable whatever bricks a model
// reports; pivot it when plotting.

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::ml::trainer::EpochReport;

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet, so repeated
    /// runs append to one log.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "epoch,stage,name,value")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, report: &EpochReport) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        let rows = report.rows();
        for (stage, name, value) in &rows {
            writeln!(f, "{},{},{},{:.6}", report.epoch, stage, name, value)?;
        }
        tracing::debug!("Logged {} values for epoch {}", rows.len(), report.epoch);
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::trainer::PhaseReport;
    use std::collections::BTreeMap;

    fn report(epoch: usize, loss: f64) -> EpochReport {
        EpochReport {
            epoch,
            train: PhaseReport { loss: Some(loss), metrics: BTreeMap::new(), batches: 2 },
            valid: PhaseReport {
                loss:    Some(loss + 0.5),
                metrics: BTreeMap::from([("accuracy".to_string(), 0.25)]),
                batches: 1,
            },
        }
    }

    #[test]
    fn test_rows_are_appended() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(tmp.path()).unwrap();
        logger.log(&report(1, 1.0)).unwrap();
        logger.log(&report(2, 0.5)).unwrap();

        let csv = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "epoch,stage,name,value");
        assert_eq!(lines[1], "1,train,loss,1.000000");
        assert_eq!(lines[2], "1,validation,loss,1.500000");
        assert_eq!(lines[3], "1,validation,accuracy,0.250000");
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn test_header_written_once() {
        let tmp = tempfile::tempdir().unwrap();
        MetricsLogger::new(tmp.path()).unwrap().log(&report(1, 1.0)).unwrap();
        let logger = MetricsLogger::new(tmp.path()).unwrap();
        logger.log(&report(2, 1.0)).unwrap();
        let csv = fs::read_to_string(logger.csv_path()).unwrap();
        assert_eq!(csv.matches("epoch,stage,name,value").count(), 1);
    }
}
