//! Per-epoch metric log

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use train_core::{Epoch, EpochResult, Result};

/// Notified with every epoch's metrics, before any bookkeeping
pub trait EpochObserver {
    fn on_epoch(&mut self, epoch: Epoch, result: &EpochResult) -> Result<()>;
}

/// Appends `epoch,metric,value` rows to a CSV file
pub struct CsvEpochLog {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvEpochLog {
    /// Open for appending; the header is written when the file is new
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_new = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(["epoch", "metric", "value"])?;
            writer.flush()?;
        }

        Ok(Self { path, writer })
    }

    /// Drop rows logged after `epoch`, keeping the header
    ///
    /// Returns the number of rows removed. A missing file is left alone.
    pub fn truncate_after(path: impl AsRef<Path>, epoch: Epoch) -> Result<usize> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(0);
        }

        let mut reader = csv::Reader::from_path(path)?;
        let mut kept = Vec::new();
        let mut removed = 0;
        for row in reader.records() {
            let row = row?;
            match row.get(0).and_then(|e| e.parse::<Epoch>().ok()) {
                Some(logged) if logged > epoch => removed += 1,
                _ => kept.push(row),
            }
        }

        if removed > 0 {
            let mut writer = csv::Writer::from_path(path)?;
            writer.write_record(["epoch", "metric", "value"])?;
            for row in &kept {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }
        Ok(removed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EpochObserver for CsvEpochLog {
    fn on_epoch(&mut self, epoch: Epoch, result: &EpochResult) -> Result<()> {
        let epoch = epoch.to_string();
        for (name, value) in result.sorted() {
            let value = value.to_string();
            self.writer.write_record([epoch.as_str(), name, value.as_str()])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/metrics.csv");

        {
            let mut log = CsvEpochLog::open(&path).unwrap();
            let result = EpochResult::new().with("val_loss", 0.5).with("accuracy", 0.75);
            log.on_epoch(1, &result).unwrap();
        }
        {
            // Reopening must not repeat the header
            let mut log = CsvEpochLog::open(&path).unwrap();
            log.on_epoch(2, &EpochResult::new().with("val_loss", 0.25)).unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "epoch,metric,value\n1,accuracy,0.75\n1,val_loss,0.5\n2,val_loss,0.25\n"
        );
    }

    #[test]
    fn test_truncate_after_drops_later_epochs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");

        {
            let mut log = CsvEpochLog::open(&path).unwrap();
            for epoch in 1..=3 {
                log.on_epoch(epoch, &EpochResult::new().with("val_loss", epoch as f64))
                    .unwrap();
            }
        }

        assert_eq!(CsvEpochLog::truncate_after(&path, 2).unwrap(), 1);
        assert_eq!(CsvEpochLog::truncate_after(&path, 2).unwrap(), 0);

        let mut log = CsvEpochLog::open(&path).unwrap();
        log.on_epoch(3, &EpochResult::new().with("val_loss", 0.5)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "epoch,metric,value\n1,val_loss,1\n2,val_loss,2\n3,val_loss,0.5\n"
        );
    }

    #[test]
    fn test_truncate_after_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        assert_eq!(CsvEpochLog::truncate_after(&path, 4).unwrap(), 0);
        assert!(!path.exists());
    }
}
