//! JSON Lines journal of order outcomes.
//!
//! One file per UTC day (`outcomes_YYYY-MM-DD.jsonl`), opened in append mode:
//! - Each line is a complete JSON object
//! - Partial file corruption only affects individual lines
//! - Restarts append to the same day's file

use crate::error::{PersistenceError, PersistenceResult};
use chrono::{DateTime, NaiveDate, Utc};
use folio_core::{OrderMessage, OrderOutcome, OrderSide, RequestId};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Journal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Records buffered before a flush.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_data_dir() -> String {
    "data/outcomes".to_string()
}

fn default_buffer_size() -> usize {
    1
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// Which loop produced an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderOrigin {
    Decision,
    Risk,
}

/// One journaled outcome with the order that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub recorded_at: DateTime<Utc>,
    pub cycle_id: String,
    pub origin: OrderOrigin,
    /// Id of the order the outcome answers.
    pub request_id: RequestId,
    pub ticker: String,
    pub kind: OrderSide,
    pub quantity: u64,
    pub outcome: OrderOutcome,
}

impl OutcomeRecord {
    pub fn new(cycle_id: &str, origin: OrderOrigin, order: &OrderMessage, outcome: OrderOutcome) -> Self {
        Self {
            recorded_at: Utc::now(),
            cycle_id: cycle_id.to_string(),
            origin,
            request_id: order.request_id.clone(),
            ticker: order.ticker.clone(),
            kind: order.kind,
            quantity: order.quantity,
            outcome,
        }
    }
}

/// Active writer state for daily file.
struct ActiveWriter {
    writer: BufWriter<File>,
    date: NaiveDate,
    records_written: usize,
}

/// Append-only outcome journal.
pub struct OutcomeJournal {
    base_dir: PathBuf,
    buffer: Vec<OutcomeRecord>,
    max_buffer_size: usize,
    active_writer: Option<ActiveWriter>,
}

impl OutcomeJournal {
    /// Create a journal under `base_dir`, creating the directory if needed.
    pub fn new(base_dir: impl AsRef<Path>, max_buffer_size: usize) -> PersistenceResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;

        Ok(Self {
            base_dir,
            buffer: Vec::with_capacity(max_buffer_size.max(1)),
            max_buffer_size: max_buffer_size.max(1),
            active_writer: None,
        })
    }

    pub fn from_config(config: &PersistenceConfig) -> PersistenceResult<Self> {
        Self::new(&config.data_dir, config.buffer_size)
    }

    /// Path of the file for `date`.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.base_dir
            .join(format!("outcomes_{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Buffer a record, flushing when the buffer is full.
    pub fn append(&mut self, record: OutcomeRecord) -> PersistenceResult<()> {
        self.buffer.push(record);
        if self.buffer.len() >= self.max_buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    fn close_active_writer(&mut self) {
        if let Some(mut active) = self.active_writer.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush journal on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed outcome journal"
            );
        }
    }

    fn open_writer(&mut self, date: NaiveDate) -> PersistenceResult<&mut ActiveWriter> {
        let needs_rotation = self
            .active_writer
            .as_ref()
            .is_some_and(|w| w.date != date);
        if needs_rotation {
            self.close_active_writer();
        }

        if self.active_writer.is_none() {
            let path = self.path_for(date);
            info!(path = %path.display(), "Opening outcome journal (append mode)");
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            self.active_writer = Some(ActiveWriter {
                writer: BufWriter::new(file),
                date,
                records_written: 0,
            });
        }

        self.active_writer
            .as_mut()
            .ok_or_else(|| PersistenceError::WriterUnavailable(date.to_string()))
    }

    /// Write buffered records to today's file.
    pub fn flush(&mut self) -> PersistenceResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let today = Utc::now().date_naive();
        let records = std::mem::take(&mut self.buffer);
        let active = self.open_writer(today)?;

        for record in &records {
            let json = serde_json::to_string(record)?;
            writeln!(active.writer, "{json}")?;
        }
        active.writer.flush()?;
        active.records_written += records.len();

        debug!(date = %today, records = records.len(), "Flushed outcomes to journal");
        Ok(())
    }

    /// Flush and close.
    pub fn close(&mut self) -> PersistenceResult<()> {
        self.flush()?;
        self.close_active_writer();
        Ok(())
    }

    /// Read back the records for `date`. Unparsable lines are skipped.
    pub fn read_day(&self, date: NaiveDate) -> PersistenceResult<Vec<OutcomeRecord>> {
        let path = self.path_for(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "Skipping corrupt journal line"),
            }
        }
        Ok(records)
    }
}

impl Drop for OutcomeJournal {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, "Failed to flush journal on drop");
        }
        self.close_active_writer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::RequestId;
    use std::io::Write as _;
    use tempfile::TempDir;

    fn record(i: u64) -> OutcomeRecord {
        let order = OrderMessage::market(OrderSide::Buy, format!("00{i:04}"), i + 1);
        let outcome = OrderOutcome::success(order.request_id.clone(), format!("{i:010}"), "ok");
        OutcomeRecord::new("cycle-1", OrderOrigin::Decision, &order, outcome)
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let mut journal = OutcomeJournal::new(dir.path(), 1).unwrap();

        for i in 0..3 {
            journal.append(record(i)).unwrap();
        }
        journal.close().unwrap();

        let records = journal.read_day(Utc::now().date_naive()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].ticker, "000000");
        assert_eq!(records[2].quantity, 3);
        assert!(records[0].outcome.is_success());
    }

    #[test]
    fn test_restart_appends() {
        let dir = TempDir::new().unwrap();
        {
            let mut journal = OutcomeJournal::new(dir.path(), 10).unwrap();
            journal.append(record(0)).unwrap();
            journal.append(record(1)).unwrap();
            // Dropped with a partially filled buffer
        }
        let mut journal = OutcomeJournal::new(dir.path(), 10).unwrap();
        journal.append(record(2)).unwrap();
        journal.close().unwrap();

        assert_eq!(journal.read_day(Utc::now().date_naive()).unwrap().len(), 3);
    }

    #[test]
    fn test_corrupt_line_skipped() {
        let dir = TempDir::new().unwrap();
        let mut journal = OutcomeJournal::new(dir.path(), 1).unwrap();
        journal.append(record(0)).unwrap();

        let path = journal.path_for(Utc::now().date_naive());
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{\"truncated\":").unwrap();
        drop(file);

        let mut failed = record(1);
        failed.outcome = OrderOutcome::failed(RequestId::unknown(), "Invalid JSON format");
        journal.append(failed).unwrap();

        let records = journal.read_day(Utc::now().date_naive()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[1].outcome.is_failed());
    }

    #[test]
    fn test_empty_flush_creates_no_file() {
        let dir = TempDir::new().unwrap();
        let mut journal = OutcomeJournal::new(dir.path(), 1).unwrap();
        journal.flush().unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
