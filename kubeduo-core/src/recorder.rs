//! Run record: append-only log of step outcomes
//!
//! One JSON object per line. The file is only ever appended to; the latest
//! status per (step, node) is rebuilt from it on open.

use crate::error::{AppendSnafu, CorruptSnafu, EncodeSnafu, OpenSnafu, RecordError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed,
    TimedOut,
    /// Not attempted: the resource was absent or the run was cancelled.
    Skipped,
    /// A prior success no longer holds (its node disappeared).
    Invalidated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Unknown,
    Success,
    Failed,
}

impl From<Outcome> for StepStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => StepStatus::Success,
            Outcome::Failed | Outcome::TimedOut => StepStatus::Failed,
            Outcome::Skipped | Outcome::Invalidated => StepStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub run_id: Uuid,
    pub step: String,
    pub node: String,
    pub at: DateTime<Utc>,
    pub outcome: Outcome,
    /// Captured output with query values redacted.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
}

#[derive(Debug, Default)]
pub struct RunRecord {
    path: Option<PathBuf>,
    file: Option<File>,
    entries: Vec<RecordEntry>,
    latest: HashMap<(String, String), Outcome>,
}

impl RunRecord {
    /// A record that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (creating if needed) the record at `path` and replay it.
    pub fn open(path: &Path) -> Result<Self, RecordError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context(OpenSnafu { path })?;
        }

        let mut record = Self {
            path: Some(path.to_path_buf()),
            ..Self::default()
        };

        // Bytes of the file that hold whole entries; a torn tail is cut off.
        let mut keep_len = None;
        let mut needs_newline = false;
        if path.exists() {
            let bytes = std::fs::read(path).context(OpenSnafu { path })?;
            let lines: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();
            let last = lines.len() - 1;
            for (index, line) in lines.iter().enumerate() {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match serde_json::from_slice::<RecordEntry>(line) {
                    Ok(entry) => record.index(entry),
                    // Only an unterminated last line can be an unfinished append.
                    Err(err) if index == last => {
                        warn!(
                            "Dropping torn final line of run record {}: {err}",
                            path.display()
                        );
                        keep_len = Some(bytes.len() - line.len());
                    }
                    Err(err) => {
                        return Err(err).context(CorruptSnafu {
                            path,
                            line: index + 1,
                        });
                    }
                }
            }
            needs_newline = keep_len.is_none() && !bytes.is_empty() && !bytes.ends_with(b"\n");
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .context(OpenSnafu { path })?;
        if let Some(len) = keep_len {
            file.set_len(len as u64).context(AppendSnafu { path })?;
        }
        if needs_newline {
            writeln!(file).context(AppendSnafu { path })?;
        }
        record.file = Some(file);

        tracing::debug!(
            "Opened run record {} ({} entries)",
            path.display(),
            record.entries.len()
        );
        Ok(record)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn entries(&self) -> &[RecordEntry] {
        &self.entries
    }

    pub fn append(&mut self, entry: RecordEntry) -> Result<(), RecordError> {
        if let Some(file) = self.file.as_mut() {
            let path = self.path.as_deref().unwrap_or_else(|| Path::new("-"));
            let line = serde_json::to_string(&entry).context(EncodeSnafu)?;
            writeln!(file, "{line}").context(AppendSnafu { path })?;
            file.flush().context(AppendSnafu { path })?;
        }
        self.index(entry);
        Ok(())
    }

    pub fn record(
        &mut self,
        run_id: Uuid,
        step: &str,
        node: &str,
        outcome: Outcome,
        output: impl Into<String>,
    ) -> Result<(), RecordError> {
        self.append(RecordEntry {
            run_id,
            step: step.to_string(),
            node: node.to_string(),
            at: Utc::now(),
            outcome,
            output: output.into(),
        })
    }

    /// Status from the most recent entry for (step, node).
    pub fn status(&self, step: &str, node: &str) -> StepStatus {
        self.latest
            .get(&(step.to_string(), node.to_string()))
            .map_or(StepStatus::Unknown, |o| StepStatus::from(*o))
    }

    /// Latest outcome per (step, node), sorted by key.
    pub fn latest(&self) -> BTreeMap<(&str, &str), Outcome> {
        self.latest
            .iter()
            .map(|((s, n), o)| ((s.as_str(), n.as_str()), *o))
            .collect()
    }

    /// Append an `invalidated` entry for every pair whose latest outcome is
    /// success. Returns how many were invalidated.
    pub fn invalidate_all(&mut self, run_id: Uuid, reason: &str) -> Result<usize, RecordError> {
        let mut completed: Vec<(String, String)> = self
            .latest
            .iter()
            .filter(|(_, o)| **o == Outcome::Success)
            .map(|(k, _)| k.clone())
            .collect();
        completed.sort();
        for (step, node) in &completed {
            self.record(run_id, step, node, Outcome::Invalidated, reason)?;
        }
        Ok(completed.len())
    }

    /// Append an `invalidated` entry for (step, node) if its latest outcome
    /// is success. Returns whether anything was invalidated.
    pub fn invalidate(
        &mut self,
        run_id: Uuid,
        step: &str,
        node: &str,
        reason: &str,
    ) -> Result<bool, RecordError> {
        if self.status(step, node) != StepStatus::Success {
            return Ok(false);
        }
        self.record(run_id, step, node, Outcome::Invalidated, reason)?;
        Ok(true)
    }

    fn index(&mut self, entry: RecordEntry) {
        self.latest
            .insert((entry.step.clone(), entry.node.clone()), entry.outcome);
        self.entries.push(entry);
    }
}
