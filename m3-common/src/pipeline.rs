// m3-common/src/pipeline.rs
use std::path::PathBuf;

use crate::error::M3Error;

/// Byte counts reported by a transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub bytes_transferred: u64,
    pub total_size: Option<u64>,
}

/// Terminal result of one fetch request, pushed onto the completion stream
/// as soon as the request finishes.
#[derive(Debug, Clone)]
pub struct FetchCompletion {
    pub filename: String,
    pub destination: PathBuf,
    pub error: Option<M3Error>,
    pub bytes_transferred: u64,
    pub total_size: Option<u64>,
}

impl FetchCompletion {
    pub fn success(filename: String, destination: PathBuf, stats: TransferStats) -> Self {
        Self {
            filename,
            destination,
            error: None,
            bytes_transferred: stats.bytes_transferred,
            total_size: stats.total_size,
        }
    }

    pub fn failure(
        filename: String,
        destination: PathBuf,
        error: M3Error,
        stats: TransferStats,
    ) -> Self {
        Self {
            filename,
            destination,
            error: Some(error),
            bytes_transferred: stats.bytes_transferred,
            total_size: stats.total_size,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Tally of a drained completion stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub local: usize,
    pub fetched: usize,
    pub failed: Vec<String>,
}

impl FetchSummary {
    pub fn record(&mut self, completion: &FetchCompletion) {
        if completion.is_success() {
            self.fetched += 1;
        } else {
            self.failed.push(completion.filename.clone());
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
