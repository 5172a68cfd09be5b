//! Error taxonomy for the scan client

use crate::model::{ScanId, TestStatus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    /// Malformed target URL, caught before any I/O.
    #[error("{0}")]
    Validation(String),

    /// Submission or status request failed: transport error, timeout or non-2xx.
    #[error("{0}")]
    Network(String),

    #[error("no scan is being tracked")]
    NoScan,

    #[error("report for scan {id} is not available while the scan is {status}")]
    ReportUnavailable { id: ScanId, status: TestStatus },

    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
impl ScanError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ScanError::Validation(_))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ScanError::Network(_))
    }
}
