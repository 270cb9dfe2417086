//! Progress callbacks for service runs.

use crate::services::ServiceReport;

/// Progress callback for reporting service status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each analytics-store insert.
    fn rows_inserted(&self, table: &str, inserted: usize, rejected: usize);
    /// Called when the service completes.
    fn done(&self, report: &ServiceReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn rows_inserted(&self, _table: &str, _inserted: usize, _rejected: usize) {}
    fn done(&self, _report: &ServiceReport) {}
}
