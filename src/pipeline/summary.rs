//! Run result accounting

use std::fmt;

use crate::types::Phase;

/// Counts for one phase run
#[derive(Debug, Clone)]
pub struct PhaseSummary {
    pub phase: Phase,
    /// Work units enumerated for this run
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Units that turned out to be done already when claimed
    pub skipped: usize,
}

impl PhaseSummary {
    pub fn new(phase: Phase) -> Self {
        PhaseSummary {
            phase,
            processed: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
        }
    }
}

impl fmt::Display for PhaseSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} processed, {} succeeded, {} failed, {} skipped",
            self.phase, self.processed, self.succeeded, self.failed, self.skipped
        )
    }
}

/// Counts for a full run across phases
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub phases: Vec<PhaseSummary>,
}

impl RunSummary {
    pub fn push(&mut self, summary: PhaseSummary) {
        self.phases.push(summary);
    }

    pub fn failed_total(&self) -> usize {
        self.phases.iter().map(|p| p.failed).sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for phase in &self.phases {
            writeln!(f, "{phase}")?;
        }
        Ok(())
    }
}
