#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyProcessing,
    Empty,
    Offline,
    ShutDown,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub attempted: usize,
    pub synced: usize,
    pub exhausted: usize,
    pub retained: usize,
    /// Results discarded because the entry was removed mid-flight.
    pub stale: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    Skipped(SkipReason),
    Completed(PassSummary),
}

impl PassOutcome {
    pub fn summary(&self) -> Option<&PassSummary> {
        match self {
            Self::Completed(summary) => Some(summary),
            Self::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}
