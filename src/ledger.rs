/// A terminal state a package can end a batch in.
pub trait Terminal: Copy {
    fn is_failure(&self) -> bool;
    /// Short description for the summary table.
    fn label(&self) -> String;
}

/// What happened to every package of one batch.
///
/// `failed` is always a subset of `processed`, both in insertion order.
#[derive(Debug, Clone)]
pub struct Ledger<O> {
    processed: Vec<String>,
    failed: Vec<String>,
    outcomes: Vec<(String, O)>,
}

impl<O> Default for Ledger<O> {
    fn default() -> Self {
        Self {
            processed: Vec::new(),
            failed: Vec::new(),
            outcomes: Vec::new(),
        }
    }
}

impl<O: Terminal> Ledger<O> {
    /// Records the outcome of `name`. A package is recorded at most once; later
    /// calls for the same name are ignored.
    pub fn record(&mut self, name: &str, outcome: O) {
        if self.is_processed(name) {
            log::debug!("{name} already recorded, ignoring second outcome");
            return;
        }
        self.processed.push(name.to_string());
        if outcome.is_failure() {
            self.failed.push(name.to_string());
        }
        self.outcomes.push((name.to_string(), outcome));
    }

    pub fn is_processed(&self, name: &str) -> bool {
        self.processed.iter().any(|p| p == name)
    }

    pub fn has_failed(&self, name: &str) -> bool {
        self.failed.iter().any(|p| p == name)
    }

    pub fn outcome(&self, name: &str) -> Option<O> {
        self.outcomes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, outcome)| *outcome)
    }

    pub fn processed(&self) -> &[String] {
        &self.processed
    }

    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    pub fn outcomes(&self) -> &[(String, O)] {
        &self.outcomes
    }

    /// True iff anything failed. The batch as a whole then exits non-zero.
    pub fn critical_failure(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn is_success(&self) -> bool {
        !self.critical_failure()
    }
}
