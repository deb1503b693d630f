use std::fmt;

use crate::downloader::task::Outcome;

/// Every outcome of one run, in submission order.
#[derive(Debug, Default)]
pub struct Summary {
    outcomes: Vec<Outcome>,
}

impl Summary {
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        Self { outcomes }
    }

    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_success() {
            return write!(f, "All downloads completed successfully.");
        }
        write!(
            f,
            "Downloads completed: {} succeeded, {} failed.",
            self.succeeded(),
            self.failed()
        )?;
        for failure in self.failures() {
            write!(f, "\n  {}", failure)?;
        }
        Ok(())
    }
}
