// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use tracing::warn;

use crate::error::{EikonalError, Result};

/// What to do when the round cap is reached before convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NonConvergence {
    /// Fail the run with [`EikonalError::NonConvergence`].
    #[default]
    Raise,
    /// Return the partial field together with a warning message.
    Warn,
}

/// How a strategy stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The termination condition was observed.
    Converged,
    /// The round cap was hit first.
    Exhausted,
}

/// Classified result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Kernel dispatches performed.
    pub rounds: usize,
    /// Whether the termination condition was observed within the cap.
    pub converged: bool,
    /// Set on the lenient non-convergence path.
    pub warning: Option<String>,
}

/// Counts rounds against the cap and classifies how the run ended.
#[derive(Debug, Clone)]
pub struct ConvergenceMonitor {
    max_rounds: usize,
    rounds: usize,
    policy: NonConvergence,
}

impl ConvergenceMonitor {
    /// Monitor allowing at most `max_rounds` dispatches.
    pub fn new(max_rounds: usize, policy: NonConvergence) -> Self {
        ConvergenceMonitor {
            max_rounds,
            rounds: 0,
            policy,
        }
    }

    /// Rounds started so far.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Start a round. Returns `false`, without counting, once the cap is reached.
    pub fn begin_round(&mut self) -> bool {
        if self.rounds >= self.max_rounds {
            return false;
        }
        self.rounds += 1;
        true
    }

    /// Classify the end of a run.
    ///
    /// # Errors
    /// Returns [`EikonalError::NonConvergence`] on exhaustion under [`NonConvergence::Raise`].
    pub fn finish(&self, termination: Termination, solver: &str) -> Result<Outcome> {
        match termination {
            Termination::Converged => Ok(Outcome {
                rounds: self.rounds,
                converged: true,
                warning: None,
            }),
            Termination::Exhausted => {
                let err = EikonalError::NonConvergence {
                    solver: solver.to_string(),
                    max_rounds: self.max_rounds,
                };
                match self.policy {
                    NonConvergence::Raise => Err(err),
                    NonConvergence::Warn => {
                        let message = err.to_string();
                        warn!(solver, max_rounds = self.max_rounds, "{}", message);
                        Ok(Outcome {
                            rounds: self.rounds,
                            converged: false,
                            warning: Some(message),
                        })
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_round_stops_at_cap() {
        let mut monitor = ConvergenceMonitor::new(2, NonConvergence::Raise);
        assert!(monitor.begin_round());
        assert!(monitor.begin_round());
        assert!(!monitor.begin_round());
        assert_eq!(monitor.rounds(), 2);
    }

    #[test]
    fn converged_reports_rounds() {
        let mut monitor = ConvergenceMonitor::new(10, NonConvergence::Raise);
        monitor.begin_round();
        let outcome = monitor.finish(Termination::Converged, "AGSI").unwrap();
        assert_eq!(outcome.rounds, 1);
        assert!(outcome.converged);
        assert!(outcome.warning.is_none());
    }

    #[test]
    fn exhaustion_raises_by_default() {
        let monitor = ConvergenceMonitor::new(3, NonConvergence::default());
        let result = monitor.finish(Termination::Exhausted, "global_iteration");
        assert!(matches!(
            result,
            Err(EikonalError::NonConvergence { max_rounds: 3, .. })
        ));
    }

    #[test]
    fn exhaustion_warns_when_lenient() {
        let mut monitor = ConvergenceMonitor::new(1, NonConvergence::Warn);
        monitor.begin_round();
        let outcome = monitor.finish(Termination::Exhausted, "AGSI").unwrap();
        assert!(!outcome.converged);
        let warning = outcome.warning.unwrap();
        assert!(warning.contains("maximum allowed number 1 of iterations"));
    }
}
