//! SQL phase runner
//!
//! Executes an ordered list of statements on one open transaction and
//! classifies each failure as benign (tolerated, transaction recovered) or
//! hard (phase stops, caller must roll back).

use crate::error::EvalResult;
use crate::events::{Event, EventSink};
use sm_core::{InstanceId, ResultSet};
use sm_db::Session;
use std::fmt;

/// The phases an instance goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Fixture statements before measurement
    Preprocess,
    /// Reference solution statements (ground-truth collection only)
    Solution,
    /// A generated candidate query
    Candidate,
    /// Fixture statements after measurement
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Preprocess => write!(f, "preprocess"),
            Phase::Solution => write!(f, "solution"),
            Phase::Candidate => write!(f, "candidate"),
            Phase::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Result of running one statement
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The statement ran; rows if it returns any
    Success(Option<ResultSet>),
    /// The statement failed in a tolerant phase (effect likely already applied)
    BenignFailure(String),
    /// The statement failed in a non-tolerant phase
    HardFailure(String),
}

impl ExecutionOutcome {
    /// Rows of a successful row-returning statement
    pub fn rows(&self) -> Option<&ResultSet> {
        match self {
            ExecutionOutcome::Success(rows) => rows.as_ref(),
            _ => None,
        }
    }

    /// Whether the statement ran without error
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success(_))
    }
}

/// Per-statement outcomes of one phase, in execution order
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
    /// Phase that was run
    pub phase: Phase,

    /// One outcome per executed statement; a hard failure is always last
    pub outcomes: Vec<ExecutionOutcome>,
}

impl PhaseReport {
    /// Rows returned by the last statement of the phase, if it succeeded
    pub fn last_rows(&self) -> Option<&ResultSet> {
        self.outcomes.last().and_then(ExecutionOutcome::rows)
    }

    /// Error text of the hard failure that stopped the phase
    pub fn hard_failure(&self) -> Option<&str> {
        match self.outcomes.last() {
            Some(ExecutionOutcome::HardFailure(msg)) => Some(msg),
            _ => None,
        }
    }

    /// Number of tolerated failures
    pub fn benign_failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ExecutionOutcome::BenignFailure(_)))
            .count()
    }

    /// Whether every statement succeeded
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(ExecutionOutcome::is_success)
    }
}

/// Runs statement lists against a session, reporting to an event sink
pub struct PhaseRunner<'a> {
    sink: &'a dyn EventSink,
}

impl<'a> PhaseRunner<'a> {
    /// Create a new phase runner
    pub fn new(sink: &'a dyn EventSink) -> Self {
        Self { sink }
    }

    /// Run `statements` in order on the session's open transaction.
    ///
    /// With `tolerate_reapply`, a failing statement is recorded as a
    /// [`ExecutionOutcome::BenignFailure`], the transaction is rolled back and
    /// reopened, and the next statement runs. Without it, the first failure is
    /// recorded as a [`ExecutionOutcome::HardFailure`] and the phase stops,
    /// leaving the transaction for the caller to roll back.
    ///
    /// Only connection-level errors and write-write conflicts with another
    /// session are returned as `Err`.
    pub async fn run_phase(
        &self,
        session: &mut dyn Session,
        instance: InstanceId,
        phase: Phase,
        statements: &[String],
        tolerate_reapply: bool,
    ) -> EvalResult<PhaseReport> {
        let mut report = PhaseReport {
            phase,
            outcomes: Vec::with_capacity(statements.len()),
        };

        if statements.is_empty() {
            self.sink.emit(Event::PhaseSkipped { instance, phase });
            return Ok(report);
        }

        for sql in statements {
            let outcome = self
                .run_statement(session, instance, phase, sql, tolerate_reapply)
                .await?;
            let stop = matches!(outcome, ExecutionOutcome::HardFailure(_));
            report.outcomes.push(outcome);
            if stop {
                break;
            }
        }

        Ok(report)
    }

    /// Run a single statement with the same classification as
    /// [`run_phase`](Self::run_phase)
    pub async fn run_statement(
        &self,
        session: &mut dyn Session,
        instance: InstanceId,
        phase: Phase,
        sql: &str,
        tolerate_reapply: bool,
    ) -> EvalResult<ExecutionOutcome> {
        match session.execute(sql).await {
            Ok(output) => {
                let rows = output.into_rows();
                self.sink.emit(Event::StatementSucceeded {
                    instance,
                    phase,
                    sql: sql.to_string(),
                    rows: rows.as_ref().map(ResultSet::len),
                });
                Ok(ExecutionOutcome::Success(rows))
            }
            Err(e) if e.is_connection() => Err(e.into()),
            // Another instance's fixtures, not this statement, caused it
            Err(e) if e.is_conflict() => {
                self.sink.emit(Event::StatementFailed {
                    instance,
                    phase,
                    sql: sql.to_string(),
                    benign: false,
                    message: e.message().to_string(),
                });
                Err(e.into())
            }
            Err(e) => {
                let message = e.message().to_string();
                self.sink.emit(Event::StatementFailed {
                    instance,
                    phase,
                    sql: sql.to_string(),
                    benign: tolerate_reapply,
                    message: message.clone(),
                });
                if !tolerate_reapply {
                    return Ok(ExecutionOutcome::HardFailure(message));
                }
                self.recover(session, instance, phase).await?;
                Ok(ExecutionOutcome::BenignFailure(message))
            }
        }
    }

    /// Roll back the aborted transaction and open a fresh one
    pub async fn recover(
        &self,
        session: &mut dyn Session,
        instance: InstanceId,
        phase: Phase,
    ) -> EvalResult<()> {
        if session.in_transaction() {
            session.rollback().await?;
            session.begin().await?;
            self.sink.emit(Event::RolledBack { instance, phase });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "phase_test.rs"]
mod tests;
