//! Structured evaluation events
//!
//! The phase runner, collector and controller never log directly. They emit
//! [`Event`]s into an [`EventSink`] handed to them at construction, so the
//! caller decides where audit records go.

use crate::phase::Phase;
use sm_core::InstanceId;

/// One audit record
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A statement executed successfully
    StatementSucceeded {
        instance: InstanceId,
        phase: Phase,
        sql: String,
        /// Row count, or `None` for statements that return no rows
        rows: Option<usize>,
    },
    /// A statement failed
    StatementFailed {
        instance: InstanceId,
        phase: Phase,
        sql: String,
        /// Tolerated (already-applied) failure rather than a hard one
        benign: bool,
        message: String,
    },
    /// A phase had no statements
    PhaseSkipped { instance: InstanceId, phase: Phase },
    /// The open transaction was rolled back after a failure in `phase`
    RolledBack { instance: InstanceId, phase: Phase },
    /// A repair step began
    AttemptStarted { instance: InstanceId, step: usize },
    /// A candidate query was extracted from the generator response
    CandidateExtracted {
        instance: InstanceId,
        step: usize,
        sql: String,
    },
    /// The generator response held no recognizable query
    ExtractionFailed { instance: InstanceId, step: usize },
    /// The candidate's output differed from the reference
    AttemptMismatched { instance: InstanceId, step: usize },
    /// The candidate reproduced the reference output
    Matched { instance: InstanceId, step: usize },
    /// Every step was used without a match
    Exhausted { instance: InstanceId, steps: usize },
    /// The instance transaction was committed
    Committed { instance: InstanceId },
    /// A non-empty reference output was captured
    ReferenceCaptured { instance: InstanceId, rows: usize },
    /// No reference output was kept for the instance
    ReferenceSkipped {
        instance: InstanceId,
        reason: String,
    },
}

impl Event {
    /// Instance the event belongs to
    pub fn instance(&self) -> InstanceId {
        match self {
            Event::StatementSucceeded { instance, .. }
            | Event::StatementFailed { instance, .. }
            | Event::PhaseSkipped { instance, .. }
            | Event::RolledBack { instance, .. }
            | Event::AttemptStarted { instance, .. }
            | Event::CandidateExtracted { instance, .. }
            | Event::ExtractionFailed { instance, .. }
            | Event::AttemptMismatched { instance, .. }
            | Event::Matched { instance, .. }
            | Event::Exhausted { instance, .. }
            | Event::Committed { instance }
            | Event::ReferenceCaptured { instance, .. }
            | Event::ReferenceSkipped { instance, .. } => *instance,
        }
    }
}

/// Destination for [`Event`]s
pub trait EventSink: Send + Sync {
    /// Record one event
    fn emit(&self, event: Event);
}

/// Drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// Forwards events to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        match event {
            Event::StatementSucceeded {
                instance,
                phase,
                sql,
                rows,
            } => match rows {
                Some(n) => log::info!("Instance {instance}: {phase} ok ({n} rows): {sql}"),
                None => log::info!("Instance {instance}: {phase} ok: {sql}"),
            },
            Event::StatementFailed {
                instance,
                phase,
                sql,
                benign: true,
                message,
            } => log::warn!("Instance {instance}: {phase} failed (tolerated): {sql}: {message}"),
            Event::StatementFailed {
                instance,
                phase,
                sql,
                benign: false,
                message,
            } => log::error!("Instance {instance}: {phase} failed: {sql}: {message}"),
            Event::PhaseSkipped { instance, phase } => {
                log::info!("Instance {instance}: No {phase} SQL")
            }
            Event::RolledBack { instance, phase } => {
                log::warn!("Instance {instance}: Rolled back after {phase} failure")
            }
            Event::AttemptStarted { instance, step } => {
                log::debug!("Instance {instance}: Step {step} started")
            }
            Event::CandidateExtracted {
                instance,
                step,
                sql,
            } => log::info!("Instance {instance}: Step {step} extracted SQL: {sql}"),
            Event::ExtractionFailed { instance, step } => {
                log::error!("Instance {instance}: Step {step} no SQL query found in response")
            }
            Event::AttemptMismatched { instance, step } => {
                log::info!("Instance {instance}: Incorrect output at step {step}")
            }
            Event::Matched { instance, step } => {
                log::info!("Instance {instance}: Correct output achieved at step {step}")
            }
            Event::Exhausted { instance, steps } => {
                log::info!("Instance {instance}: No match after {steps} steps")
            }
            Event::Committed { instance } => log::debug!("Instance {instance}: Committed"),
            Event::ReferenceCaptured { instance, rows } => {
                log::info!("Instance {instance}: Captured reference output ({rows} rows)")
            }
            Event::ReferenceSkipped { instance, reason } => {
                log::info!("Instance {instance}: No reference output: {reason}")
            }
        }
    }
}

/// Keeps every event in memory for assertions
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<Event>>,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Recorded events for one instance
    pub fn events_for(&self, instance: InstanceId) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.instance() == instance)
            .collect()
    }

    /// Number of recorded events matching `pred`
    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl EventSink for RecordingSink {
    fn emit(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
    }
}
