//! sm-eval - Evaluation engine for sqlmend
//!
//! This crate runs SQL phases under transactional discipline, collects
//! ground-truth reference outputs, and drives the bounded feedback loop
//! that asks a generator for corrected queries until one reproduces the
//! reference or the step budget runs out.

pub mod artifact;
pub mod batch;
pub mod cancel;
pub mod collector;
pub mod controller;
pub mod error;
pub mod events;
pub mod extract;
pub mod generator;
pub mod phase;
pub mod prompt;
pub mod recorder;
pub mod reference;

pub use batch::{BatchOptions, BatchSummary, InstanceReport, InstanceStatus, Observer, RepairBatch};
pub use cancel::CancelFlag;
pub use collector::{CollectionSummary, GroundTruthCollector};
pub use controller::{RepairAttempt, RepairController, RepairOutcome, RepairState};
pub use error::{EvalError, EvalResult};
pub use events::{Event, EventSink, LogSink, NullSink};
pub use extract::{condense_error, MarkerExtractor, QueryExtractor};
pub use generator::{Generator, HttpGenerator};
pub use phase::{ExecutionOutcome, Phase, PhaseReport, PhaseRunner};
pub use prompt::{PromptBuilder, PromptContext, DEFAULT_TEMPLATE};
pub use recorder::ResultRecorder;
pub use reference::ReferenceStore;

#[cfg(any(test, feature = "test-support"))]
pub use events::RecordingSink;
#[cfg(any(test, feature = "test-support"))]
pub use generator::ScriptedGenerator;
