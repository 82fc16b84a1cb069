//! Iterative repair controller
//!
//! Per instance, on one exclusive session:
//!
//! ```text
//! Init -> Preprocessed -> Attempting(0..n) -> Matched | Exhausted -> CleanedUp -> Committed
//! ```
//!
//! Each attempt asks the generator for a corrected query, runs it, and
//! compares its rows against the reference with exact equality. A mismatch
//! or failure is appended to the prompt as feedback. Cleanup and the commit
//! happen whatever the match outcome; correctness lives only in the
//! returned [`RepairResult`].

use crate::cancel::CancelFlag;
use crate::error::{EvalError, EvalResult};
use crate::events::{Event, EventSink};
use crate::extract::{condense_error, QueryExtractor};
use crate::generator::Generator;
use crate::phase::{ExecutionOutcome, Phase, PhaseRunner};
use crate::prompt::PromptBuilder;
use sm_core::{Instance, RepairResult, ResultSet, SamplingParams};
use sm_db::Session;
use std::sync::Arc;

/// Controller states, in the order an instance passes through them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairState {
    Init,
    Preprocessed,
    Attempting(usize),
    Matched(usize),
    Exhausted,
    CleanedUp,
    Committed,
}

/// One loop iteration
#[derive(Debug, Clone, PartialEq)]
pub struct RepairAttempt {
    /// 0-based step
    pub step: usize,
    /// Query extracted from the response; `None` if extraction failed
    pub candidate: Option<String>,
    /// Execution outcome; `None` if nothing was executed
    pub outcome: Option<ExecutionOutcome>,
    /// Whether the candidate's rows equal the reference
    pub matched: bool,
}

/// Everything one repair run produced
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    /// Terminal record for the recorder
    pub result: RepairResult,
    /// Every attempt, in order
    pub attempts: Vec<RepairAttempt>,
    /// The last prompt sent to the generator
    pub final_prompt: String,
    /// States visited, ending in [`RepairState::Committed`]
    pub trace: Vec<RepairState>,
}

/// Drives the bounded feedback loop for single instances
///
/// Cheap to clone; one controller can serve many concurrent instances as
/// long as each gets its own session.
#[derive(Clone)]
pub struct RepairController {
    generator: Arc<dyn Generator>,
    extractor: Arc<dyn QueryExtractor>,
    prompts: Arc<PromptBuilder>,
    sink: Arc<dyn EventSink>,
    sampling: SamplingParams,
    max_steps: usize,
    cancel: CancelFlag,
}

impl RepairController {
    /// Create a controller allowing `max_steps` attempts per instance
    pub fn new(
        generator: Arc<dyn Generator>,
        extractor: Arc<dyn QueryExtractor>,
        prompts: Arc<PromptBuilder>,
        sink: Arc<dyn EventSink>,
        sampling: SamplingParams,
        max_steps: usize,
    ) -> Self {
        Self {
            generator,
            extractor,
            prompts,
            sink,
            sampling,
            max_steps,
            cancel: CancelFlag::new(),
        }
    }

    /// Stop at the next step boundary once `cancel` is set
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Maximum attempts per instance
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Repair one instance against its reference rows
    ///
    /// Takes ownership of the session and closes it before returning. On
    /// cancellation the transaction is rolled back and
    /// [`EvalError::Cancelled`] is returned. A generator failure ends the
    /// loop early; cleanup and commit still run, then the error is returned.
    pub async fn repair(
        &self,
        mut session: Box<dyn Session>,
        instance: &Instance,
        reference: &ResultSet,
    ) -> EvalResult<RepairOutcome> {
        let id = instance.instance_id;
        let runner = PhaseRunner::new(self.sink.as_ref());
        let mut trace = vec![RepairState::Init];

        let mut prompt = match self.prompts.initial(instance) {
            Ok(prompt) => prompt,
            Err(e) => {
                session.close().await?;
                return Err(e);
            }
        };

        session.begin().await?;
        runner
            .run_phase(
                session.as_mut(),
                id,
                Phase::Preprocess,
                &instance.preprocess_sql,
                true,
            )
            .await?;
        trace.push(RepairState::Preprocessed);

        let mut attempts: Vec<RepairAttempt> = Vec::with_capacity(self.max_steps);
        let mut final_prompt = String::new();
        let mut last_candidate: Option<String> = None;
        let mut last_response: Option<String> = None;
        let mut matched_at: Option<usize> = None;
        let mut generator_error: Option<EvalError> = None;

        for step in 0..self.max_steps {
            if self.cancel.is_cancelled() {
                session.rollback().await?;
                session.close().await?;
                return Err(EvalError::Cancelled);
            }
            trace.push(RepairState::Attempting(step));
            self.sink.emit(Event::AttemptStarted { instance: id, step });

            final_prompt = prompt.render();
            let response = match self.generator.generate(&final_prompt, &self.sampling).await {
                Ok(response) => response,
                Err(e) => {
                    generator_error = Some(e);
                    break;
                }
            };

            let candidate = self.extractor.extract(&response);
            last_response = Some(response);
            let Some(candidate) = candidate else {
                self.sink.emit(Event::ExtractionFailed { instance: id, step });
                attempts.push(RepairAttempt {
                    step,
                    candidate: None,
                    outcome: None,
                    matched: false,
                });
                continue;
            };
            self.sink.emit(Event::CandidateExtracted {
                instance: id,
                step,
                sql: candidate.clone(),
            });
            last_candidate = Some(candidate.clone());

            let outcome = runner
                .run_statement(session.as_mut(), id, Phase::Candidate, &candidate, false)
                .await?;
            let matched = outcome.rows() == Some(reference);

            let feedback = match &outcome {
                _ if matched => None,
                ExecutionOutcome::Success(rows) => Some(
                    rows.as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| ResultSet::default().to_string()),
                ),
                ExecutionOutcome::HardFailure(message)
                | ExecutionOutcome::BenignFailure(message) => Some(condense_error(message)),
            };
            let failed = matches!(outcome, ExecutionOutcome::HardFailure(_));

            attempts.push(RepairAttempt {
                step,
                candidate: Some(candidate),
                outcome: Some(outcome),
                matched,
            });

            if matched {
                self.sink.emit(Event::Matched { instance: id, step });
                matched_at = Some(step);
                break;
            }

            self.sink.emit(Event::AttemptMismatched { instance: id, step });
            if let Some(observed) = feedback {
                prompt.push_feedback(step, &observed);
            }
            if failed {
                // The failed statement aborted the transaction; restore fixtures
                runner.recover(session.as_mut(), id, Phase::Candidate).await?;
                runner
                    .run_phase(
                        session.as_mut(),
                        id,
                        Phase::Preprocess,
                        &instance.preprocess_sql,
                        true,
                    )
                    .await?;
            }
        }

        match matched_at {
            Some(step) => trace.push(RepairState::Matched(step)),
            None => {
                trace.push(RepairState::Exhausted);
                if generator_error.is_none() {
                    self.sink.emit(Event::Exhausted {
                        instance: id,
                        steps: attempts.len(),
                    });
                }
            }
        }

        runner
            .run_phase(
                session.as_mut(),
                id,
                Phase::Cleanup,
                &instance.clean_up_sql,
                true,
            )
            .await?;
        trace.push(RepairState::CleanedUp);

        session.commit().await?;
        self.sink.emit(Event::Committed { instance: id });
        trace.push(RepairState::Committed);
        session.close().await?;

        if let Some(e) = generator_error {
            return Err(e);
        }

        Ok(RepairOutcome {
            result: RepairResult {
                instance_id: id,
                success: matched_at.is_some(),
                final_response: last_candidate.or(last_response).unwrap_or_default(),
                steps: attempts.len(),
            },
            attempts,
            final_prompt,
            trace,
        })
    }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;
