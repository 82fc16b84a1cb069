//! Ground-truth collector
//!
//! Runs each instance's reference solution once, on one session, and keeps
//! the rows of the last solution statement as that instance's reference
//! output. Only non-empty references are stored; the ids that produced one
//! form the qualifying set for repair evaluation.

use crate::cancel::CancelFlag;
use crate::error::{EvalError, EvalResult};
use crate::events::{Event, EventSink};
use crate::phase::{Phase, PhaseRunner};
use crate::reference::ReferenceStore;
use sm_core::{Instance, InstanceId};
use sm_db::{Database, Session};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Totals of one collection run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionSummary {
    /// Instances processed
    pub total: usize,
    /// Instances whose reference was stored
    pub captured: usize,
    /// Instances whose solution returned no rows
    pub empty: usize,
    /// Instances skipped because the solution failed
    pub failed: usize,
    /// Ids with a stored reference
    pub qualifying: BTreeSet<InstanceId>,
    /// Wall-clock time of the run
    pub duration: Duration,
}

/// What happened to one instance
enum Collected {
    Captured,
    Empty,
    Failed,
}

/// Captures reference outputs into a [`ReferenceStore`]
pub struct GroundTruthCollector<'a> {
    store: &'a ReferenceStore,
    sink: &'a dyn EventSink,
    cancel: CancelFlag,
}

impl<'a> GroundTruthCollector<'a> {
    /// Create a collector writing into `store`
    pub fn new(store: &'a ReferenceStore, sink: &'a dyn EventSink) -> Self {
        Self {
            store,
            sink,
            cancel: CancelFlag::new(),
        }
    }

    /// Stop between instances once `cancel` is set
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Collect references for every instance, in order
    ///
    /// A connection or artifact failure aborts the run and is returned; the
    /// session is rolled back and closed first. A failing solution only
    /// skips its instance. The qualifying-id file is written at the end.
    pub async fn collect(
        &self,
        db: &dyn Database,
        instances: &[Instance],
    ) -> EvalResult<CollectionSummary> {
        let start = Instant::now();
        let mut session = db.connect().await?;
        let mut summary = CollectionSummary::default();

        for instance in instances {
            if self.cancel.is_cancelled() {
                let _ = session.close().await;
                return Err(EvalError::Cancelled);
            }

            let collected = match self.collect_one(session.as_mut(), instance).await {
                Ok(collected) => collected,
                Err(e) => {
                    let _ = session.close().await;
                    return Err(e);
                }
            };

            summary.total += 1;
            match collected {
                Collected::Captured => {
                    summary.captured += 1;
                    summary.qualifying.insert(instance.instance_id);
                }
                Collected::Empty => summary.empty += 1,
                Collected::Failed => summary.failed += 1,
            }
        }

        session.close().await?;
        self.store.write_ids(&summary.qualifying)?;
        summary.duration = start.elapsed();
        Ok(summary)
    }

    async fn collect_one(
        &self,
        session: &mut dyn Session,
        instance: &Instance,
    ) -> EvalResult<Collected> {
        let id = instance.instance_id;
        let runner = PhaseRunner::new(self.sink);

        session.begin().await?;
        runner
            .run_phase(session, id, Phase::Preprocess, &instance.preprocess_sql, true)
            .await?;

        let solution = runner
            .run_phase(session, id, Phase::Solution, &instance.sol_sql, false)
            .await?;
        let failure = solution.hard_failure().map(str::to_string);
        if failure.is_some() {
            // The failed statement aborted the transaction; cleanup gets a fresh one
            runner.recover(session, id, Phase::Solution).await?;
        }
        let rows = solution.last_rows().cloned().unwrap_or_default();

        runner
            .run_phase(session, id, Phase::Cleanup, &instance.clean_up_sql, true)
            .await?;
        session.commit().await?;
        self.sink.emit(Event::Committed { instance: id });

        if let Some(message) = failure {
            self.sink.emit(Event::ReferenceSkipped {
                instance: id,
                reason: format!("solution failed: {message}"),
            });
            return Ok(Collected::Failed);
        }

        if rows.is_empty() {
            self.sink.emit(Event::ReferenceSkipped {
                instance: id,
                reason: "empty result set".to_string(),
            });
            return Ok(Collected::Empty);
        }

        self.store.write(id, &rows)?;
        self.sink.emit(Event::ReferenceCaptured {
            instance: id,
            rows: rows.len(),
        });
        Ok(Collected::Captured)
    }
}

#[cfg(test)]
#[path = "collector_test.rs"]
mod tests;
