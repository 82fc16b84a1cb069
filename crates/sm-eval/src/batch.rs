//! Batch driver
//!
//! Repairs many instances with bounded concurrency. Every instance gets its
//! own session; attempts inside one instance stay sequential. A fatal error
//! (lost connection, unwritable artifact) stops scheduling and is reported
//! in the summary; any other per-instance error is isolated.
//!
//! Sessions share one database, so two instances applying the same fixtures
//! can hit a write-write conflict. Instances run under a shared gate; an
//! instance that conflicted is rolled back and retried once while holding
//! the gate exclusively, so the retry never overlaps another instance.

use crate::cancel::CancelFlag;
use crate::controller::{RepairController, RepairOutcome};
use crate::error::{EvalError, EvalResult};
use crate::recorder::ResultRecorder;
use crate::reference::ReferenceStore;
use sm_core::{Instance, InstanceId, ResultSet};
use sm_db::Database;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};

/// How one instance ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    /// A candidate reproduced the reference
    Matched,
    /// The step budget ran out
    Exhausted,
    /// A response artifact already existed
    Skipped,
    /// No reference output was collected
    NoReference,
    /// The instance failed without halting the batch
    Errored,
    /// Not finished because the run was stopped
    Cancelled,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceStatus::Matched => write!(f, "matched"),
            InstanceStatus::Exhausted => write!(f, "exhausted"),
            InstanceStatus::Skipped => write!(f, "skipped"),
            InstanceStatus::NoReference => write!(f, "no_reference"),
            InstanceStatus::Errored => write!(f, "error"),
            InstanceStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-instance line of a batch summary
#[derive(Debug, Clone)]
pub struct InstanceReport {
    pub instance_id: InstanceId,
    pub status: InstanceStatus,
    /// Steps consumed (0 unless the instance ran)
    pub steps: usize,
    pub duration: Duration,
    pub error: Option<String>,
}

impl InstanceReport {
    fn new(instance_id: InstanceId, status: InstanceStatus, start: Instant) -> Self {
        Self {
            instance_id,
            status,
            steps: 0,
            duration: start.elapsed(),
            error: None,
        }
    }

    fn with_error(mut self, error: &EvalError) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Totals of one batch run
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub reports: Vec<InstanceReport>,
    pub duration: Duration,
    /// First fatal error, if the run was halted by one
    pub fatal: Option<EvalError>,
}

impl BatchSummary {
    /// Instances in the batch
    pub fn total(&self) -> usize {
        self.reports.len()
    }

    /// Instances that ended with `status`
    pub fn count(&self, status: InstanceStatus) -> usize {
        self.reports.iter().filter(|r| r.status == status).count()
    }

    /// Whether the batch ran to completion without a fatal error
    pub fn is_complete(&self) -> bool {
        self.fatal.is_none() && self.count(InstanceStatus::Cancelled) == 0
    }
}

/// Batch settings
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Instances repaired at the same time
    pub concurrency: usize,
    /// Re-run instances that already have a response artifact
    pub force: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            force: false,
        }
    }
}

/// Callback invoked as each instance finishes
pub type Observer = Arc<dyn Fn(&InstanceReport) + Send + Sync>;

/// Runs the repair controller over a set of instances
pub struct RepairBatch {
    db: Arc<dyn Database>,
    controller: RepairController,
    references: Arc<ReferenceStore>,
    recorder: Arc<ResultRecorder>,
    options: BatchOptions,
    cancel: CancelFlag,
    observer: Option<Observer>,
}

impl RepairBatch {
    /// Create a batch driver
    pub fn new(
        db: Arc<dyn Database>,
        controller: RepairController,
        references: ReferenceStore,
        recorder: ResultRecorder,
        options: BatchOptions,
    ) -> Self {
        Self {
            db,
            controller,
            references: Arc::new(references),
            recorder: Arc::new(recorder),
            options,
            cancel: CancelFlag::new(),
            observer: None,
        }
    }

    /// Use an externally controlled stop flag (e.g. set on Ctrl-C)
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Call `observer` whenever an instance finishes
    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Repair every instance and report how each one ended
    pub async fn run(&self, instances: Vec<Instance>) -> BatchSummary {
        let start = Instant::now();
        let mut summary = BatchSummary::default();

        match self.recorder.clean_partial() {
            Ok(0) => {}
            Ok(n) => log::warn!("Removed {n} partial response artifacts from an earlier run"),
            Err(e) => {
                summary.fatal = Some(e);
                summary.duration = start.elapsed();
                return summary;
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let controller = self.controller.clone().with_cancel(self.cancel.clone());
        let gate = Arc::new(RwLock::new(()));
        let mut handles = Vec::with_capacity(instances.len());

        for instance in instances {
            let id = instance.instance_id;
            let task = InstanceTask {
                db: Arc::clone(&self.db),
                controller: controller.clone(),
                references: Arc::clone(&self.references),
                recorder: Arc::clone(&self.recorder),
                cancel: self.cancel.clone(),
                gate: Arc::clone(&gate),
                force: self.options.force,
            };
            let semaphore = Arc::clone(&semaphore);
            let observer = self.observer.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    // Closed semaphore means the run is stopping
                    Err(_) => {
                        return (
                            InstanceReport::new(id, InstanceStatus::Cancelled, Instant::now()),
                            None,
                        )
                    }
                };

                let (report, fatal) = task.run(instance).await;
                if fatal.is_some() {
                    task.cancel.cancel();
                }
                if let Some(observer) = observer {
                    observer(&report);
                }
                (report, fatal)
            });
            handles.push((id, handle));
        }

        for (id, handle) in handles {
            match handle.await {
                Ok((report, fatal)) => {
                    if summary.fatal.is_none() {
                        summary.fatal = fatal;
                    }
                    summary.reports.push(report);
                }
                Err(e) => {
                    log::error!("Instance {id}: Task join error: {e}");
                    let mut report =
                        InstanceReport::new(id, InstanceStatus::Errored, Instant::now());
                    report.error = Some(e.to_string());
                    summary.reports.push(report);
                }
            }
        }

        summary.duration = start.elapsed();
        summary
    }
}

/// Everything one spawned instance needs
struct InstanceTask {
    db: Arc<dyn Database>,
    controller: RepairController,
    references: Arc<ReferenceStore>,
    recorder: Arc<ResultRecorder>,
    cancel: CancelFlag,
    /// Held shared by every running instance, exclusively by a conflict retry
    gate: Arc<RwLock<()>>,
    force: bool,
}

impl InstanceTask {
    async fn run(&self, instance: Instance) -> (InstanceReport, Option<EvalError>) {
        let id = instance.instance_id;
        let start = Instant::now();

        if self.cancel.is_cancelled() {
            return (InstanceReport::new(id, InstanceStatus::Cancelled, start), None);
        }
        if !self.force && self.recorder.exists(id) {
            log::info!("Instance {id}: Response exists, skipping");
            return (InstanceReport::new(id, InstanceStatus::Skipped, start), None);
        }

        let reference = match self.references.read(id) {
            Ok(reference) => reference,
            Err(e @ EvalError::MissingReference(_)) => {
                log::info!("Instance {id}: No reference output, skipping");
                let report = InstanceReport::new(id, InstanceStatus::NoReference, start);
                return (report.with_error(&e), None);
            }
            Err(e) => {
                log::error!("Instance {id}: {e}");
                let report = InstanceReport::new(id, InstanceStatus::Errored, start);
                return (report.with_error(&e), None);
            }
        };

        let attempt = {
            let _shared = self.gate.read().await;
            self.repair(&instance, &reference).await
        };
        let attempt = match attempt {
            Err(EvalError::Conflict(message)) => {
                log::warn!("Instance {id}: {message}; retrying without concurrency");
                let _exclusive = self.gate.write().await;
                self.repair(&instance, &reference).await
            }
            other => other,
        };

        let outcome = match attempt {
            Ok(outcome) => outcome,
            Err(EvalError::Cancelled) => {
                return (InstanceReport::new(id, InstanceStatus::Cancelled, start), None)
            }
            Err(e) => {
                log::error!("Instance {id}: {e}");
                let report = InstanceReport::new(id, InstanceStatus::Errored, start);
                let report = report.with_error(&e);
                let fatal = e.is_fatal().then_some(e);
                return (report, fatal);
            }
        };

        if let Err(e) = self.recorder.record(&outcome.result) {
            log::error!("Instance {id}: {e}");
            let report = InstanceReport::new(id, InstanceStatus::Errored, start);
            return (report.with_error(&e), Some(e));
        }

        let status = if outcome.result.success {
            InstanceStatus::Matched
        } else {
            InstanceStatus::Exhausted
        };
        let mut report = InstanceReport::new(id, status, start);
        report.steps = outcome.result.steps;
        (report, None)
    }

    async fn repair(
        &self,
        instance: &Instance,
        reference: &ResultSet,
    ) -> EvalResult<RepairOutcome> {
        let session = self.db.connect().await?;
        self.controller.repair(session, instance, reference).await
    }
}

#[cfg(test)]
#[path = "batch_test.rs"]
mod tests;
