use super::*;
use crate::events::NullSink;
use crate::extract::MarkerExtractor;
use crate::generator::ScriptedGenerator;
use crate::prompt::PromptBuilder;
use async_trait::async_trait;
use sm_core::{ResultSet, SamplingParams, Value};
use sm_db::{DbError, DbResult, DuckDbBackend, Session, StatementOutput};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn controller(responses: &[&str], max_steps: usize) -> (RepairController, Arc<ScriptedGenerator>) {
    let generator = Arc::new(ScriptedGenerator::new(responses.iter().copied()));
    let controller = RepairController::new(
        generator.clone(),
        Arc::new(MarkerExtractor::new("</think>").unwrap()),
        Arc::new(PromptBuilder::new()),
        Arc::new(NullSink),
        SamplingParams::default(),
        max_steps,
    );
    (controller, generator)
}

fn references(dir: &Path, ids: &[u64]) -> ReferenceStore {
    let store = ReferenceStore::new(dir.join("gtout"), dir.join("query_ids.json"));
    for id in ids {
        store
            .write(
                InstanceId::new(*id),
                &ResultSet::new(vec![vec![Value::Integer(1)]]),
            )
            .unwrap();
    }
    store
}

fn instances(ids: &[u64]) -> Vec<Instance> {
    ids.iter().map(|id| Instance::new(*id)).collect()
}

fn batch(
    dir: &Path,
    controller: RepairController,
    reference_ids: &[u64],
    options: BatchOptions,
) -> RepairBatch {
    RepairBatch::new(
        Arc::new(DuckDbBackend::in_memory().unwrap()),
        controller,
        references(dir, reference_ids),
        ResultRecorder::new(dir.join("responses")),
        options,
    )
}

#[tokio::test]
async fn test_batch_records_every_instance() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, _) = controller(&["</think>SELECT 1"], 3);
    let summary = batch(
        dir.path(),
        controller,
        &[1, 2, 3, 4],
        BatchOptions {
            concurrency: 3,
            force: false,
        },
    )
    .run(instances(&[1, 2, 3, 4]))
    .await;

    assert!(summary.is_complete());
    assert_eq!(summary.total(), 4);
    assert_eq!(summary.count(InstanceStatus::Matched), 4);
    let ids: Vec<u64> = summary.reports.iter().map(|r| r.instance_id.get()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);

    let recorder = ResultRecorder::new(dir.path().join("responses"));
    for id in 1..=4 {
        let result = recorder.read(InstanceId::new(id)).unwrap();
        assert!(result.success);
        assert_eq!(result.final_response, "SELECT 1");
    }
}

#[tokio::test]
async fn test_exhausted_instance_still_written() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, generator) = controller(&["</think>SELECT 2"], 2);
    let summary = batch(dir.path(), controller, &[5], BatchOptions::default())
        .run(instances(&[5]))
        .await;

    assert_eq!(summary.count(InstanceStatus::Exhausted), 1);
    assert_eq!(summary.reports[0].steps, 2);
    assert_eq!(generator.calls(), 2);
    let result = ResultRecorder::new(dir.path().join("responses"))
        .read(InstanceId::new(5))
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.final_response, "SELECT 2");
}

#[tokio::test]
async fn test_missing_reference_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, generator) = controller(&["</think>SELECT 1"], 3);
    let summary = batch(dir.path(), controller, &[1], BatchOptions::default())
        .run(instances(&[1, 2]))
        .await;

    assert_eq!(summary.count(InstanceStatus::Matched), 1);
    assert_eq!(summary.count(InstanceStatus::NoReference), 1);
    assert!(summary.fatal.is_none());
    assert_eq!(generator.calls(), 1);
    assert!(!ResultRecorder::new(dir.path().join("responses")).exists(InstanceId::new(2)));
}

#[tokio::test]
async fn test_existing_results_skipped_unless_forced() {
    let dir = tempfile::tempdir().unwrap();

    let (first, _) = controller(&["</think>SELECT 1"], 3);
    batch(dir.path(), first, &[1], BatchOptions::default())
        .run(instances(&[1]))
        .await;

    let (again, generator) = controller(&["</think>SELECT 1"], 3);
    let summary = batch(dir.path(), again, &[1], BatchOptions::default())
        .run(instances(&[1]))
        .await;
    assert_eq!(summary.count(InstanceStatus::Skipped), 1);
    assert_eq!(generator.calls(), 0);

    let (forced, generator) = controller(&["</think>SELECT 1"], 3);
    let options = BatchOptions {
        concurrency: 1,
        force: true,
    };
    let summary = batch(dir.path(), forced, &[1], options)
        .run(instances(&[1]))
        .await;
    assert_eq!(summary.count(InstanceStatus::Matched), 1);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_partial_artifacts_removed() {
    let dir = tempfile::tempdir().unwrap();
    let responses = dir.path().join("responses");
    std::fs::create_dir_all(&responses).unwrap();
    std::fs::write(responses.join("response_1.csv.tmp"), "instance_id,resp").unwrap();

    let (controller, _) = controller(&["</think>SELECT 1"], 1);
    batch(dir.path(), controller, &[1], BatchOptions::default())
        .run(instances(&[1]))
        .await;

    assert!(!responses.join("response_1.csv.tmp").exists());
    assert!(responses.join("response_1.csv").exists());
}

#[tokio::test]
async fn test_artifact_failure_halts_batch() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, generator) = controller(&["</think>SELECT 1"], 3);
    // A plain file where the response directory should be
    std::fs::write(dir.path().join("responses"), "").unwrap();

    let summary = batch(dir.path(), controller, &[1, 2, 3], BatchOptions::default())
        .run(instances(&[1, 2, 3]))
        .await;

    assert!(matches!(summary.fatal, Some(EvalError::ArtifactWrite { .. })));
    assert!(!summary.is_complete());
    assert_eq!(summary.count(InstanceStatus::Errored), 1);
    assert_eq!(summary.count(InstanceStatus::Cancelled), 2);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_cancelled_batch_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, generator) = controller(&["</think>SELECT 1"], 3);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let summary = batch(dir.path(), controller, &[1, 2], BatchOptions::default())
        .with_cancel(cancel)
        .run(instances(&[1, 2]))
        .await;

    assert_eq!(summary.count(InstanceStatus::Cancelled), 2);
    assert!(summary.fatal.is_none());
    assert_eq!(generator.calls(), 0);
    assert!(!dir.path().join("responses/response_1.csv").exists());
}

#[tokio::test]
async fn test_observer_sees_each_instance() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, _) = controller(&["</think>SELECT 1"], 1);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    batch(dir.path(), controller, &[1, 2], BatchOptions::default())
        .with_observer(Arc::new(move |report: &InstanceReport| {
            sink.lock().unwrap().push((report.instance_id.get(), report.status));
        }))
        .run(instances(&[1, 2]))
        .await;

    let mut seen = seen.lock().unwrap().clone();
    seen.sort_by_key(|(id, _)| *id);
    assert_eq!(
        seen,
        vec![(1, InstanceStatus::Matched), (2, InstanceStatus::Matched)]
    );
}

/// Fails the first `remaining` commits the way DuckDB reports a
/// write-write conflict with a concurrent transaction
struct ConflictingDb {
    inner: DuckDbBackend,
    remaining: Arc<AtomicUsize>,
}

struct ConflictingSession {
    inner: Box<dyn Session>,
    remaining: Arc<AtomicUsize>,
}

#[async_trait]
impl Database for ConflictingDb {
    async fn connect(&self) -> DbResult<Box<dyn Session>> {
        Ok(Box::new(ConflictingSession {
            inner: self.inner.connect().await?,
            remaining: self.remaining.clone(),
        }))
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

#[async_trait]
impl Session for ConflictingSession {
    async fn execute(&mut self, sql: &str) -> DbResult<StatementOutput> {
        self.inner.execute(sql).await
    }

    async fn begin(&mut self) -> DbResult<()> {
        self.inner.begin().await
    }

    async fn commit(&mut self) -> DbResult<()> {
        let conflict = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflict {
            self.inner.rollback().await?;
            return Err(DbError::TransactionError(
                "COMMIT failed: TransactionContext Error: Catalog write-write conflict on create with \"fx\""
                    .to_string(),
            ));
        }
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.inner.rollback().await
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        self.inner.close().await
    }
}

#[tokio::test]
async fn test_conflicted_instance_retried() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, generator) = controller(&["</think>SELECT 1"], 3);
    let db = ConflictingDb {
        inner: DuckDbBackend::in_memory().unwrap(),
        remaining: Arc::new(AtomicUsize::new(1)),
    };

    let summary = RepairBatch::new(
        Arc::new(db),
        controller,
        references(dir.path(), &[1]),
        ResultRecorder::new(dir.path().join("responses")),
        BatchOptions::default(),
    )
    .run(instances(&[1]))
    .await;

    assert!(summary.is_complete());
    assert_eq!(summary.count(InstanceStatus::Matched), 1);
    // The conflicted run was thrown away and repeated
    assert_eq!(generator.calls(), 2);
    let result = ResultRecorder::new(dir.path().join("responses"))
        .read(InstanceId::new(1))
        .unwrap();
    assert!(result.success);
    assert_eq!(result.steps, 1);
}

#[tokio::test]
async fn test_repeated_conflict_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, _) = controller(&["</think>SELECT 1"], 3);
    let db = ConflictingDb {
        inner: DuckDbBackend::in_memory().unwrap(),
        remaining: Arc::new(AtomicUsize::new(2)),
    };

    let summary = RepairBatch::new(
        Arc::new(db),
        controller,
        references(dir.path(), &[1, 2]),
        ResultRecorder::new(dir.path().join("responses")),
        BatchOptions::default(),
    )
    .run(instances(&[1, 2]))
    .await;

    assert!(summary.fatal.is_none());
    assert_eq!(summary.reports[0].status, InstanceStatus::Errored);
    assert_eq!(summary.reports[1].status, InstanceStatus::Matched);
    let recorder = ResultRecorder::new(dir.path().join("responses"));
    assert!(!recorder.exists(InstanceId::new(1)));
    assert!(recorder.exists(InstanceId::new(2)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shared_fixtures_under_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, _) = controller(&["</think>SELECT count(*) FROM fx"], 1);
    let store = ReferenceStore::new(dir.path().join("gtout"), dir.path().join("query_ids.json"));
    let ids = [1, 2, 3, 4, 5, 6];
    let batch: Vec<Instance> = ids
        .iter()
        .map(|id| {
            store
                .write(
                    InstanceId::new(*id),
                    &ResultSet::new(vec![vec![Value::Integer(2)]]),
                )
                .unwrap();
            let mut instance = Instance::new(*id);
            instance.preprocess_sql = vec![
                "CREATE TABLE fx (id INT)".to_string(),
                "INSERT INTO fx VALUES (1), (2)".to_string(),
            ];
            instance.clean_up_sql = vec!["DROP TABLE fx".to_string()];
            instance
        })
        .collect();

    let summary = RepairBatch::new(
        Arc::new(DuckDbBackend::in_memory().unwrap()),
        controller,
        store,
        ResultRecorder::new(dir.path().join("responses")),
        BatchOptions {
            concurrency: 2,
            force: false,
        },
    )
    .run(batch)
    .await;

    // Every instance measured its candidate against its own fixtures
    assert!(summary.is_complete());
    assert_eq!(summary.count(InstanceStatus::Matched), ids.len());
}
