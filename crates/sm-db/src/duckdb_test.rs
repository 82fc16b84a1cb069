use super::*;

async fn session() -> (DuckDbBackend, Box<dyn Session>) {
    let db = DuckDbBackend::in_memory().unwrap();
    let session = db.connect().await.unwrap();
    (db, session)
}

#[tokio::test]
async fn test_in_memory() {
    let db = DuckDbBackend::in_memory().unwrap();
    assert_eq!(db.db_type(), "duckdb");
}

#[tokio::test]
async fn test_select_returns_typed_rows() {
    let (_db, mut s) = session().await;
    let out = s
        .execute("SELECT 1 AS id, 'hello' AS name, NULL AS nothing, 2.5::DOUBLE AS x, true AS flag")
        .await
        .unwrap();
    let rows = out.into_rows().unwrap();
    assert_eq!(
        rows.rows(),
        &[vec![
            Value::Integer(1),
            Value::Text("hello".to_string()),
            Value::Null,
            Value::Real(2.5),
            Value::Bool(true),
        ]]
    );
}

#[tokio::test]
async fn test_select_one_matches_single_cell() {
    let (_db, mut s) = session().await;
    let out = s.execute("SELECT 1").await.unwrap();
    assert_eq!(
        out,
        StatementOutput::Rows(ResultSet::new(vec![vec![Value::Integer(1)]]))
    );
}

#[tokio::test]
async fn test_empty_select_is_rows() {
    let (_db, mut s) = session().await;
    s.execute("CREATE TABLE t (id INT)").await.unwrap();
    let out = s.execute("SELECT * FROM t").await.unwrap();
    assert_eq!(out, StatementOutput::Rows(ResultSet::default()));
}

#[tokio::test]
async fn test_ddl_is_no_rows() {
    let (_db, mut s) = session().await;
    let out = s
        .execute("CREATE TABLE t (id INT); INSERT INTO t VALUES (1), (2);")
        .await
        .unwrap();
    assert_eq!(out, StatementOutput::NoRows);
    let out = s.execute("SELECT id FROM t ORDER BY id").await.unwrap();
    assert_eq!(out.rows().unwrap().len(), 2);
}

#[tokio::test]
async fn test_dates_render_iso() {
    let (_db, mut s) = session().await;
    let out = s
        .execute("SELECT DATE '2024-03-05', TIMESTAMP '2024-03-05 10:11:12'")
        .await
        .unwrap();
    let rows = out.into_rows().unwrap().into_rows();
    assert_eq!(rows[0][0], Value::Text("2024-03-05".to_string()));
    assert_eq!(rows[0][1], Value::Text("2024-03-05 10:11:12".to_string()));
}

#[tokio::test]
async fn test_execution_error() {
    let (_db, mut s) = session().await;
    let err = s.execute("SELECT * FROM missing_table").await.unwrap_err();
    assert!(matches!(err, DbError::ExecutionError(_)));
    assert!(!err.is_connection());
}

#[tokio::test]
async fn test_rollback_discards_changes() {
    let (db, mut s) = session().await;
    s.execute("CREATE TABLE t (id INT)").await.unwrap();

    s.begin().await.unwrap();
    assert!(s.in_transaction());
    s.execute("INSERT INTO t VALUES (1)").await.unwrap();
    s.rollback().await.unwrap();
    assert!(!s.in_transaction());

    let mut other = db.connect().await.unwrap();
    let out = other.execute("SELECT * FROM t").await.unwrap();
    assert!(out.rows().unwrap().is_empty());
}

#[tokio::test]
async fn test_commit_visible_to_other_sessions() {
    let (db, mut s) = session().await;
    s.begin().await.unwrap();
    s.execute("CREATE TABLE t (id INT); INSERT INTO t VALUES (7);")
        .await
        .unwrap();
    s.commit().await.unwrap();

    let mut other = db.connect().await.unwrap();
    let out = other.execute("SELECT id FROM t").await.unwrap();
    assert_eq!(out.rows().unwrap().rows(), &[vec![Value::Integer(7)]]);
}

#[tokio::test]
async fn test_recover_after_failed_statement() {
    let (_db, mut s) = session().await;
    s.begin().await.unwrap();
    assert!(s.execute("SELEC 1").await.is_err());
    s.rollback().await.unwrap();
    s.begin().await.unwrap();
    assert!(s.execute("SELECT 1").await.is_ok());
    s.commit().await.unwrap();
}

#[tokio::test]
async fn test_drop_rolls_back() {
    let db = DuckDbBackend::in_memory().unwrap();
    {
        let mut s = db.connect().await.unwrap();
        s.execute("CREATE TABLE t (id INT)").await.unwrap();
        s.begin().await.unwrap();
        s.execute("INSERT INTO t VALUES (1)").await.unwrap();
    }
    let mut s = db.connect().await.unwrap();
    let out = s.execute("SELECT * FROM t").await.unwrap();
    assert!(out.rows().unwrap().is_empty());
}

#[tokio::test]
async fn test_close_rolls_back() {
    let db = DuckDbBackend::in_memory().unwrap();
    let mut s = db.connect().await.unwrap();
    s.execute("CREATE TABLE t (id INT)").await.unwrap();
    s.begin().await.unwrap();
    s.execute("INSERT INTO t VALUES (1)").await.unwrap();
    s.close().await.unwrap();

    let mut s = db.connect().await.unwrap();
    let out = s.execute("SELECT COUNT(*) FROM t").await.unwrap();
    assert_eq!(out.rows().unwrap().rows(), &[vec![Value::Integer(0)]]);
}

#[tokio::test]
async fn test_file_backend() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.duckdb");
    let db = DuckDbBackend::new(path.to_str().unwrap()).unwrap();
    let mut s = db.connect().await.unwrap();
    s.execute("CREATE TABLE t AS SELECT 1 AS id").await.unwrap();
    assert!(path.exists());
}

#[test]
fn test_convert_unsigned_overflow() {
    assert_eq!(convert_value(DuckValue::UBigInt(5)), Value::Integer(5));
    assert_eq!(
        convert_value(DuckValue::UBigInt(u64::MAX)),
        Value::Text(u64::MAX.to_string())
    );
}

#[tokio::test]
async fn test_concurrent_create_is_conflict() {
    let db = DuckDbBackend::in_memory().unwrap();
    let mut a = db.connect().await.unwrap();
    let mut b = db.connect().await.unwrap();
    a.begin().await.unwrap();
    b.begin().await.unwrap();
    a.execute("CREATE TABLE fx (id INT)").await.unwrap();

    let err = match b.execute("CREATE TABLE fx (id INT)").await {
        Err(e) => e,
        Ok(_) => {
            a.commit().await.unwrap();
            b.commit().await.unwrap_err()
        }
    };
    assert!(err.is_conflict(), "{err}");
    assert!(!err.is_connection());
    assert!(!DbError::ExecutionError("Table fx does not exist".into()).is_conflict());
}
