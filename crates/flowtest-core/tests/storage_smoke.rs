use flowtest_core::model::WorkflowTestRequest;
use flowtest_core::storage::Database;
use serde_json::json;
use tempfile::tempdir;

fn request(title: &str, params: serde_json::Value, test_count: u32) -> WorkflowTestRequest {
    WorkflowTestRequest {
        title: title.into(),
        params: params.as_object().cloned().unwrap_or_default(),
        refer_sql: "SELECT 1".into(),
        test_count,
    }
}

#[test]
fn test_storage_smoke_lifecycle() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let db = Database::open(&dir.path().join("flowtest.db"))?;
    let session = db.session()?;

    let run = session.create_run(&request("t1", json!({"a": 1}), 3))?;
    assert!(run.id > 0);
    assert_eq!(run.test_count, 3);

    // Inserted out of order on purpose
    for idx in [3u32, 1, 2] {
        session.insert_result(run.id, idx, 0.1 * f64::from(idx), &json!({"i": idx}))?;
    }

    let results = session.results_for_run(run.id)?;
    let indices: Vec<u32> = results.iter().map(|r| r.test_index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    assert!(results.iter().all(|r| !r.is_passed && r.run_id == run.id));
    assert_eq!(results[1].result, json!({"i": 2}));
    assert_eq!(session.count_results(run.id)?, 3);

    let loaded = session.get_run(run.id)?.expect("run exists");
    assert_eq!(loaded, run);
    assert!(session.get_run(run.id + 100)?.is_none());

    Ok(())
}

#[test]
fn test_non_ascii_json_is_stored_verbatim() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("flowtest.db");
    let db = Database::open(&db_path)?;
    let session = db.session()?;

    let params = json!({"城市": "北京", "note": "naïve café ☕"});
    let run = session.create_run(&request("中文标题", params.clone(), 1))?;
    session.insert_result(run.id, 1, 0.2, &json!({"echo_params": params}))?;

    // Raw column text must carry the characters themselves, not \u escapes
    let conn = rusqlite::Connection::open(&db_path)?;
    let raw_params: String = conn.query_row(
        "SELECT params_json FROM workflow_tests WHERE id = ?1",
        [run.id],
        |r| r.get(0),
    )?;
    assert!(raw_params.contains("北京"));
    assert!(raw_params.contains("naïve café ☕"));
    assert!(!raw_params.contains("\\u"));

    let raw_result: String = conn.query_row(
        "SELECT result_json FROM workflow_test_results WHERE workflow_test_id = ?1",
        [run.id],
        |r| r.get(0),
    )?;
    assert!(raw_result.contains("北京"));

    let loaded = session.get_run(run.id)?.expect("run exists");
    assert_eq!(loaded.params, params);
    assert_eq!(loaded.title, "中文标题");
    let results = session.results_for_run(run.id)?;
    assert_eq!(results[0].result["echo_params"], params);

    Ok(())
}

#[test]
fn test_set_passed_is_idempotent_and_reports_missing() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let db = Database::open(&dir.path().join("flowtest.db"))?;
    let session = db.session()?;

    let run = session.create_run(&request("t", json!({}), 1))?;
    let row = session.insert_result(run.id, 1, 0.5, &json!({}))?;

    assert!(session.set_passed(row.id, true)?);
    assert!(session.set_passed(row.id, true)?);
    assert!(session.results_for_run(run.id)?[0].is_passed);

    assert!(session.set_passed(row.id, false)?);
    assert!(!session.results_for_run(run.id)?[0].is_passed);

    assert!(!session.set_passed(row.id + 999, true)?);
    let after = session.results_for_run(run.id)?;
    assert_eq!(after.len(), 1);
    assert!(!after[0].is_passed);

    Ok(())
}

#[test]
fn test_list_runs_newest_first_with_paging() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let db = Database::open(&dir.path().join("flowtest.db"))?;
    let session = db.session()?;

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(session.create_run(&request(&format!("run-{i}"), json!({}), 1))?.id);
    }

    let page1 = session.list_runs(1, 2)?;
    let page2 = session.list_runs(2, 2)?;
    let page3 = session.list_runs(3, 2)?;
    let page4 = session.list_runs(4, 2)?;

    let got: Vec<i64> = page1
        .iter()
        .chain(&page2)
        .chain(&page3)
        .map(|r| r.id)
        .collect();
    let mut expected = ids.clone();
    expected.reverse();
    assert_eq!(got, expected);
    assert_eq!(page1[0].title, "run-4");
    assert!(page4.is_empty());
    assert_eq!(session.count_runs()?, 5);

    Ok(())
}

#[test]
fn test_list_runs_far_page_is_empty() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let db = Database::open(&dir.path().join("flowtest.db"))?;
    let session = db.session()?;
    session.create_run(&request("only", json!({}), 1))?;

    assert!(session.list_runs(u32::MAX, u32::MAX)?.is_empty());
    assert!(session.list_runs(u32::MAX, 1)?.is_empty());
    assert_eq!(session.list_runs(1, u32::MAX)?.len(), 1);

    Ok(())
}

#[test]
fn test_results_require_existing_run() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let db = Database::open(&dir.path().join("flowtest.db"))?;
    let session = db.session()?;

    assert!(session.insert_result(42, 1, 0.1, &json!({})).is_err());

    let run = session.create_run(&request("t", json!({}), 2))?;
    session.insert_result(run.id, 1, 0.1, &json!({}))?;
    // Trial index is unique within a run
    assert!(session.insert_result(run.id, 1, 0.1, &json!({})).is_err());

    Ok(())
}

#[test]
fn test_sessions_are_independent_connections() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let db = Database::open(&dir.path().join("flowtest.db"))?;

    let writer = db.session()?;
    let run = writer.create_run(&request("shared", json!({"k": "v"}), 1))?;
    writer.insert_result(run.id, 1, 0.3, &json!({"ok": true}))?;
    drop(writer);

    let reader = db.session()?;
    assert_eq!(reader.count_results(run.id)?, 1);
    assert_eq!(reader.list_runs(1, 10)?[0].id, run.id);

    // Reopening the factory on an existing file keeps the data
    let again = Database::open(db.path())?;
    assert_eq!(again.session()?.count_runs()?, 1);

    Ok(())
}
