use crate::model::{RunSummary, TestRunRow, TrialResultRow, WorkflowTestRequest};
use anyhow::Context;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Session factory. Constructed once at startup and passed down; every flow
/// (request handler, background trial task) opens its own [`Session`].
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Opens (creating if needed) the database file and applies the schema.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let db = Self {
            path: path.to_path_buf(),
        };
        let session = db.session()?;
        session.init_schema()?;
        tracing::debug!(event = "schema_ready", path = %path.display());
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a fresh connection. It is closed when the session is dropped.
    pub fn session(&self) -> anyhow::Result<Session> {
        let conn = Connection::open(&self.path)
            .with_context(|| format!("failed to open sqlite db {}", self.path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        Ok(Session {
            conn: Mutex::new(conn),
        })
    }
}

/// A connection owned by exactly one logical flow. Not `Clone`.
///
/// The mutex is never contended; it makes the session `Sync` so a trial
/// sequence borrowed across `.await` stays `Send` inside `tokio::spawn`.
pub struct Session {
    conn: Mutex<Connection>,
}

impl Session {
    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("storage session lock poisoned"))
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(crate::storage::schema::DDL)
            .context("failed to apply schema")?;
        Ok(())
    }

    pub fn create_run(&self, req: &WorkflowTestRequest) -> anyhow::Result<TestRunRow> {
        let created_at = now_rfc3339();
        let params = req.params_value();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO workflow_tests(title, params_json, refer_sql, test_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                req.title,
                serde_json::to_string(&params)?,
                req.refer_sql,
                req.test_count,
                created_at
            ],
        )?;
        Ok(TestRunRow {
            id: conn.last_insert_rowid(),
            title: req.title.clone(),
            params,
            refer_sql: req.refer_sql.clone(),
            test_count: req.test_count,
            created_at,
        })
    }

    pub fn insert_result(
        &self,
        run_id: i64,
        test_index: u32,
        execute_dur: f64,
        result: &Value,
    ) -> anyhow::Result<TrialResultRow> {
        let created_at = now_rfc3339();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO workflow_test_results(workflow_test_id, test_index, execute_dur, result_json, is_passed, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![
                run_id,
                test_index,
                execute_dur,
                serde_json::to_string(result)?,
                created_at
            ],
        )?;
        Ok(TrialResultRow {
            id: conn.last_insert_rowid(),
            run_id,
            test_index,
            execute_dur,
            result: result.clone(),
            is_passed: false,
            created_at,
        })
    }

    /// Newest first. `page` and `page_size` are 1-based and must be >= 1.
    pub fn list_runs(&self, page: u32, page_size: u32) -> anyhow::Result<Vec<RunSummary>> {
        // An offset past i64 cannot address any row.
        let Some(offset) = i64::from(page.saturating_sub(1)).checked_mul(i64::from(page_size))
        else {
            return Ok(Vec::new());
        };
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, created_at FROM workflow_tests
             ORDER BY created_at DESC, id DESC
             LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
            .query_map(params![page_size, offset], |row| {
                Ok(RunSummary {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_run(&self, run_id: i64) -> anyhow::Result<Option<TestRunRow>> {
        let conn = self.conn()?;
        let run = conn
            .query_row(
                "SELECT id, title, params_json, refer_sql, test_count, created_at
                 FROM workflow_tests WHERE id = ?1",
                params![run_id],
                |row| {
                    Ok(TestRunRow {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        params: json_column(row, 2)?,
                        refer_sql: row.get(3)?,
                        test_count: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(run)
    }

    /// All results of a run, ordered by trial index.
    pub fn results_for_run(&self, run_id: i64) -> anyhow::Result<Vec<TrialResultRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, workflow_test_id, test_index, execute_dur, result_json, is_passed, created_at
             FROM workflow_test_results
             WHERE workflow_test_id = ?1
             ORDER BY test_index ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(TrialResultRow {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    test_index: row.get(2)?,
                    execute_dur: row.get(3)?,
                    result: json_column(row, 4)?,
                    is_passed: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Returns `false` when no result has this id. Setting the same value
    /// twice still counts as a match.
    pub fn set_passed(&self, result_id: i64, is_passed: bool) -> anyhow::Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE workflow_test_results SET is_passed = ?1 WHERE id = ?2",
            params![is_passed, result_id],
        )?;
        Ok(changed > 0)
    }

    pub fn count_results(&self, run_id: i64) -> anyhow::Result<i64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM workflow_test_results WHERE workflow_test_id = ?1",
            params![run_id],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    pub fn count_runs(&self) -> anyhow::Result<i64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM workflow_tests", [], |r| r.get(0))?;
        Ok(n)
    }
}

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// Fixed precision keeps lexical order equal to time order.
fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
