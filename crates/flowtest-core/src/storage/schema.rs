pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS workflow_tests (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  title TEXT NOT NULL,
  params_json TEXT NOT NULL,
  refer_sql TEXT NOT NULL,
  test_count INTEGER NOT NULL,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_workflow_tests_title ON workflow_tests(title);
CREATE INDEX IF NOT EXISTS idx_workflow_tests_created ON workflow_tests(created_at);

CREATE TABLE IF NOT EXISTS workflow_test_results (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  workflow_test_id INTEGER NOT NULL REFERENCES workflow_tests(id),
  test_index INTEGER NOT NULL,
  execute_dur REAL NOT NULL,
  result_json TEXT NOT NULL,
  is_passed INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL,
  UNIQUE (workflow_test_id, test_index)
);
"#;
