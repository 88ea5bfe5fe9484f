use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Incoming request for a streamed workflow test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowTestRequest {
    pub title: String,
    pub params: Map<String, Value>,
    pub refer_sql: String,
    pub test_count: u32,
}

impl WorkflowTestRequest {
    pub fn params_value(&self) -> Value {
        Value::Object(self.params.clone())
    }
}

/// Parent record created once per request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestRunRow {
    pub id: i64,
    pub title: String,
    pub params: Value,
    pub refer_sql: String,
    pub test_count: u32,
    pub created_at: String,
}

/// One persisted trial. `is_passed` is the only field mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrialResultRow {
    pub id: i64,
    pub run_id: i64,
    pub test_index: u32,
    pub execute_dur: f64,
    pub result: Value,
    pub is_passed: bool,
    pub created_at: String,
}

/// What the stream emits for each finished trial (one NDJSON line).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrialOutcome {
    pub title: String,
    pub test_time: u32,
    pub execute_dur: f64,
    pub result: Value,
    #[serde(default)]
    pub is_passed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub id: i64,
    pub title: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub code: i32,
    pub message: String,
    pub history: Vec<RunSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrialDetail {
    pub id: i64,
    pub test_index: u32,
    pub execute_dur: f64,
    pub result: Value,
    #[serde(default)]
    pub is_passed: bool,
}

impl From<TrialResultRow> for TrialDetail {
    fn from(row: TrialResultRow) -> Self {
        Self {
            id: row.id,
            test_index: row.test_index,
            execute_dur: row.execute_dur,
            result: row.result,
            is_passed: row.is_passed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailResponse {
    pub test_result: Vec<TrialDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultUpdate {
    pub is_passed: bool,
}

/// `{code, message}` envelope used by the update endpoint and error replies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub code: i32,
    pub message: String,
}

impl StatusResponse {
    pub fn success() -> Self {
        Self {
            code: 0,
            message: "success".into(),
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self {
            code: 404,
            message: format!("{what} not found"),
        }
    }
}
