use crate::model::{ResultUpdate, WorkflowTestRequest};
use jsonschema::JSONSchema;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

pub const MAX_TEST_COUNT: u32 = 20;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

/// Input rejected before any side effect. Rendered as a client error.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValidationError {
    pub code: String,
    pub message: String,
    pub violations: Vec<Violation>,
}

impl ValidationError {
    pub fn new(code: &str, message: &str, violations: Vec<Violation>) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            violations,
        }
    }

    pub fn field(path: &str, message: impl Into<String>) -> Self {
        Self::new(
            "E_VALIDATION",
            "request validation failed",
            vec![Violation {
                path: path.to_string(),
                message: message.into(),
            }],
        )
    }

    fn parse(e: serde_json::Error) -> Self {
        Self::new(
            "E_JSON_PARSE",
            "request body is not valid JSON",
            vec![Violation {
                path: String::new(),
                message: e.to_string(),
            }],
        )
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        for v in &self.violations {
            write!(f, "; {} {}", v.path, v.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn request_schema(max_test_count: u32) -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["title", "params", "refer_sql", "test_count"],
        "properties": {
            "title": { "type": "string" },
            "params": { "type": "object" },
            "refer_sql": { "type": "string" },
            "test_count": { "type": "integer", "minimum": 1, "maximum": max_test_count }
        }
    })
}

/// Compiled schema for the stream request body.
pub struct RequestValidator {
    schema: JSONSchema,
    max_test_count: u32,
}

impl RequestValidator {
    pub fn new(max_test_count: u32) -> anyhow::Result<Self> {
        let schema_val = request_schema(max_test_count);
        let schema = JSONSchema::compile(&schema_val)
            .map_err(|e| anyhow::anyhow!("invalid request schema: {e}"))?;
        Ok(Self {
            schema,
            max_test_count,
        })
    }

    pub fn max_test_count(&self) -> u32 {
        self.max_test_count
    }

    pub fn parse(&self, body: &[u8]) -> Result<WorkflowTestRequest, ValidationError> {
        let value: Value = serde_json::from_slice(body).map_err(ValidationError::parse)?;
        self.validate(&value)
    }

    pub fn validate(&self, value: &Value) -> Result<WorkflowTestRequest, ValidationError> {
        if let Err(errors) = self.schema.validate(value) {
            let violations = errors
                .map(|e| Violation {
                    path: e.instance_path.to_string(),
                    message: e.to_string(),
                })
                .collect();
            return Err(ValidationError::new(
                "E_VALIDATION",
                "request validation failed",
                violations,
            ));
        }
        serde_json::from_value(value.clone()).map_err(|e| ValidationError::field("", e.to_string()))
    }
}

pub fn parse_result_update(body: &[u8]) -> Result<ResultUpdate, ValidationError> {
    let value: Value = serde_json::from_slice(body).map_err(ValidationError::parse)?;
    match value.get("is_passed") {
        Some(Value::Bool(b)) => Ok(ResultUpdate { is_passed: *b }),
        Some(_) => Err(ValidationError::field("/is_passed", "must be a boolean")),
        None => Err(ValidationError::field("/is_passed", "field required")),
    }
}

/// Checks 1-based paging and narrows to storage types.
pub fn check_page(page: i64, page_size: i64) -> Result<(u32, u32), ValidationError> {
    let page = u32::try_from(page)
        .ok()
        .filter(|p| *p >= 1)
        .ok_or_else(|| ValidationError::field("/page", "must be >= 1"))?;
    let page_size = u32::try_from(page_size)
        .ok()
        .filter(|p| *p >= 1)
        .ok_or_else(|| ValidationError::field("/page_size", "must be >= 1"))?;
    Ok((page, page_size))
}
