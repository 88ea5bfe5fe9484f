use crate::config::ServerConfig;
use flowtest_core::bridge::{spawn_trial_stream, BridgeOptions};
use flowtest_core::engine::{Executor, MockExecutor, TestRunner};
use flowtest_core::model::{DetailResponse, HistoryResponse, StatusResponse, TrialDetail};
use flowtest_core::storage::Database;
use flowtest_core::transport::{ndjson_lines, NDJSON_CONTENT_TYPE};
use flowtest_core::validate::{check_page, parse_result_update, RequestValidator, ValidationError};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use warp::http::header::{HeaderValue, CONTENT_TYPE};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::hyper::Body;
use warp::reply::Response;
use warp::Reply;

/// Shared by every route. Holds the session factory, never a session.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub runner: TestRunner,
    pub validator: Arc<RequestValidator>,
    pub cfg: ServerConfig,
}

impl AppState {
    pub fn new(cfg: ServerConfig) -> anyhow::Result<Self> {
        let executor = MockExecutor::new(
            Duration::from_millis(cfg.mock_min_ms),
            Duration::from_millis(cfg.mock_max_ms),
        );
        Self::with_executor(cfg, Arc::new(executor))
    }

    pub fn with_executor(cfg: ServerConfig, executor: Arc<dyn Executor>) -> anyhow::Result<Self> {
        let db = Database::open(&cfg.db_path)?;
        let validator = RequestValidator::new(cfg.max_test_count)?;
        Ok(Self {
            db,
            runner: TestRunner::new(executor),
            validator: Arc::new(validator),
            cfg,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: u16,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a [flowtest_core::validate::Violation]>,
}

pub(crate) fn json_reply<T: Serialize>(body: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

pub(crate) fn error_reply(status: StatusCode, message: &str) -> Response {
    json_reply(
        &ErrorBody {
            code: status.as_u16(),
            message,
            error: None,
            errors: None,
        },
        status,
    )
}

fn validation_reply(err: &ValidationError) -> Response {
    tracing::info!(event = "request_rejected", code = %err.code, detail = %err);
    let status = StatusCode::UNPROCESSABLE_ENTITY;
    json_reply(
        &ErrorBody {
            code: status.as_u16(),
            message: &err.message,
            error: Some(&err.code),
            errors: Some(&err.violations),
        },
        status,
    )
}

fn storage_error_reply(op: &str, err: &anyhow::Error) -> Response {
    tracing::error!(event = "storage_error", op = op, error = %format!("{err:#}"));
    error_reply(StatusCode::INTERNAL_SERVER_ERROR, "storage error")
}

/// `POST /workflow/test/stream`
pub async fn test_stream(body: Bytes, state: AppState) -> Result<Response, Infallible> {
    let request = match state.validator.parse(&body) {
        Ok(r) => r,
        Err(e) => return Ok(validation_reply(&e)),
    };
    tracing::info!(
        event = "test_stream_start",
        title = %request.title,
        test_count = request.test_count
    );

    let opts = BridgeOptions {
        cancel_on_disconnect: state.cfg.cancel_on_disconnect,
    };
    let trials = spawn_trial_stream(state.db.clone(), state.runner.clone(), request, opts);
    let lines = ndjson_lines(trials, state.cfg.report_stream_errors);

    let mut resp = Response::new(Body::wrap_stream(lines));
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(NDJSON_CONTENT_TYPE));
    Ok(resp)
}

/// `GET /workflow/logs?page=&page_size=`
pub async fn list_logs(query: LogsQuery, state: AppState) -> Result<Response, Infallible> {
    let (page, page_size) =
        match check_page(query.page.unwrap_or(1), query.page_size.unwrap_or(10)) {
            Ok(p) => p,
            Err(e) => return Ok(validation_reply(&e)),
        };
    let history = match state
        .db
        .session()
        .and_then(|s| s.list_runs(page, page_size))
    {
        Ok(h) => h,
        Err(e) => return Ok(storage_error_reply("list_runs", &e)),
    };
    Ok(json_reply(
        &HistoryResponse {
            code: 0,
            message: "success".into(),
            history,
        },
        StatusCode::OK,
    ))
}

/// `GET /workflow/logs/{test_id}`. An unknown id yields an empty list.
pub async fn log_detail(test_id: i64, state: AppState) -> Result<Response, Infallible> {
    let rows = match state
        .db
        .session()
        .and_then(|s| s.results_for_run(test_id))
    {
        Ok(rows) => rows,
        Err(e) => return Ok(storage_error_reply("results_for_run", &e)),
    };
    let test_result = rows.into_iter().map(TrialDetail::from).collect();
    Ok(json_reply(&DetailResponse { test_result }, StatusCode::OK))
}

/// `PUT /workflow/results/{result_id}`. Not-found is reported in the body.
pub async fn update_result(
    result_id: i64,
    body: Bytes,
    state: AppState,
) -> Result<Response, Infallible> {
    let update = match parse_result_update(&body) {
        Ok(u) => u,
        Err(e) => return Ok(validation_reply(&e)),
    };
    let found = match state
        .db
        .session()
        .and_then(|s| s.set_passed(result_id, update.is_passed))
    {
        Ok(found) => found,
        Err(e) => return Ok(storage_error_reply("set_passed", &e)),
    };
    tracing::info!(
        event = "result_update",
        result_id,
        is_passed = update.is_passed,
        found
    );
    let body = if found {
        StatusResponse::success()
    } else {
        StatusResponse::not_found("Result")
    };
    Ok(json_reply(&body, StatusCode::OK))
}
