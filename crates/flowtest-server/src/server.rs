use crate::config::ServerConfig;
use crate::handlers::{self, error_reply, AppState, LogsQuery};
use flowtest_core::SERVICE_NAME;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

#[derive(Debug)]
struct BodyTooLarge;

impl warp::reject::Reject for BodyTooLarge {}

/// Whole request body, capped at `max` bytes. A declared `Content-Length`
/// over the cap is refused before reading; chunked bodies are checked once
/// read.
fn limited_body(max: u64) -> impl Filter<Extract = (Bytes,), Error = Rejection> + Clone {
    warp::header::optional::<u64>("content-length")
        .and_then(move |declared: Option<u64>| async move {
            match declared {
                Some(n) if n > max => Err(warp::reject::custom(BodyTooLarge)),
                _ => Ok(()),
            }
        })
        .untuple_one()
        .and(warp::body::bytes())
        .and_then(move |body: Bytes| async move {
            if u64::try_from(body.len()).unwrap_or(u64::MAX) > max {
                Err(warp::reject::custom(BodyTooLarge))
            } else {
                Ok(body)
            }
        })
}

/// All routes, with rejections rendered as JSON `{code, message}`.
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let max_body = state.cfg.max_body_bytes;
    let with_state = warp::any().map(move || state.clone());
    let body = limited_body(max_body);

    let stream = warp::path!("workflow" / "test" / "stream")
        .and(warp::post())
        .and(body.clone())
        .and(with_state.clone())
        .and_then(handlers::test_stream);

    let logs = warp::path!("workflow" / "logs")
        .and(warp::get())
        .and(warp::query::<LogsQuery>())
        .and(with_state.clone())
        .and_then(handlers::list_logs);

    let detail = warp::path!("workflow" / "logs" / i64)
        .and(warp::get())
        .and(with_state.clone())
        .and_then(handlers::log_detail);

    let update = warp::path!("workflow" / "results" / i64)
        .and(warp::put())
        .and(body)
        .and(with_state)
        .and_then(handlers::update_result);

    let health = warp::path!("health").and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({ "ok": true, "service": SERVICE_NAME }))
    });

    stream
        .or(logs)
        .or(detail)
        .or(update)
        .or(health)
        .recover(handle_rejection)
        .with(warp::trace::request())
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found")
    } else if err.find::<BodyTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "request body too large")
    } else if err.find::<warp::reject::InvalidHeader>().is_some() {
        (StatusCode::BAD_REQUEST, "invalid header")
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (StatusCode::UNPROCESSABLE_ENTITY, "invalid query parameters")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
    } else {
        tracing::warn!(event = "unhandled_rejection", rejection = ?err);
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    };
    Ok(error_reply(status, message))
}

pub struct Server;

impl Server {
    pub async fn run(cfg: ServerConfig) -> anyhow::Result<()> {
        let state = AppState::new(cfg.clone())?;
        let executor = state.runner.executor_name();
        let max_test_count = state.validator.max_test_count();
        let (addr, serving) = warp::serve(routes(state))
            .try_bind_with_graceful_shutdown(cfg.bind, async {
                let _ = tokio::signal::ctrl_c().await;
            })?;
        tracing::info!(
            event = "listening",
            addr = %addr,
            db = %cfg.db_path.display(),
            executor,
            max_test_count
        );
        serving.await;
        tracing::info!(event = "server_stop");
        Ok(())
    }
}
