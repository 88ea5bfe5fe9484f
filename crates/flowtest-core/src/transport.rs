use crate::bridge::{StreamEnd, StreamMessage, TrialStream};
use futures_util::future;
use futures_util::stream::{Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// One JSON record plus `\n`. Non-ASCII text is written as-is.
pub fn encode_line<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

/// Maps a message to its wire line, if it has one.
///
/// A normal end has no trailer. A failed end is silent unless
/// `report_errors` is set, in which case it becomes `{"error": ...}`.
pub fn message_line(msg: &StreamMessage, report_errors: bool) -> Option<String> {
    let encoded = match msg {
        StreamMessage::Outcome(outcome) => encode_line(outcome),
        StreamMessage::End(StreamEnd::Failed(reason)) if report_errors => {
            encode_line(&serde_json::json!({ "error": reason }))
        }
        StreamMessage::End(_) => return None,
    };
    match encoded {
        Ok(line) => Some(line),
        Err(e) => {
            tracing::warn!(event = "ndjson_encode_failed", error = %e);
            None
        }
    }
}

/// Response body for a trial stream: one line per outcome, in arrival order.
pub fn ndjson_lines(
    stream: TrialStream,
    report_errors: bool,
) -> impl Stream<Item = Result<String, Infallible>> + Send + 'static {
    stream
        .into_messages()
        .filter_map(move |msg| future::ready(message_line(&msg, report_errors).map(Ok)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrialOutcome;

    fn outcome(i: u32) -> TrialOutcome {
        TrialOutcome {
            title: "回归测试".into(),
            test_time: i,
            execute_dur: 0.25,
            result: serde_json::json!({"status": "success", "echo_params": {"城市": "上海"}}),
            is_passed: false,
        }
    }

    #[test]
    fn outcome_line_is_single_json_record() {
        let line = message_line(&StreamMessage::Outcome(outcome(2)), false).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.contains("回归测试"));
        assert!(line.contains("上海"));
        assert!(!line.contains("\\u"));

        let v: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(v["test_time"], 2);
        assert_eq!(v["is_passed"], false);
        assert_eq!(v["title"], "回归测试");
    }

    #[test]
    fn end_markers_have_no_line_by_default() {
        assert_eq!(
            message_line(&StreamMessage::End(StreamEnd::Completed), false),
            None
        );
        assert_eq!(
            message_line(&StreamMessage::End(StreamEnd::Failed("boom".into())), false),
            None
        );
        assert_eq!(
            message_line(&StreamMessage::End(StreamEnd::Cancelled), true),
            None
        );
    }

    #[test]
    fn failed_end_is_reported_when_enabled() {
        let line =
            message_line(&StreamMessage::End(StreamEnd::Failed("boom".into())), true).unwrap();
        let v: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(v, serde_json::json!({"error": "boom"}));
    }
}
