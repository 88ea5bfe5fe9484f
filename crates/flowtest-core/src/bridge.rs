//! Decouples trial production from the response transport.
//!
//! A spawned task owns its own storage session and runs the whole trial
//! sequence, pushing outcomes into an unbounded channel. The consumer side
//! drains the channel until it sees the tagged end marker. Producer errors
//! never reach the consumer as errors, only as [`StreamEnd::Failed`].

use crate::engine::runner::TestRunner;
use crate::model::{TrialOutcome, WorkflowTestRequest};
use crate::storage::Database;
use futures_util::stream::{self, Stream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::{CancellationToken, DropGuard};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEnd {
    Completed,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Outcome(TrialOutcome),
    End(StreamEnd),
}

#[derive(Debug, Clone, Default)]
pub struct BridgeOptions {
    /// Stop the trial loop (between trials) once the consumer is dropped.
    /// Off by default: the run finishes and persists even if nobody listens.
    pub cancel_on_disconnect: bool,
}

/// Consumer half of a running trial stream.
pub struct TrialStream {
    rx: UnboundedReceiver<StreamMessage>,
    cancel: CancellationToken,
    _guard: Option<DropGuard>,
}

impl TrialStream {
    /// Next message. A producer that vanished without an end marker (panic)
    /// is reported as a failed end.
    pub async fn recv(&mut self) -> StreamMessage {
        match self.rx.recv().await {
            Some(msg) => msg,
            None => StreamMessage::End(StreamEnd::Failed(
                "trial task stopped without end marker".into(),
            )),
        }
    }

    /// Handle that stops the producer between trials when cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Every outcome in order, then exactly one `End`.
    pub fn into_messages(self) -> impl Stream<Item = StreamMessage> + Send + 'static {
        stream::unfold(Some(self), |state| async move {
            let Some(mut this) = state else {
                return None;
            };
            let msg = this.recv().await;
            let next = match msg {
                StreamMessage::End(_) => None,
                StreamMessage::Outcome(_) => Some(this),
            };
            Some((msg, next))
        })
    }
}

/// Starts the run in the background and returns the consumer side at once.
pub fn spawn_trial_stream(
    db: Database,
    runner: TestRunner,
    request: WorkflowTestRequest,
    opts: BridgeOptions,
) -> TrialStream {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    tokio::spawn(async move {
        let end = match produce(&db, &runner, request, &tx, &task_cancel).await {
            Ok(end) => end,
            Err(e) => {
                let msg = format!("{e:#}");
                tracing::error!(event = "trial_stream_failed", error = %msg);
                StreamEnd::Failed(msg)
            }
        };
        let _ = tx.send(StreamMessage::End(end));
    });

    let guard = opts.cancel_on_disconnect.then(|| cancel.clone().drop_guard());
    TrialStream {
        rx,
        cancel,
        _guard: guard,
    }
}

async fn produce(
    db: &Database,
    runner: &TestRunner,
    request: WorkflowTestRequest,
    tx: &UnboundedSender<StreamMessage>,
    cancel: &CancellationToken,
) -> anyhow::Result<StreamEnd> {
    let session = db.session()?;
    let mut seq = runner.start(session, request)?;
    let run_id = seq.run_id();
    let mut emitted = 0u32;
    let mut client_gone = false;

    loop {
        if cancel.is_cancelled() {
            tracing::info!(event = "trial_stream_cancelled", run_id, emitted);
            return Ok(StreamEnd::Cancelled);
        }
        let Some(outcome) = seq.next().await? else {
            break;
        };
        emitted += 1;
        if tx.send(StreamMessage::Outcome(outcome)).is_err() && !client_gone {
            client_gone = true;
            tracing::debug!(event = "client_gone", run_id, emitted);
        }
    }

    tracing::info!(event = "trial_stream_done", run_id, emitted, client_gone);
    Ok(StreamEnd::Completed)
}
