use crate::engine::executor::{execute_timed, Executor};
use crate::model::{TestRunRow, TrialOutcome, WorkflowTestRequest};
use crate::storage::Session;
use futures_util::stream::{self, Stream};
use serde_json::Value;
use std::sync::Arc;

/// Creates runs and hands out their trial sequences.
#[derive(Clone)]
pub struct TestRunner {
    executor: Arc<dyn Executor>,
}

impl TestRunner {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    pub fn executor_name(&self) -> &'static str {
        self.executor.name()
    }

    /// Persists the parent run, then returns the sequence that performs its
    /// trials. No trial runs until the sequence is polled.
    pub fn start(
        &self,
        session: Session,
        request: WorkflowTestRequest,
    ) -> anyhow::Result<TrialSequence> {
        let run = session.create_run(&request)?;
        tracing::info!(
            event = "test_run_created",
            run_id = run.id,
            title = %run.title,
            test_count = run.test_count,
            executor = self.executor.name()
        );
        Ok(TrialSequence {
            params: request.params_value(),
            session,
            executor: self.executor.clone(),
            run,
            next_index: 1,
            finished: false,
        })
    }
}

/// One-shot, strictly sequential producer of a run's trial outcomes.
///
/// Trial `i + 1` starts only after trial `i` is executed and persisted. After
/// the last trial, or after any error, `next` keeps returning `Ok(None)`.
pub struct TrialSequence {
    session: Session,
    executor: Arc<dyn Executor>,
    run: TestRunRow,
    params: Value,
    next_index: u32,
    finished: bool,
}

impl TrialSequence {
    pub fn run_id(&self) -> i64 {
        self.run.id
    }

    pub async fn next(&mut self) -> anyhow::Result<Option<TrialOutcome>> {
        if self.finished || self.next_index > self.run.test_count {
            self.finished = true;
            return Ok(None);
        }
        match self.step().await {
            Ok(outcome) => {
                self.next_index += 1;
                Ok(Some(outcome))
            }
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }

    async fn step(&self) -> anyhow::Result<TrialOutcome> {
        let index = self.next_index;
        let exec = execute_timed(self.executor.as_ref(), &self.params).await?;
        let execute_dur = exec.duration_secs();
        self.session
            .insert_result(self.run.id, index, execute_dur, &exec.payload)?;
        tracing::debug!(
            event = "trial_persisted",
            run_id = self.run.id,
            test_index = index,
            execute_dur
        );
        Ok(TrialOutcome {
            title: self.run.title.clone(),
            test_time: index,
            execute_dur,
            result: exec.payload,
            is_passed: false,
        })
    }

    pub fn into_stream(self) -> impl Stream<Item = anyhow::Result<TrialOutcome>> + Send {
        stream::try_unfold(self, |mut seq| async move {
            let item = seq.next().await?;
            Ok::<_, anyhow::Error>(item.map(|outcome| (outcome, seq)))
        })
    }
}
