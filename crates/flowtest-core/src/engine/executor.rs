use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use std::time::{Duration, Instant};

/// The workload under test. One call is one trial.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, params: &Value) -> anyhow::Result<Value>;

    fn name(&self) -> &'static str;
}

/// Payload plus elapsed wall-clock time of one execution.
#[derive(Debug, Clone)]
pub struct Execution {
    pub payload: Value,
    pub duration: Duration,
}

impl Execution {
    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

pub async fn execute_timed(executor: &dyn Executor, params: &Value) -> anyhow::Result<Execution> {
    let start = Instant::now();
    let payload = executor.execute(params).await?;
    Ok(Execution {
        payload,
        duration: start.elapsed(),
    })
}

/// Stand-in workload: sleeps a random delay, then echoes the params.
#[derive(Debug, Clone)]
pub struct MockExecutor {
    min_delay: Duration,
    max_delay: Duration,
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_millis(1000))
    }
}

impl MockExecutor {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        if min_delay <= max_delay {
            Self {
                min_delay,
                max_delay,
            }
        } else {
            Self {
                min_delay: max_delay,
                max_delay: min_delay,
            }
        }
    }

    fn pick_delay(&self) -> Duration {
        let lo = u64::try_from(self.min_delay.as_micros()).unwrap_or(u64::MAX);
        let hi = u64::try_from(self.max_delay.as_micros()).unwrap_or(u64::MAX);
        Duration::from_micros(rand::thread_rng().gen_range(lo..=hi))
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn execute(&self, params: &Value) -> anyhow::Result<Value> {
        let delay = self.pick_delay();
        tokio::time::sleep(delay).await;
        let generated_value: u32 = rand::thread_rng().gen_range(1..=1000);
        Ok(serde_json::json!({
            "status": "success",
            "echo_params": params,
            "generated_value": generated_value,
        }))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_echoes_params_and_reports_duration() {
        let exec = MockExecutor::new(Duration::from_millis(2), Duration::from_millis(4));
        let params = serde_json::json!({"city": "北京", "n": 3});

        let out = execute_timed(&exec, &params).await.unwrap();

        assert_eq!(out.payload["status"], "success");
        assert_eq!(out.payload["echo_params"], params);
        let v = out.payload["generated_value"].as_u64().unwrap();
        assert!((1..=1000).contains(&v));
        assert!(out.duration >= Duration::from_millis(2));
        assert!(out.duration_secs() > 0.0);
    }

    #[test]
    fn inverted_bounds_are_swapped() {
        let exec = MockExecutor::new(Duration::from_millis(50), Duration::from_millis(5));
        assert_eq!(exec.min_delay, Duration::from_millis(5));
        assert_eq!(exec.max_delay, Duration::from_millis(50));
        for _ in 0..20 {
            let d = exec.pick_delay();
            assert!(d >= exec.min_delay && d <= exec.max_delay);
        }
    }

    #[test]
    fn huge_max_delay_saturates() {
        // 2^64 + 9 micros: truncating would give an upper bound below the lower one.
        let max = Duration::from_micros(u64::MAX) + Duration::from_micros(10);
        let exec = MockExecutor::new(Duration::from_millis(5), max);
        for _ in 0..20 {
            let d = exec.pick_delay();
            assert!(d >= Duration::from_millis(5));
        }
    }
}
