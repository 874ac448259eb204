//! Accuracy and latency measurement for routers.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::Result;
use crate::router::Router;

/// Outcome of a timed call.
#[derive(Debug)]
pub struct Traced<T> {
    pub outcome: Result<T>,
    pub duration: Duration,
}

impl<T> Traced<T> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Await `fut` and record how long it took.
pub async fn trace<T, F>(fut: F) -> Traced<T>
where
    F: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let outcome = fut.await;
    Traced {
        outcome,
        duration: started.elapsed(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalCase {
    pub input: String,
    pub expected: String,
}

impl EvalCase {
    pub fn new(input: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected: expected.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub input: String,
    pub expected: String,
    /// The route chosen, or `None` when the router failed.
    pub actual: Option<String>,
    pub error: Option<String>,
    pub correct: bool,
    pub duration: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub router: String,
    pub cases: Vec<CaseResult>,
}

impl EvaluationReport {
    pub fn total(&self) -> usize {
        self.cases.len()
    }

    pub fn correct(&self) -> usize {
        self.cases.iter().filter(|c| c.correct).count()
    }

    /// Percentage of correct cases; `0.0` for an empty run.
    pub fn accuracy(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.correct() as f64 / total as f64 * 100.0,
        }
    }

    /// Mean latency in milliseconds; `0.0` for an empty run.
    pub fn average_ms(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => {
                let sum: f64 = self.cases.iter().map(|c| c.duration.as_secs_f64() * 1000.0).sum();
                sum / total as f64
            }
        }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} ===", self.router)?;
        for case in &self.cases {
            let mark = if case.correct { "✅" } else { "❌" };
            let actual = match (&case.actual, &case.error) {
                (Some(actual), _) => actual.clone(),
                (None, Some(err)) => format!("error: {err}"),
                (None, None) => "-".to_string(),
            };
            writeln!(
                f,
                "{mark} 输入: {} | 预期: {} | 实际: {} ({}ms)",
                case.input,
                case.expected,
                actual,
                case.duration.as_millis()
            )?;
        }
        writeln!(
            f,
            "accuracy: {:.2}% ({}/{})",
            self.accuracy(),
            self.correct(),
            self.total()
        )?;
        write!(f, "average latency: {:.2}ms", self.average_ms())
    }
}

/// Run every case through `router` in order.  Failures count as incorrect.
pub async fn evaluate(router: &dyn Router, cases: &[EvalCase]) -> EvaluationReport {
    let mut results = Vec::with_capacity(cases.len());
    for case in cases {
        let traced = trace(router.route(&case.input)).await;
        let (actual, error) = match traced.outcome {
            Ok(route) => (Some(route), None),
            Err(err) => {
                warn!(router = router.name(), input = %case.input, %err, "router failed");
                (None, Some(err.to_string()))
            }
        };
        results.push(CaseResult {
            correct: actual.as_deref() == Some(case.expected.as_str()),
            input: case.input.clone(),
            expected: case.expected.clone(),
            actual,
            error,
            duration: traced.duration,
        });
    }

    let report = EvaluationReport {
        router: router.name().to_string(),
        cases: results,
    };
    info!(
        router = %report.router,
        accuracy = report.accuracy(),
        average_ms = report.average_ms(),
        "evaluation finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::RoutingError;
    use crate::llm_router::LlmRouter;
    use crate::presets;
    use ailab_agent::testing::ScriptedModel;

    #[tokio::test]
    async fn baseline_passes_benchmark() {
        let report = evaluate(&presets::baseline_router(), &presets::benchmark_cases()).await;
        assert_eq!(report.total(), 7);
        assert_eq!(report.correct(), 7);
        assert_eq!(report.router, "baseline");
        let text = report.to_string();
        assert!(text.starts_with("=== baseline ===\n"));
        assert!(text.contains("accuracy: 100.00% (7/7)"));
    }

    #[tokio::test]
    async fn errors_count_as_incorrect() {
        let model = Arc::new(
            ScriptedModel::new("flaky")
                .reply(r#"{"route":"BILLING","reason":"退款","confidence":95}"#)
                .fail("timeout"),
        );
        let router = LlmRouter::new(model, ["BILLING", "TECHNICAL"], "route it");
        let cases = [EvalCase::new("我想退款", "BILLING"), EvalCase::new("报错", "TECHNICAL")];

        let report = evaluate(&router, &cases).await;
        assert_eq!(report.correct(), 1);
        assert!(report.cases[1].actual.is_none());
        assert!(report.cases[1].error.as_deref().unwrap().contains("timeout"));
        assert_eq!(format!("{:.2}", report.accuracy()), "50.00");
        assert!(report.to_string().contains("❌ 输入: 报错 | 预期: TECHNICAL | 实际: error:"));
    }

    #[tokio::test(start_paused = true)]
    async fn trace_measures_duration() {
        let traced = trace(async {
            tokio::time::sleep(Duration::from_millis(250)).await;
            Ok::<_, RoutingError>(1)
        })
        .await;
        assert!(traced.is_success());
        assert!(traced.duration >= Duration::from_millis(250));
    }

    #[test]
    fn empty_report_is_zero() {
        let report = EvaluationReport {
            router: "none".into(),
            cases: Vec::new(),
        };
        assert_eq!(report.accuracy(), 0.0);
        assert_eq!(report.average_ms(), 0.0);
    }
}
