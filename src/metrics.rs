//! Delivery metrics over the task file and reasoning traces.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ProxyError;
use crate::model::{reasoning_trace_path, ReasoningTrace, TaskStatus};
use crate::store::ProjectStore;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Aggregates computed from completed tasks' reasoning traces.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReasoningMetrics {
    pub traces: usize,
    pub avg_thought_quality: Option<f64>,
    pub recall_used_pct: Option<f64>,
    pub novel_insight_pct: Option<f64>,
}

/// Snapshot of delivery progress.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    /// Completed over total, 0.0 when there are no tasks.
    pub completion_rate: f64,
    /// Mean days from creation to completion, over completed tasks
    /// carrying both timestamps.
    pub avg_cycle_time_days: Option<f64>,
    pub by_status: BTreeMap<String, usize>,
    pub reasoning: ReasoningMetrics,
}

impl ProjectStore {
    /// Compute the metrics snapshot.
    pub async fn compute_metrics(&self) -> Result<MetricsSummary, ProxyError> {
        let file = self.load_tasks().await?;

        let total_tasks = file.tasks.len();
        let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
        let mut completed_ids = Vec::new();
        let mut cycle_times = Vec::new();
        for (id, task) in &file.tasks {
            *by_status.entry(task.status.to_string()).or_default() += 1;
            if task.status == TaskStatus::Completed {
                completed_ids.push(id.clone());
                if let (Some(created), Some(updated)) = (task.created_at, task.updated_at) {
                    let days = (updated - created).num_seconds() as f64 / SECONDS_PER_DAY;
                    if days >= 0.0 {
                        cycle_times.push(days);
                    }
                }
            }
        }

        let completed_tasks = completed_ids.len();
        let completion_rate = if total_tasks == 0 {
            0.0
        } else {
            completed_tasks as f64 / total_tasks as f64
        };
        let avg_cycle_time_days = if cycle_times.is_empty() {
            None
        } else {
            Some(cycle_times.iter().sum::<f64>() / cycle_times.len() as f64)
        };

        let mut traces = Vec::new();
        for id in &completed_ids {
            match self
                .fetch_yaml::<ReasoningTrace>(&reasoning_trace_path(id))
                .await
            {
                Ok(trace) => traces.push(trace),
                Err(ProxyError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(MetricsSummary {
            total_tasks,
            completed_tasks,
            completion_rate,
            avg_cycle_time_days,
            by_status,
            reasoning: aggregate_traces(&traces),
        })
    }

    /// Ask the model for a short qualitative read on the metrics.
    pub async fn reasoning_summary(&self) -> Result<String, ProxyError> {
        let metrics = self.compute_metrics().await?;
        let snapshot = serde_json::to_string_pretty(&metrics)
            .map_err(|e| ProxyError::Upstream(format!("Metrics serialization failed: {}", e)))?;

        let prompt = format!(
            "You are reviewing delivery metrics for an AI-native project.\n\
             Metrics snapshot:\n{snapshot}\n\n\
             Summarize the state of delivery, call out bottlenecks or quality \
             concerns, and suggest one concrete next step. Keep it under 250 words."
        );
        self.llm()
            .complete(&prompt, 0.5)
            .await
            .map_err(|e| ProxyError::Upstream(format!("Reasoning summary failed: {}", e)))
    }
}

fn aggregate_traces(traces: &[ReasoningTrace]) -> ReasoningMetrics {
    if traces.is_empty() {
        return ReasoningMetrics::default();
    }
    let n = traces.len() as f64;
    let quality: f64 = traces
        .iter()
        .map(|t| t.scoring.thought_quality as f64)
        .sum();
    let recall = traces.iter().filter(|t| t.scoring.recall_used).count() as f64;
    let novel = traces.iter().filter(|t| t.scoring.novel_insight).count() as f64;

    ReasoningMetrics {
        traces: traces.len(),
        avg_thought_quality: Some(quality / n),
        recall_used_pct: Some(100.0 * recall / n),
        novel_insight_pct: Some(100.0 * novel / n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TASK_FILE;
    use crate::store::testing::{store_with, FakeLlm};

    const TASKS: &str = r#"
tasks:
  1.1_a:
    description: First
    pod_owner: DevPod
    status: completed
    created_at: 2026-08-01T00:00:00Z
    updated_at: 2026-08-03T00:00:00Z
  1.2_b:
    description: Second
    pod_owner: DevPod
    status: completed
    created_at: 2026-08-01T00:00:00Z
    updated_at: 2026-08-05T00:00:00Z
  2.1_c:
    description: Third
    pod_owner: QAPod
    status: in_progress
  3.1_d:
    description: Fourth
    pod_owner: QAPod
    status: backlog
"#;

    #[tokio::test]
    async fn computes_completion_rate_and_cycle_time() {
        let (repo, store) = store_with(FakeLlm::describer());
        repo.seed(TASK_FILE, TASKS);

        let metrics = store.compute_metrics().await.unwrap();
        assert_eq!(metrics.total_tasks, 4);
        assert_eq!(metrics.completed_tasks, 2);
        assert!((metrics.completion_rate - 0.5).abs() < 1e-9);
        // 2 days and 4 days -> mean 3
        assert!((metrics.avg_cycle_time_days.unwrap() - 3.0).abs() < 1e-9);
        assert_eq!(metrics.by_status["completed"], 2);
        assert_eq!(metrics.by_status["in_progress"], 1);
        assert_eq!(metrics.by_status["backlog"], 1);
    }

    #[tokio::test]
    async fn aggregates_reasoning_traces_of_completed_tasks() {
        let (repo, store) = store_with(FakeLlm::describer());
        repo.seed(TASK_FILE, TASKS);
        repo.seed(
            &reasoning_trace_path("1.1_a"),
            "task_id: 1.1_a\nscoring:\n  thought_quality: 4\n  recall_used: true\n  novel_insight: false\n",
        );
        repo.seed(
            &reasoning_trace_path("1.2_b"),
            "task_id: 1.2_b\nscoring:\n  thought_quality: 2\n  recall_used: false\n  novel_insight: false\n",
        );

        let metrics = store.compute_metrics().await.unwrap();
        assert_eq!(metrics.reasoning.traces, 2);
        assert!((metrics.reasoning.avg_thought_quality.unwrap() - 3.0).abs() < 1e-9);
        assert!((metrics.reasoning.recall_used_pct.unwrap() - 50.0).abs() < 1e-9);
        assert!((metrics.reasoning.novel_insight_pct.unwrap() - 0.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn missing_traces_are_skipped() {
        let (repo, store) = store_with(FakeLlm::describer());
        repo.seed(TASK_FILE, TASKS);

        let metrics = store.compute_metrics().await.unwrap();
        assert_eq!(metrics.reasoning.traces, 0);
        assert!(metrics.reasoning.avg_thought_quality.is_none());
    }

    #[tokio::test]
    async fn empty_project_yields_zeroes() {
        let (repo, store) = store_with(FakeLlm::describer());
        repo.seed(TASK_FILE, "tasks: {}\n");

        let metrics = store.compute_metrics().await.unwrap();
        assert_eq!(metrics.total_tasks, 0);
        assert_eq!(metrics.completion_rate, 0.0);
        assert!(metrics.avg_cycle_time_days.is_none());
    }

    #[tokio::test]
    async fn reasoning_summary_returns_model_text() {
        let (repo, store) = store_with(FakeLlm::replying("Delivery is on track."));
        repo.seed(TASK_FILE, TASKS);

        let summary = store.reasoning_summary().await.unwrap();
        assert_eq!(summary, "Delivery is on track.");
    }

    #[tokio::test]
    async fn reasoning_summary_surfaces_model_failure() {
        let (repo, store) = store_with(FakeLlm::failing());
        repo.seed(TASK_FILE, TASKS);

        let err = store.reasoning_summary().await.unwrap_err();
        assert!(matches!(err, ProxyError::Upstream(_)));
    }
}
