//! Execution budget and data-passing policy (ambient, `SPEC_FULL.md` §4.12).

use serde::{Deserialize, Serialize};

/// What to do when a node's output exceeds [`ExecutionBudget::max_node_output_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LargeDataStrategy {
    /// Fail the node with a data-limit error. Default.
    #[default]
    Reject,
    /// Spill to blob storage and continue. Not implemented in this
    /// workspace; treated as `Reject` with a warning logged.
    SpillToBlob,
}

/// Resource limits enforced around node execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionBudget {
    /// Maximum number of nodes the orchestrator runs concurrently.
    /// `None` means unbounded, the spec's stated default.
    pub max_concurrent_nodes: Option<usize>,
    /// Maximum retries across the whole run, independent of any single
    /// node's `config.maxRetries`.
    pub max_total_retries: u32,
    /// Maximum wall-clock time for the whole run.
    pub max_wall_time_secs: u64,
    /// Maximum size of a single node's input payload.
    pub max_payload_bytes: u64,
    /// Maximum size of a single node's output.
    pub max_node_output_bytes: u64,
    /// Maximum cumulative output size across the whole run.
    pub max_total_execution_bytes: u64,
    /// Policy applied when a node's output exceeds `max_node_output_bytes`.
    pub large_data_strategy: LargeDataStrategy,
}

impl Default for ExecutionBudget {
    fn default() -> Self {
        Self {
            max_concurrent_nodes: None,
            max_total_retries: 50,
            max_wall_time_secs: 3600,
            max_payload_bytes: 100 * 1024 * 1024,
            max_node_output_bytes: 10 * 1024 * 1024,
            max_total_execution_bytes: 100 * 1024 * 1024,
            large_data_strategy: LargeDataStrategy::Reject,
        }
    }
}

impl ExecutionBudget {
    /// Check `output`'s serialized size against `max_node_output_bytes`.
    /// Returns `Err((limit, actual))` when it is exceeded.
    pub fn check_output_size(&self, output: &serde_json::Value) -> Result<(), (u64, u64)> {
        let actual = serde_json::to_vec(output).map(|v| v.len() as u64).unwrap_or(0);
        if actual > self.max_node_output_bytes {
            Err((self.max_node_output_bytes, actual))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_full_ambient_constants() {
        let budget = ExecutionBudget::default();
        assert_eq!(budget.max_concurrent_nodes, None);
        assert_eq!(budget.max_total_retries, 50);
        assert_eq!(budget.max_wall_time_secs, 3600);
        assert_eq!(budget.large_data_strategy, LargeDataStrategy::Reject);
    }

    #[test]
    fn small_output_passes_the_limit_check() {
        let budget = ExecutionBudget::default();
        assert!(budget.check_output_size(&serde_json::json!({"ok": true})).is_ok());
    }

    #[test]
    fn oversized_output_is_rejected() {
        let budget = ExecutionBudget { max_node_output_bytes: 4, ..Default::default() };
        let err = budget.check_output_size(&serde_json::json!("way too big for four bytes")).unwrap_err();
        assert_eq!(err.0, 4);
        assert!(err.1 > 4);
    }
}
