//! Deterministic planner - fallback when no LLM is configured
//!
//! Intent selection defers to the orchestrator's keyword matcher, tool plans
//! are empty, and summaries are templated from the agent definition. Keeps a
//! control plane functional (and testable) with zero external services.

use async_trait::async_trait;

use swarmlink_agents::AgentDefinition;
use swarmlink_types::{Result, SwarmlinkError};

use crate::planner::{AgentSummary, IntentPlanner, IntentSelection, PlannedCall, ToolPlanner};

pub struct DeterministicPlanner;

impl DeterministicPlanner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DeterministicPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IntentPlanner for DeterministicPlanner {
    async fn select_agents(
        &self,
        _message: &str,
        _catalogue: &[AgentDefinition],
    ) -> Result<IntentSelection> {
        // Reporting unavailability routes selection to the keyword matcher
        Err(SwarmlinkError::PlannerUnavailable {
            reason: "no LLM configured".to_string(),
        })
    }
}

#[async_trait]
impl ToolPlanner for DeterministicPlanner {
    async fn plan_calls(
        &self,
        _agent: &AgentDefinition,
        _message: &str,
    ) -> Result<Vec<PlannedCall>> {
        Ok(vec![])
    }

    async fn summarize(
        &self,
        agent: &AgentDefinition,
        message: &str,
        _tool_results: &serde_json::Value,
    ) -> Result<String> {
        Ok(format!(
            "{} handled: \"{}\". Configure an LLM planner for full responses.",
            agent.name, message
        ))
    }

    async fn aggregate(&self, _message: &str, _summaries: &[AgentSummary]) -> Result<String> {
        // Unavailable on purpose: the orchestrator's concatenation fallback
        // is the deterministic aggregation
        Err(SwarmlinkError::PlannerUnavailable {
            reason: "no LLM configured".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Orchestrator;
    use std::sync::Arc;
    use swarmlink_agents::AgentStore;
    use swarmlink_dispatch::Dispatcher;
    use swarmlink_registry::NodeRegistry;

    #[tokio::test]
    async fn deterministic_pipeline_produces_chargeable_response() {
        let agents = Arc::new(AgentStore::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(NodeRegistry::new()),
            agents.clone(),
        ));
        let planner = Arc::new(DeterministicPlanner::new());
        let orchestrator = Orchestrator::new(agents, dispatcher, planner.clone(), planner);

        let response = orchestrator
            .execute("Plan a cheap trip to Tokyo")
            .await
            .unwrap();
        assert!(response.is_chargeable());
        assert!(response.agents_used.contains(&"travel-planner".to_string()));
        // Multi-agent selection concatenates deterministically
        assert!(response.message.contains("**Travel Planner:**"));
    }
}
