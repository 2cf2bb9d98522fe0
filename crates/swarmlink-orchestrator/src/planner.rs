//! Planner seams and the intent validator
//!
//! Planner output is model-generated and untrusted. The narrow validator
//! here is the only way an intent result enters the orchestrator: anything
//! that is not a well-typed `{agents: [string], reasoning: string}` is
//! rejected and triggers the keyword fallback.

use async_trait::async_trait;
use serde::Deserialize;

use swarmlink_agents::AgentDefinition;
use swarmlink_types::{Result, SwarmlinkError};

/// Validated intent analysis result
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IntentSelection {
    pub agents: Vec<String>,
    pub reasoning: String,
}

/// One planned tool invocation
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PlannedCall {
    pub tool: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Per-agent execution summary handed to aggregation
#[derive(Debug, Clone)]
pub struct AgentSummary {
    pub agent_id: String,
    pub agent_name: String,
    pub summary: String,
}

/// Selects agents for a query
#[async_trait]
pub trait IntentPlanner: Send + Sync {
    async fn select_agents(
        &self,
        message: &str,
        catalogue: &[AgentDefinition],
    ) -> Result<IntentSelection>;
}

/// Plans tool calls, summarizes tool output, aggregates agent summaries
#[async_trait]
pub trait ToolPlanner: Send + Sync {
    async fn plan_calls(
        &self,
        agent: &AgentDefinition,
        message: &str,
    ) -> Result<Vec<PlannedCall>>;

    async fn summarize(
        &self,
        agent: &AgentDefinition,
        message: &str,
        tool_results: &serde_json::Value,
    ) -> Result<String>;

    async fn aggregate(&self, message: &str, summaries: &[AgentSummary]) -> Result<String>;
}

/// Validate a raw planner response into an [`IntentSelection`].
///
/// Accepts exactly an object with a string array `agents` and a string
/// `reasoning`; everything else is a planner failure.
pub fn parse_intent(content: &str) -> Result<IntentSelection> {
    let value: serde_json::Value =
        serde_json::from_str(content).map_err(|e| SwarmlinkError::PlannerUnavailable {
            reason: format!("intent response is not JSON: {e}"),
        })?;

    let agents = value
        .get("agents")
        .and_then(|a| a.as_array())
        .ok_or_else(|| SwarmlinkError::PlannerUnavailable {
            reason: "intent response lacks an 'agents' array".to_string(),
        })?;

    let agents: Vec<String> = agents
        .iter()
        .map(|a| {
            a.as_str()
                .map(str::to_string)
                .ok_or_else(|| SwarmlinkError::PlannerUnavailable {
                    reason: "intent 'agents' entries must be strings".to_string(),
                })
        })
        .collect::<Result<_>>()?;

    let reasoning = value
        .get("reasoning")
        .and_then(|r| r.as_str())
        .ok_or_else(|| SwarmlinkError::PlannerUnavailable {
            reason: "intent response lacks a 'reasoning' string".to_string(),
        })?
        .to_string();

    Ok(IntentSelection { agents, reasoning })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_intent_accepts_well_typed_response() {
        let selection = parse_intent(
            r#"{"agents": ["travel-planner", "budget-planner"], "reasoning": "trip + cost"}"#,
        )
        .unwrap();
        assert_eq!(selection.agents.len(), 2);
        assert_eq!(selection.reasoning, "trip + cost");
    }

    #[test]
    fn parse_intent_rejects_malformed_shapes() {
        assert!(parse_intent("not json").is_err());
        assert!(parse_intent(r#"{"agents": "travel-planner"}"#).is_err());
        assert!(parse_intent(r#"{"agents": [1, 2], "reasoning": "x"}"#).is_err());
        assert!(parse_intent(r#"{"agents": ["a"]}"#).is_err());
        assert!(parse_intent(r#"{"reasoning": "x"}"#).is_err());
    }

    #[test]
    fn parse_intent_errors_are_planner_unavailable() {
        let err = parse_intent("[]").unwrap_err();
        assert_eq!(err.error_code(), "PLANNER_UNAVAILABLE");
    }
}
