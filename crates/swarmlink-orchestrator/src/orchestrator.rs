//! The orchestrator: intent -> concurrent execution -> aggregation

use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use swarmlink_agents::{run_local_tool, select_by_keywords, AgentDefinition, AgentStore};
use swarmlink_dispatch::Dispatcher;
use swarmlink_types::Result;

use crate::planner::{AgentSummary, IntentPlanner, PlannedCall, ToolPlanner};

/// Selection cap per query
pub const MAX_AGENTS_PER_QUERY: usize = 3;

/// Deadline for one worker-bound tool call
const TOOL_CALL_TIMEOUT_MS: u64 = 30_000;

/// Marker prefix of a failed agent summary
const ERROR_PREFIX: &str = "Error: ";

/// One executed tool call inside an agent result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub tool: String,
    pub params: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one agent's execution
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResult {
    pub agent: String,
    pub agent_name: String,
    pub tools: Vec<ToolCallRecord>,
    pub summary: String,
}

impl AgentResult {
    /// Whether this agent produced usable output
    pub fn is_success(&self) -> bool {
        !self.summary.starts_with(ERROR_PREFIX)
    }
}

/// Aggregated response for one query
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiAgentResponse {
    pub message: String,
    pub agents_used: Vec<String>,
    pub agent_results: Vec<AgentResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl MultiAgentResponse {
    /// The charge criterion: at least one agent produced a non-error summary
    pub fn is_chargeable(&self) -> bool {
        self.agent_results.iter().any(AgentResult::is_success)
    }
}

/// Runs queries across the agent catalogue
pub struct Orchestrator {
    agents: Arc<AgentStore>,
    dispatcher: Arc<Dispatcher>,
    intent: Arc<dyn IntentPlanner>,
    tools: Arc<dyn ToolPlanner>,
}

impl Orchestrator {
    pub fn new(
        agents: Arc<AgentStore>,
        dispatcher: Arc<Dispatcher>,
        intent: Arc<dyn IntentPlanner>,
        tools: Arc<dyn ToolPlanner>,
    ) -> Self {
        Self {
            agents,
            dispatcher,
            intent,
            tools,
        }
    }

    /// Execute one user query end to end
    pub async fn execute(&self, user_message: &str) -> Result<MultiAgentResponse> {
        let catalogue = self.agents.list();
        let (selected, reasoning) = self.select_agents(user_message, &catalogue).await;
        let agents_used: Vec<String> = selected.iter().map(|a| a.id.clone()).collect();
        debug!(agents = ?agents_used, "agents selected");

        // Agents execute in parallel with respect to each other
        let futures = selected
            .iter()
            .map(|agent| self.run_agent(agent, user_message));
        let agent_results: Vec<AgentResult> = join_all(futures).await;

        let message = self.aggregate(user_message, &agent_results).await;

        Ok(MultiAgentResponse {
            message,
            agents_used,
            agent_results,
            reasoning,
        })
    }

    /// Phase 1: planner selection with keyword fallback, capped at three
    async fn select_agents(
        &self,
        message: &str,
        catalogue: &[AgentDefinition],
    ) -> (Vec<AgentDefinition>, Option<String>) {
        match self.intent.select_agents(message, catalogue).await {
            Ok(selection) => {
                let resolved: Vec<AgentDefinition> = selection
                    .agents
                    .iter()
                    .filter_map(|id| catalogue.iter().find(|a| &a.id == id).cloned())
                    .take(MAX_AGENTS_PER_QUERY)
                    .collect();
                if resolved.is_empty() {
                    warn!("intent planner selected no known agents, falling back to keywords");
                    (self.keyword_fallback(message, catalogue), None)
                } else {
                    (resolved, Some(selection.reasoning))
                }
            }
            Err(e) => {
                warn!(error = %e, "intent planner unavailable, falling back to keywords");
                (self.keyword_fallback(message, catalogue), None)
            }
        }
    }

    fn keyword_fallback(
        &self,
        message: &str,
        catalogue: &[AgentDefinition],
    ) -> Vec<AgentDefinition> {
        select_by_keywords(catalogue, message)
            .into_iter()
            .take(MAX_AGENTS_PER_QUERY)
            .cloned()
            .collect()
    }

    /// Phase 2: one agent's plan -> tools -> summary. Failures produce a
    /// partial result, never abort the query.
    async fn run_agent(&self, agent: &AgentDefinition, message: &str) -> AgentResult {
        // A worker that advertises this agent type runs the whole turn
        if self.dispatcher.has_dedicated_agent_node(&agent.id).await {
            match self.dispatcher.dispatch_agent_job(&agent.id, message).await {
                Ok(outcome) => {
                    let summary = if outcome.success {
                        outcome.response
                    } else {
                        format!(
                            "{ERROR_PREFIX}{}",
                            outcome.error.unwrap_or_else(|| "agent job failed".to_string())
                        )
                    };
                    return AgentResult {
                        agent: agent.id.clone(),
                        agent_name: agent.name.clone(),
                        tools: outcome
                            .tools_used
                            .into_iter()
                            .map(|tool| ToolCallRecord {
                                tool,
                                params: serde_json::Value::Null,
                                result: None,
                                error: None,
                            })
                            .collect(),
                        summary,
                    };
                }
                Err(e) => {
                    // Node vanished mid-selection; fall back to local planning
                    warn!(agent = %agent.id, error = %e, "remote agent turn failed, running locally");
                }
            }
        }

        let plan = match self.tools.plan_calls(agent, message).await {
            Ok(plan) => plan,
            Err(e) => {
                return AgentResult {
                    agent: agent.id.clone(),
                    agent_name: agent.name.clone(),
                    tools: vec![],
                    summary: format!("{ERROR_PREFIX}{e}"),
                };
            }
        };

        let mut tool_records = Vec::with_capacity(plan.len());
        for call in plan {
            tool_records.push(self.run_tool(call).await);
        }

        let tool_results = json!(tool_records
            .iter()
            .map(|r| {
                json!({
                    "tool": r.tool,
                    "result": r.result,
                    "error": r.error,
                })
            })
            .collect::<Vec<_>>());

        let summary = match self.tools.summarize(agent, message, &tool_results).await {
            Ok(summary) => summary,
            Err(e) => format!("{ERROR_PREFIX}{e}"),
        };

        AgentResult {
            agent: agent.id.clone(),
            agent_name: agent.name.clone(),
            tools: tool_records,
            summary,
        }
    }

    /// Execute one tool call: local implementation or capability-addressed
    /// worker dispatch
    async fn run_tool(&self, call: PlannedCall) -> ToolCallRecord {
        if let Some(local) = run_local_tool(&call.tool, &call.params) {
            return match local {
                Ok(result) => ToolCallRecord {
                    tool: call.tool,
                    params: call.params,
                    result: Some(result),
                    error: None,
                },
                Err(e) => ToolCallRecord {
                    tool: call.tool,
                    params: call.params,
                    result: None,
                    error: Some(e.to_string()),
                },
            };
        }

        match self
            .dispatcher
            .dispatch_tool_call(&call.tool, call.params.clone(), TOOL_CALL_TIMEOUT_MS)
            .await
        {
            Ok(result) if result.success => ToolCallRecord {
                tool: call.tool,
                params: call.params,
                result: result.output,
                error: None,
            },
            Ok(result) => ToolCallRecord {
                tool: call.tool,
                params: call.params,
                result: None,
                error: result.error.or_else(|| Some("tool execution failed".to_string())),
            },
            Err(e) => ToolCallRecord {
                tool: call.tool,
                params: call.params,
                result: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Phase 3: single-agent passthrough, aggregation, concat fallback
    async fn aggregate(&self, message: &str, results: &[AgentResult]) -> String {
        if results.len() == 1 {
            return results[0].summary.clone();
        }

        let summaries: Vec<AgentSummary> = results
            .iter()
            .map(|r| AgentSummary {
                agent_id: r.agent.clone(),
                agent_name: r.agent_name.clone(),
                summary: r.summary.clone(),
            })
            .collect();

        match self.tools.aggregate(message, &summaries).await {
            Ok(merged) => merged,
            Err(e) => {
                warn!(error = %e, "aggregation planner unavailable, concatenating");
                summaries
                    .iter()
                    .map(|s| format!("**{}:** {}", s.agent_name, s.summary))
                    .collect::<Vec<_>>()
                    .join("\n\n")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::IntentSelection;
    use async_trait::async_trait;
    use swarmlink_registry::NodeRegistry;
    use swarmlink_types::SwarmlinkError;

    /// Scriptable planner used as both intent and tool planner
    struct StubPlanner {
        intent: Option<IntentSelection>,
        plan: Vec<PlannedCall>,
        summary: std::result::Result<String, String>,
        aggregate: Option<String>,
    }

    impl StubPlanner {
        fn selecting(agents: &[&str]) -> Self {
            Self {
                intent: Some(IntentSelection {
                    agents: agents.iter().map(|s| s.to_string()).collect(),
                    reasoning: "scripted".to_string(),
                }),
                plan: vec![],
                summary: Ok("a useful answer".to_string()),
                aggregate: Some("merged answer".to_string()),
            }
        }

        fn unavailable() -> Self {
            Self {
                intent: None,
                plan: vec![],
                summary: Err("planner down".to_string()),
                aggregate: None,
            }
        }
    }

    #[async_trait]
    impl IntentPlanner for StubPlanner {
        async fn select_agents(
            &self,
            _message: &str,
            _catalogue: &[AgentDefinition],
        ) -> Result<IntentSelection> {
            self.intent
                .clone()
                .ok_or_else(|| SwarmlinkError::PlannerUnavailable {
                    reason: "scripted outage".to_string(),
                })
        }
    }

    #[async_trait]
    impl ToolPlanner for StubPlanner {
        async fn plan_calls(
            &self,
            _agent: &AgentDefinition,
            _message: &str,
        ) -> Result<Vec<PlannedCall>> {
            Ok(self.plan.clone())
        }

        async fn summarize(
            &self,
            _agent: &AgentDefinition,
            _message: &str,
            _tool_results: &serde_json::Value,
        ) -> Result<String> {
            self.summary
                .clone()
                .map_err(|reason| SwarmlinkError::PlannerUnavailable { reason })
        }

        async fn aggregate(
            &self,
            _message: &str,
            _summaries: &[AgentSummary],
        ) -> Result<String> {
            self.aggregate
                .clone()
                .ok_or_else(|| SwarmlinkError::PlannerUnavailable {
                    reason: "scripted outage".to_string(),
                })
        }
    }

    fn orchestrator(planner: StubPlanner) -> Orchestrator {
        let agents = Arc::new(AgentStore::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(NodeRegistry::new()),
            agents.clone(),
        ));
        let planner = Arc::new(planner);
        Orchestrator::new(agents, dispatcher, planner.clone(), planner)
    }

    #[tokio::test]
    async fn planned_agents_run_and_aggregate() {
        let orchestrator =
            orchestrator(StubPlanner::selecting(&["travel-planner", "budget-planner"]));
        let response = orchestrator
            .execute("Plan a cheap trip to Tokyo")
            .await
            .unwrap();

        assert_eq!(
            response.agents_used,
            vec!["travel-planner", "budget-planner"]
        );
        assert_eq!(response.message, "merged answer");
        assert_eq!(response.reasoning.as_deref(), Some("scripted"));
        assert!(response.is_chargeable());
    }

    #[tokio::test]
    async fn single_agent_summary_is_returned_verbatim() {
        let orchestrator = orchestrator(StubPlanner::selecting(&["summarizer"]));
        let response = orchestrator.execute("summarize this").await.unwrap();
        assert_eq!(response.message, "a useful answer");
    }

    #[tokio::test]
    async fn planner_outage_falls_back_to_keywords() {
        let orchestrator = orchestrator(StubPlanner::unavailable());
        let response = orchestrator
            .execute("Plan a cheap trip to Tokyo")
            .await
            .unwrap();

        // Keyword fallback still picks the right specialists
        assert!(response.agents_used.contains(&"travel-planner".to_string()));
        assert!(response.agents_used.contains(&"budget-planner".to_string()));
        assert!(response.agents_used.len() <= MAX_AGENTS_PER_QUERY);
        assert!(response.reasoning.is_none());
    }

    #[tokio::test]
    async fn all_agents_failing_is_not_chargeable() {
        let mut planner = StubPlanner::selecting(&["travel-planner", "budget-planner"]);
        planner.summary = Err("planner down".to_string());
        planner.aggregate = None;
        let orchestrator = orchestrator(planner);

        let response = orchestrator.execute("Plan a trip").await.unwrap();
        assert!(!response.is_chargeable());
        for result in &response.agent_results {
            assert!(result.summary.starts_with("Error: "));
        }
        // Concat fallback still produces a readable message
        assert!(response.message.contains("**Travel Planner:**"));
    }

    #[tokio::test]
    async fn unknown_planner_selections_trigger_fallback() {
        let orchestrator = orchestrator(StubPlanner::selecting(&["not-a-real-agent"]));
        let response = orchestrator.execute("what's the weather").await.unwrap();
        assert!(response
            .agents_used
            .contains(&"weather-reporter".to_string()));
    }

    #[tokio::test]
    async fn selection_is_capped_at_three() {
        let orchestrator = orchestrator(StubPlanner::selecting(&[
            "travel-planner",
            "budget-planner",
            "weather-reporter",
            "summarizer",
        ]));
        let response = orchestrator.execute("anything").await.unwrap();
        assert_eq!(response.agents_used.len(), MAX_AGENTS_PER_QUERY);
    }

    #[tokio::test]
    async fn local_tools_execute_inline() {
        let mut planner = StubPlanner::selecting(&["data-analyst"]);
        planner.plan = vec![PlannedCall {
            tool: "calculate".to_string(),
            params: json!({"expression": "2 + 2"}),
        }];
        let orchestrator = orchestrator(planner);

        let response = orchestrator.execute("what is 2+2").await.unwrap();
        let result = &response.agent_results[0];
        assert_eq!(result.tools.len(), 1);
        assert_eq!(result.tools[0].result.as_ref().unwrap()["result"], 4.0);
        assert!(result.tools[0].error.is_none());
    }

    #[tokio::test]
    async fn dedicated_agent_node_runs_the_whole_turn() {
        use swarmlink_registry::{Outbound, Registration};
        use swarmlink_types::{JobId, NodeId};

        let registry = Arc::new(NodeRegistry::new());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        registry
            .register(
                NodeId::new("agent-host"),
                tx,
                Registration {
                    capabilities: vec![],
                    agent_types: vec!["travel-planner".to_string()],
                    wallet: None,
                    version: "1.0".to_string(),
                },
            )
            .await;

        let agents = Arc::new(AgentStore::new());
        let dispatcher = Arc::new(Dispatcher::new(registry, agents.clone()));
        let planner = Arc::new(StubPlanner::selecting(&["travel-planner"]));
        let orchestrator =
            Orchestrator::new(agents, dispatcher.clone(), planner.clone(), planner);

        let worker = tokio::spawn(async move {
            let assigned = rx.recv().await.unwrap();
            let job_id: JobId = match &assigned {
                Outbound::Frame(frame) => match &frame.payload {
                    swarmlink_protocol::FramePayload::AgentJob { job_id, .. } => *job_id,
                    other => panic!("expected AGENT_JOB, got {other:?}"),
                },
                other => panic!("expected frame, got {other:?}"),
            };
            dispatcher.handle_agent_job_result(
                job_id,
                swarmlink_dispatch::AgentJobOutcome {
                    success: true,
                    response: "remote itinerary".to_string(),
                    tools_used: vec!["webSearch".to_string()],
                    error: None,
                },
            );
        });

        let response = orchestrator.execute("plan a trip").await.unwrap();
        worker.await.unwrap();

        // The worker's answer is the agent's summary; no local planning ran
        assert_eq!(response.message, "remote itinerary");
        assert_eq!(response.agent_results[0].tools[0].tool, "webSearch");
        assert!(response.is_chargeable());
    }

    #[tokio::test]
    async fn worker_tool_without_fleet_records_error_but_agent_continues() {
        let mut planner = StubPlanner::selecting(&["web-researcher"]);
        planner.plan = vec![PlannedCall {
            tool: "webSearch".to_string(),
            params: json!({"query": "tokyo"}),
        }];
        let orchestrator = orchestrator(planner);

        let response = orchestrator.execute("search something").await.unwrap();
        let result = &response.agent_results[0];
        assert!(result.tools[0].error.is_some());
        // Summarize still ran; the agent result stands
        assert_eq!(result.summary, "a useful answer");
        assert!(response.is_chargeable());
    }
}
