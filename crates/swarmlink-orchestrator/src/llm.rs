//! LLM-backed planner over an OpenAI-compatible chat endpoint

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use swarmlink_agents::AgentDefinition;
use swarmlink_types::{Result, SwarmlinkError};

use crate::planner::{
    parse_intent, AgentSummary, IntentPlanner, IntentSelection, PlannedCall, ToolPlanner,
};

/// Configuration for the LLM planner
#[derive(Debug, Clone)]
pub struct LlmPlannerConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for LlmPlannerConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("SWARMLINK_LLM_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000/v1".to_string()),
            api_key: std::env::var("SWARMLINK_LLM_API_KEY").ok(),
            model: std::env::var("SWARMLINK_LLM_MODEL")
                .unwrap_or_else(|_| "default".to_string()),
        }
    }
}

/// Planner backed by an OpenAI-compatible API (vLLM, llama.cpp, hosted)
pub struct LlmPlanner {
    config: LlmPlannerConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl LlmPlanner {
    pub fn new(config: LlmPlannerConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(LlmPlannerConfig::default())
    }

    async fn chat(&self, system: &str, user: String, json_mode: bool) -> Result<String> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: 0.2,
            response_format: json_mode.then(|| serde_json::json!({"type": "json_object"})),
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let mut req = self.client.post(&url).json(&request);
        if let Some(ref key) = self.config.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| SwarmlinkError::PlannerUnavailable {
                reason: format!("planner unreachable: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(SwarmlinkError::PlannerUnavailable {
                reason: format!("planner returned HTTP {}", response.status()),
            });
        }

        let body: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| SwarmlinkError::PlannerUnavailable {
                    reason: format!("malformed planner response: {e}"),
                })?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| SwarmlinkError::PlannerUnavailable {
                reason: "planner returned no choices".to_string(),
            })
    }
}

#[async_trait]
impl IntentPlanner for LlmPlanner {
    async fn select_agents(
        &self,
        message: &str,
        catalogue: &[AgentDefinition],
    ) -> Result<IntentSelection> {
        let roster = catalogue
            .iter()
            .map(|a| format!("- {} : {}", a.id, a.description))
            .collect::<Vec<_>>()
            .join("\n");

        let system = r#"You route user queries to specialist agents. Output valid JSON only.

Schema:
{"agents": ["agent-id"], "reasoning": "one sentence"}

Rules:
- pick at most 3 agents from the roster, by id
- prefer fewer agents over more"#;

        let user = format!("Roster:\n{roster}\n\nQuery: {message}\n\nSelect agents.");
        let content = self.chat(system, user, true).await?;
        parse_intent(&content)
    }
}

#[async_trait]
impl ToolPlanner for LlmPlanner {
    async fn plan_calls(
        &self,
        agent: &AgentDefinition,
        message: &str,
    ) -> Result<Vec<PlannedCall>> {
        if agent.tools.is_empty() {
            return Ok(vec![]);
        }

        let tools = agent
            .tools
            .iter()
            .map(|t| format!("- {} ({}) : {}", t.name, t.parameters.join(", "), t.description))
            .collect::<Vec<_>>()
            .join("\n");

        let system = r#"You plan tool calls for an agent. Output valid JSON only.

Schema:
{"calls": [{"tool": "name", "params": {}}]}

Rules:
- use only the listed tools
- an empty calls array is a valid plan"#;

        let user = format!("Tools:\n{tools}\n\nQuery: {message}\n\nPlan the calls.");
        let content = self.chat(system, user, true).await?;

        #[derive(Deserialize)]
        struct Plan {
            #[serde(default)]
            calls: Vec<PlannedCall>,
        }
        let plan: Plan =
            serde_json::from_str(&content).map_err(|e| SwarmlinkError::PlannerUnavailable {
                reason: format!("malformed tool plan: {e}"),
            })?;

        // Unknown tools are a planner hallucination; drop them
        let known: Vec<PlannedCall> = plan
            .calls
            .into_iter()
            .filter(|c| agent.tools.iter().any(|t| t.name == c.tool))
            .collect();
        Ok(known)
    }

    async fn summarize(
        &self,
        agent: &AgentDefinition,
        message: &str,
        tool_results: &serde_json::Value,
    ) -> Result<String> {
        let user = format!(
            "Query: {message}\n\nTool results:\n{}\n\nAnswer the query from your specialty.",
            serde_json::to_string_pretty(tool_results).unwrap_or_default()
        );
        self.chat(&agent.system_prompt, user, false).await
    }

    async fn aggregate(&self, message: &str, summaries: &[AgentSummary]) -> Result<String> {
        let sections = summaries
            .iter()
            .map(|s| format!("## {}\n{}", s.agent_name, s.summary))
            .collect::<Vec<_>>()
            .join("\n\n");

        let system = "You merge specialist answers into one coherent response. \
                      Keep every concrete fact; drop repetition.";
        let user = format!("Query: {message}\n\nSpecialist answers:\n\n{sections}");
        self.chat(system, user, false).await
    }
}
