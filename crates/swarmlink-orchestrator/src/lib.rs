//! Swarmlink Orchestrator - query decomposition and agent fan-out
//!
//! One query flows through three phases: intent analysis selects up to three
//! agents, the agents execute concurrently (tool planning, tool execution,
//! per-agent summary), and the per-agent summaries are aggregated into one
//! response. Planner failures degrade, never abort: intent falls back to
//! keyword matching and aggregation falls back to concatenation.

pub mod deterministic;
pub mod llm;
pub mod orchestrator;
pub mod planner;

pub use deterministic::DeterministicPlanner;
pub use llm::LlmPlanner;
pub use orchestrator::{
    AgentResult, MultiAgentResponse, Orchestrator, ToolCallRecord, MAX_AGENTS_PER_QUERY,
};
pub use planner::{
    parse_intent, AgentSummary, IntentPlanner, IntentSelection, PlannedCall, ToolPlanner,
};
