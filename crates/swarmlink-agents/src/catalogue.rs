//! Stock agent catalogue
//!
//! Fifteen domain specialists. Keywords drive the fallback selector when the
//! intent planner is unavailable; tool descriptors feed the tool planner.

use serde::{Deserialize, Serialize};

/// Agent used when nothing else matches a query
pub const FALLBACK_AGENT_ID: &str = "general-assistant";

/// A named callable with its parameter names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<String>,
}

impl ToolDescriptor {
    pub fn new(name: &str, description: &str, parameters: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Immutable catalogue record for one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub tools: Vec<ToolDescriptor>,
    pub keywords: Vec<String>,
    /// Optional sandbox script attached to JOB_ASSIGN frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// Optional payout wallet for settlement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet: Option<String>,
}

impl AgentDefinition {
    fn new(
        id: &str,
        name: &str,
        description: &str,
        system_prompt: &str,
        tools: Vec<ToolDescriptor>,
        keywords: &[&str],
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            system_prompt: system_prompt.to_string(),
            tools,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            script: None,
            wallet: None,
        }
    }

    /// Whether any keyword appears in the lowercased message
    pub fn matches_keywords(&self, lowercased_message: &str) -> bool {
        self.keywords.iter().any(|k| lowercased_message.contains(k))
    }
}

/// The fifteen stock agents
pub fn stock_catalogue() -> Vec<AgentDefinition> {
    vec![
        AgentDefinition::new(
            "travel-planner",
            "Travel Planner",
            "Builds itineraries, finds routes, and suggests destinations",
            "You are a travel planning specialist. Build practical itineraries with concrete transport and lodging suggestions.",
            vec![
                ToolDescriptor::new("webSearch", "Search the web for travel information", &["query"]),
                ToolDescriptor::new("currentDatetime", "Current date and time", &[]),
            ],
            &["trip", "travel", "flight", "hotel", "itinerary", "vacation", "tokyo"],
        ),
        AgentDefinition::new(
            "budget-planner",
            "Budget Planner",
            "Estimates costs and builds spending plans",
            "You are a budgeting specialist. Produce itemized cost estimates and call out the biggest savings levers.",
            vec![
                ToolDescriptor::new("calculate", "Evaluate an arithmetic expression", &["expression"]),
            ],
            &["budget", "cost", "cheap", "price", "afford", "spend", "save"],
        ),
        AgentDefinition::new(
            "web-researcher",
            "Web Researcher",
            "Answers questions by searching and reading the web",
            "You are a research specialist. Search, read, and synthesize findings with sources.",
            vec![
                ToolDescriptor::new("webSearch", "Search the web", &["query"]),
            ],
            &["search", "find", "research", "look up", "what is", "who is"],
        ),
        AgentDefinition::new(
            "news-digest",
            "News Digest",
            "Summarizes current events on a topic",
            "You are a news analyst. Summarize the latest developments neutrally, dating each item.",
            vec![
                ToolDescriptor::new("webSearch", "Search recent news", &["query"]),
            ],
            &["news", "headline", "latest", "today", "happening"],
        ),
        AgentDefinition::new(
            "weather-reporter",
            "Weather Reporter",
            "Reports current conditions and forecasts",
            "You are a weather specialist. Report conditions and forecasts with units.",
            vec![
                ToolDescriptor::new("weatherLookup", "Fetch weather for a location", &["location"]),
            ],
            &["weather", "forecast", "rain", "temperature", "sunny", "snow"],
        ),
        AgentDefinition::new(
            "translator",
            "Translator",
            "Translates text between languages",
            "You are a translator. Preserve tone and idiom; note ambiguities.",
            vec![],
            &["translate", "translation", "in spanish", "in french", "in japanese"],
        ),
        AgentDefinition::new(
            "summarizer",
            "Summarizer",
            "Condenses long text into key points",
            "You are a summarization specialist. Produce faithful, compact summaries.",
            vec![
                ToolDescriptor::new("wordCount", "Count words in a text", &["text"]),
            ],
            &["summarize", "summary", "tldr", "shorten", "condense"],
        ),
        AgentDefinition::new(
            "code-assistant",
            "Code Assistant",
            "Writes and reviews code snippets",
            "You are a senior engineer. Write idiomatic, tested code and explain tradeoffs briefly.",
            vec![
                ToolDescriptor::new("runScript", "Execute a script in a sandbox", &["script"]),
            ],
            &["code", "function", "bug", "python", "rust", "javascript", "script"],
        ),
        AgentDefinition::new(
            "data-analyst",
            "Data Analyst",
            "Analyzes datasets and computes statistics",
            "You are a data analyst. Quantify claims and show the arithmetic.",
            vec![
                ToolDescriptor::new("calculate", "Evaluate an arithmetic expression", &["expression"]),
            ],
            &["data", "average", "statistics", "trend", "analyze", "chart"],
        ),
        AgentDefinition::new(
            "crypto-analyst",
            "Crypto Analyst",
            "Tracks token prices and on-chain activity",
            "You are a crypto market analyst. Report prices and flows without giving financial advice.",
            vec![
                ToolDescriptor::new("tokenPrice", "Fetch a token price", &["symbol"]),
            ],
            &["crypto", "bitcoin", "ethereum", "token", "usdc", "wallet", "onchain"],
        ),
        AgentDefinition::new(
            "email-drafter",
            "Email Drafter",
            "Drafts and polishes email messages",
            "You are a communications specialist. Draft clear, appropriately formal email.",
            vec![],
            &["email", "draft", "reply", "message", "write to"],
        ),
        AgentDefinition::new(
            "calendar-planner",
            "Calendar Planner",
            "Plans schedules and resolves time conflicts",
            "You are a scheduling specialist. Propose concrete time slots and flag conflicts.",
            vec![
                ToolDescriptor::new("currentDatetime", "Current date and time", &[]),
            ],
            &["schedule", "calendar", "meeting", "appointment", "remind"],
        ),
        AgentDefinition::new(
            "shopping-assistant",
            "Shopping Assistant",
            "Compares products and finds deals",
            "You are a shopping specialist. Compare options on price and fitness for purpose.",
            vec![
                ToolDescriptor::new("webSearch", "Search for products", &["query"]),
            ],
            &["buy", "shop", "product", "deal", "compare", "order"],
        ),
        AgentDefinition::new(
            "fitness-coach",
            "Fitness Coach",
            "Suggests workout and recovery plans",
            "You are a fitness coach. Suggest progressive, safe training plans.",
            vec![],
            &["workout", "exercise", "fitness", "gym", "run", "training"],
        ),
        AgentDefinition::new(
            FALLBACK_AGENT_ID,
            "General Assistant",
            "Handles anything the specialists do not cover",
            "You are a capable general assistant. Answer directly and concisely.",
            vec![
                ToolDescriptor::new("currentDatetime", "Current date and time", &[]),
            ],
            &[],
        ),
    ]
}

/// Keyword-based fallback selector.
///
/// Lowercases the message, selects every agent with an intersecting keyword,
/// and falls back to [`FALLBACK_AGENT_ID`] when nothing matches. The caller
/// caps the selection size.
pub fn select_by_keywords<'a>(
    catalogue: &'a [AgentDefinition],
    message: &str,
) -> Vec<&'a AgentDefinition> {
    let lowered = message.to_lowercase();
    let matched: Vec<&AgentDefinition> = catalogue
        .iter()
        .filter(|a| a.matches_keywords(&lowered))
        .collect();

    if matched.is_empty() {
        catalogue
            .iter()
            .filter(|a| a.id == FALLBACK_AGENT_ID)
            .collect()
    } else {
        matched
    }
}
