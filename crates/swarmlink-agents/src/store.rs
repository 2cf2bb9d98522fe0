//! Agent store - catalogue plus user-created agents and per-agent memory
//!
//! Seeded from the stock catalogue at construction. CRUD backs the
//! `/api/agents` endpoints; memory holds whatever a worker returned in its
//! last JOB_RESULT for an agent and is attached to the next assignment as
//! `context`.

use parking_lot::RwLock;
use std::collections::HashMap;

use swarmlink_types::{Result, SwarmlinkError};

use crate::catalogue::{stock_catalogue, AgentDefinition};

pub struct AgentStore {
    agents: RwLock<HashMap<String, AgentDefinition>>,
    memories: RwLock<HashMap<String, serde_json::Value>>,
}

impl AgentStore {
    /// Store seeded with the stock catalogue
    pub fn new() -> Self {
        let agents = stock_catalogue()
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();
        Self {
            agents: RwLock::new(agents),
            memories: RwLock::new(HashMap::new()),
        }
    }

    /// All agents, sorted by id for stable listings
    pub fn list(&self) -> Vec<AgentDefinition> {
        let mut agents: Vec<AgentDefinition> = self.agents.read().values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    pub fn get(&self, id: &str) -> Option<AgentDefinition> {
        self.agents.read().get(id).cloned()
    }

    /// Insert a new agent; rejects duplicate ids
    pub fn create(&self, agent: AgentDefinition) -> Result<()> {
        let mut agents = self.agents.write();
        if agents.contains_key(&agent.id) {
            return Err(SwarmlinkError::Internal {
                message: format!("agent {} already exists", agent.id),
            });
        }
        agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    /// Replace an existing agent definition
    pub fn update(&self, id: &str, agent: AgentDefinition) -> Result<()> {
        let mut agents = self.agents.write();
        if !agents.contains_key(id) {
            return Err(SwarmlinkError::AgentNotFound {
                agent_id: id.to_string(),
            });
        }
        agents.insert(id.to_string(), agent);
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let mut agents = self.agents.write();
        match agents.remove(id) {
            Some(_) => {
                self.memories.write().remove(id);
                Ok(())
            }
            None => Err(SwarmlinkError::AgentNotFound {
                agent_id: id.to_string(),
            }),
        }
    }

    /// Persist memory returned by a worker for an agent
    pub fn store_memory(&self, agent_id: &str, memory: serde_json::Value) {
        self.memories.write().insert(agent_id.to_string(), memory);
    }

    /// Latest persisted memory for an agent, if any
    pub fn memory_of(&self, agent_id: &str) -> Option<serde_json::Value> {
        self.memories.read().get(agent_id).cloned()
    }
}

impl Default for AgentStore {
    fn default() -> Self {
        Self::new()
    }
}
