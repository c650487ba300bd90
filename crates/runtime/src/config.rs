// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent configuration.

use qo_consensus::ConsensusConfig;
use qo_core::{AgentId, Budget, CapabilityGroup, ModelId, TaskId};

/// Everything needed to start one agent.
#[derive(Clone)]
pub struct AgentConfig {
    pub agent_id: AgentId,
    /// Durable parent relationship. Spawned children carry this and
    /// survive parent death.
    pub parent_id: Option<AgentId>,
    /// Monitored peer treated as the parent process. Defaults to
    /// `parent_id`; test fixtures may watch a peer without recording a
    /// durable parent.
    pub parent_ref: Option<AgentId>,
    pub task_id: TaskId,
    pub profile_name: String,
    pub profile_description: String,
    pub model_pool: Vec<ModelId>,
    pub capabilities: Vec<CapabilityGroup>,
    pub budget: Budget,
    pub consensus: ConsensusConfig,
    pub active_skills: Vec<String>,
    /// Dollars per 1k oracle tokens folded into the spend figure.
    pub token_rate: f64,
    /// Bounded retries for cycles where the oracle majority failed.
    pub max_consensus_retries: u32,
    /// Safe fallback wait armed once retries are exhausted.
    pub safe_wait_secs: u64,
    /// Test hook: park scheduled cycles instead of running them.
    pub suppress_auto_consensus: bool,
}

impl AgentConfig {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            agent_id: AgentId::new(),
            parent_id: None,
            parent_ref: None,
            task_id,
            profile_name: "agent".to_string(),
            profile_description: String::new(),
            model_pool: Vec::new(),
            capabilities: Vec::new(),
            budget: Budget::untracked(),
            consensus: ConsensusConfig::default(),
            active_skills: Vec::new(),
            token_rate: 0.0,
            max_consensus_retries: 2,
            safe_wait_secs: 30,
            suppress_auto_consensus: false,
        }
    }

    qo_core::setters! {
        into {
            profile_name: String,
            profile_description: String,
        }
        set {
            agent_id: AgentId,
            task_id: TaskId,
            model_pool: Vec<ModelId>,
            capabilities: Vec<CapabilityGroup>,
            budget: Budget,
            consensus: ConsensusConfig,
            active_skills: Vec<String>,
            token_rate: f64,
            max_consensus_retries: u32,
            safe_wait_secs: u64,
            suppress_auto_consensus: bool,
        }
        option {
            parent_id: AgentId,
            parent_ref: AgentId,
        }
    }

    /// Config for a child spawned by this agent: same pool, capabilities,
    /// and tuning; fresh identity; budget per the spawn request.
    pub fn child(&self, profile_name: &str, profile_description: &str, allocated: Option<f64>) -> Self {
        Self {
            agent_id: AgentId::new(),
            parent_id: Some(self.agent_id),
            parent_ref: Some(self.agent_id),
            task_id: self.task_id,
            profile_name: profile_name.to_string(),
            profile_description: profile_description.to_string(),
            model_pool: self.model_pool.clone(),
            capabilities: self.capabilities.clone(),
            budget: match allocated {
                Some(amount) => Budget::allocated(amount),
                None => Budget::untracked(),
            },
            consensus: self.consensus.clone(),
            active_skills: self.active_skills.clone(),
            token_rate: self.token_rate,
            max_consensus_retries: self.max_consensus_retries,
            safe_wait_secs: self.safe_wait_secs,
            suppress_auto_consensus: self.suppress_auto_consensus,
        }
    }
}
