// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted oracle for engine and runtime tests.

use crate::oracle::{OracleClient, OracleError, OracleReply, OracleUsage, QueryOpts};
use async_trait::async_trait;
use parking_lot::Mutex;
use qo_core::{ChatMessage, ModelId};
use std::collections::{HashMap, VecDeque};

/// One scripted turn for one model.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Reply(String),
    Fail(String),
    PermanentFail(String),
}

/// What one query looked like, for assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: ModelId,
    pub temperature: f32,
    pub conversation: Vec<ChatMessage>,
    pub system_prompt: String,
}

/// Oracle whose answers are queued per model. Once a model's queue is
/// empty it answers with a safe blocking wait.
#[derive(Default)]
pub struct ScriptedOracle {
    scripts: Mutex<HashMap<ModelId, VecDeque<ScriptStep>>>,
    calls: Mutex<Vec<RecordedCall>>,
    usage_per_call: u64,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self { usage_per_call: 10, ..Default::default() }
    }

    /// Queue a raw reply body for `model`'s next un-scripted query.
    pub fn reply(&self, model: impl Into<ModelId>, body: impl Into<String>) -> &Self {
        self.push(model.into(), ScriptStep::Reply(body.into()));
        self
    }

    /// Queue a reply shared by every listed model.
    pub fn reply_each(&self, models: &[&str], body: impl Into<String>) -> &Self {
        let body = body.into();
        for model in models {
            self.push(ModelId::new(*model), ScriptStep::Reply(body.clone()));
        }
        self
    }

    pub fn fail(&self, model: impl Into<ModelId>, reason: impl Into<String>) -> &Self {
        self.push(model.into(), ScriptStep::Fail(reason.into()));
        self
    }

    pub fn fail_permanently(&self, model: impl Into<ModelId>, reason: impl Into<String>) -> &Self {
        self.push(model.into(), ScriptStep::PermanentFail(reason.into()));
        self
    }

    fn push(&self, model: ModelId, step: ScriptStep) {
        self.scripts.lock().entry(model).or_default().push_back(step);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl OracleClient for ScriptedOracle {
    async fn query(
        &self,
        model: &ModelId,
        system_prompt: &str,
        conversation: &[ChatMessage],
        opts: &QueryOpts,
    ) -> Result<OracleReply, OracleError> {
        self.calls.lock().push(RecordedCall {
            model: model.clone(),
            temperature: opts.temperature,
            conversation: conversation.to_vec(),
            system_prompt: system_prompt.to_string(),
        });

        if opts.simulate_failure {
            return Err(OracleError::Transient("simulated failure".into()));
        }

        let step = self.scripts.lock().get_mut(model).and_then(VecDeque::pop_front);
        match step {
            Some(ScriptStep::Reply(body)) => Ok(OracleReply {
                content: body,
                usage: OracleUsage {
                    input_tokens: self.usage_per_call,
                    output_tokens: self.usage_per_call,
                },
            }),
            Some(ScriptStep::Fail(reason)) => Err(OracleError::Transient(reason)),
            Some(ScriptStep::PermanentFail(reason)) => Err(OracleError::Permanent(reason)),
            None => Ok(OracleReply {
                content: r#"{"action": "wait", "wait": true}"#.to_string(),
                usage: OracleUsage::default(),
            }),
        }
    }
}
