// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The prompt-assembly boundary.
//!
//! Prompt content (allowed-action wording, example JSON, skill injection)
//! is delegated; the runtime only requires a pure function from profile
//! context to a system prompt. [`StaticPromptBuilder`] is the minimal
//! in-tree implementation used by tests and defaults.

use qo_core::{ActionKind, CapabilityGroup};

/// JSON Schema skeleton for one-action responses, handed to the prompt
/// builder. The full schema (per-action params) is assembled out of core.
pub const RESPONSE_SCHEMA: &str = r#"{"type":"object","required":["action"],"properties":{"action":{"type":"string"},"params":{"type":"object"},"reasoning":{"type":"string"},"wait":{"type":["boolean","integer"],"minimum":0},"auto_complete_todo":{"type":"boolean"},"condense":{"type":"boolean"},"bug_report":{"type":"string"}}}"#;

/// Who the agent is, as fed to the prompt builder.
#[derive(Debug, Clone, Default)]
pub struct ProfileContext {
    pub profile_name: String,
    pub profile_description: String,
}

/// Pure system-prompt assembly.
pub trait PromptBuilder: Send + Sync {
    fn build_system_prompt(
        &self,
        profile: &ProfileContext,
        capabilities: &[CapabilityGroup],
        allowed_actions: &[ActionKind],
        active_skills: &[String],
        response_schema: &str,
    ) -> String;
}

/// Bare-bones prompt builder: profile, allowed actions, schema. Content
/// tuning belongs to the real implementation outside this crate.
#[derive(Debug, Clone, Default)]
pub struct StaticPromptBuilder;

impl PromptBuilder for StaticPromptBuilder {
    fn build_system_prompt(
        &self,
        profile: &ProfileContext,
        capabilities: &[CapabilityGroup],
        allowed_actions: &[ActionKind],
        active_skills: &[String],
        response_schema: &str,
    ) -> String {
        let actions: Vec<String> = allowed_actions.iter().map(|a| a.name()).collect();
        let caps: Vec<String> = capabilities.iter().map(|c| c.to_string()).collect();
        let mut prompt = format!(
            "You are {name}: {desc}\nCapabilities: {caps}\nRespond with exactly one JSON action from: {actions}\nSchema: {schema}",
            name = profile.profile_name,
            desc = profile.profile_description,
            caps = caps.join(", "),
            actions = actions.join(", "),
            schema = response_schema,
        );
        if !active_skills.is_empty() {
            prompt.push_str("\nActive skills: ");
            prompt.push_str(&active_skills.join(", "));
        }
        prompt
    }
}

/// Compute the actions available to an agent with the given capabilities.
pub fn allowed_actions(capabilities: &[CapabilityGroup]) -> Vec<ActionKind> {
    use ActionKind::*;
    let all = [
        Wait,
        SendMessage,
        SetTodos,
        TaskComplete,
        BatchSync,
        BatchAsync,
        SpawnChild,
        DismissChild,
        AdjustChildBudget,
        ReadFile,
        ListDirectory,
        WriteFile,
        ApiCall,
        McpTool,
        RunShell,
        ShellStatus,
        TerminateShell,
    ];
    all.into_iter()
        .filter(|kind| match kind.capability() {
            None => true,
            Some(group) => capabilities.contains(&group),
        })
        .collect()
}

/// Deliberative context for a refinement round: the previous round's
/// responses without model attribution.
pub fn refinement_context(responses: &[String]) -> String {
    let mut out = String::from(
        "The council did not reach consensus. These candidate actions were proposed (unattributed):\n",
    );
    for response in responses {
        out.push_str("- ");
        out.push_str(response);
        out.push('\n');
    }
    out.push_str("Reconsider and answer again with exactly one JSON action.");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_actions_respect_capability_groups() {
        let base = allowed_actions(&[]);
        assert!(base.contains(&ActionKind::Wait));
        assert!(base.contains(&ActionKind::BatchAsync));
        assert!(!base.contains(&ActionKind::RunShell));
        assert!(!base.contains(&ActionKind::SpawnChild));

        let shell = allowed_actions(&[CapabilityGroup::LocalExecution]);
        assert!(shell.contains(&ActionKind::RunShell));
        assert!(shell.contains(&ActionKind::TerminateShell));
        assert!(!shell.contains(&ActionKind::WriteFile));
    }

    #[test]
    fn refinement_context_names_no_models() {
        let ctx = refinement_context(&["{\"action\":\"wait\"}".to_string()]);
        assert!(ctx.contains("unattributed"));
        assert!(ctx.contains("{\"action\":\"wait\"}"));
    }

    #[test]
    fn static_builder_mentions_profile_and_actions() {
        let prompt = StaticPromptBuilder.build_system_prompt(
            &ProfileContext {
                profile_name: "researcher".into(),
                profile_description: "digs through sources".into(),
            },
            &[CapabilityGroup::FileRead],
            &allowed_actions(&[CapabilityGroup::FileRead]),
            &[],
            "{}",
        );
        assert!(prompt.contains("researcher"));
        assert!(prompt.contains("read_file"));
        assert!(!prompt.contains("run_shell"));
    }
}
