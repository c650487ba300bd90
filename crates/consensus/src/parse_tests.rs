// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use qo_core::WaitDirective;

#[test]
fn parses_bare_json() {
    let req = parse_response(r#"{"action": "wait", "wait": 30}"#).unwrap();
    assert_eq!(req.kind, ActionKind::Wait);
    assert_eq!(req.wait, WaitDirective::Timed(30));
}

#[test]
fn parses_fenced_json() {
    let raw = "Here is my choice:\n```json\n{\"action\": \"send_message\", \"params\": {\"to\": \"agt-b\", \"content\": \"hi\"}, \"wait\": false}\n```\nDone.";
    let req = parse_response(raw).unwrap();
    assert_eq!(req.kind, ActionKind::SendMessage);
    assert_eq!(req.params["to"], "agt-b");
}

#[test]
fn parses_json_embedded_in_prose() {
    let raw = "I think we should {\"action\": \"task_complete\", \"wait\": false} now";
    let req = parse_response(raw).unwrap();
    assert_eq!(req.kind, ActionKind::TaskComplete);
}

#[test]
fn nested_braces_and_strings_do_not_confuse_extraction() {
    let raw = r#"{"action": "run_shell", "params": {"command": "echo '{}'", "env": {"A": "}"}}, "wait": true}"#;
    let req = parse_response(raw).unwrap();
    assert_eq!(req.kind, ActionKind::RunShell);
    assert_eq!(req.wait, WaitDirective::Block);
    assert_eq!(req.params["command"], "echo '{}'");
}

#[test]
fn reasoning_and_flags_carry_through() {
    let raw = r#"{"action": "write_file", "params": {"path": "a.txt"}, "reasoning": "persist findings", "auto_complete_todo": true, "condense": true, "bug_report": "flaky timer"}"#;
    let req = parse_response(raw).unwrap();
    assert_eq!(req.reasoning.as_deref(), Some("persist findings"));
    assert!(req.auto_complete_todo);
    assert!(req.condense);
    assert_eq!(req.bug_report.as_deref(), Some("flaky timer"));
}

#[test]
fn missing_params_defaults_to_empty_object() {
    let req = parse_response(r#"{"action": "wait", "wait": true}"#).unwrap();
    assert!(req.params.as_object().map(|m| m.is_empty()).unwrap_or(false));
}

#[test]
fn rejects_prose_without_json() {
    assert_eq!(parse_response("I will simply wait."), Err(ParseError::NoJson));
}

#[test]
fn rejects_unknown_action() {
    let err = parse_response(r#"{"action": "summon_demon"}"#).unwrap_err();
    assert_eq!(err, ParseError::UnknownAction("summon_demon".into()));
}

#[test]
fn rejects_non_object_params() {
    let err = parse_response(r#"{"action": "wait", "params": [1, 2]}"#).unwrap_err();
    assert!(matches!(err, ParseError::Malformed(_)));
}

#[test]
fn rejects_malformed_wait() {
    let err = parse_response(r#"{"action": "wait", "wait": "later"}"#).unwrap_err();
    assert!(matches!(err, ParseError::Malformed(_)));
}
