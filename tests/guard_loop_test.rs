//! 审查循环集成测试：脚本化 Oracle + 内置工具，覆盖同步与流式两种入口

use std::sync::Arc;
use std::time::Duration;

use mailguard::agent::{create_guard_components_with_llm, review, review_stream, GuardComponents};
use mailguard::config::AppConfig;
use mailguard::llm::MockLlmClient;
use mailguard::react::{GuardEvent, Session};
use serde_json::json;

const SSN_DRAFT: &str = "Dear Mr. Smith,\n\nAs requested, the SSN 452-33-8891 has been verified.\n\nBest regards,\nSupport Team";
const REDACTED_DRAFT: &str = "Dear Mr. Smith,\n\nAs requested, the SSN [REDACTED_SSN] has been verified.\n\nBest regards,\nSupport Team";

fn tool(name: &str, input: serde_json::Value) -> String {
    json!({
        "type": "tool",
        "thought_summary": format!("call {name}"),
        "name": name,
        "input": input,
    })
    .to_string()
}

fn ssn_script() -> Vec<String> {
    vec![
        tool("check_compliance", json!({"email_text": SSN_DRAFT})),
        tool("redact_pii", json!({"text": SSN_DRAFT})),
        tool("check_compliance", json!({"email_text": REDACTED_DRAFT})),
        json!({"type": "final", "thought_summary": "passes"}).to_string(),
    ]
}

fn components_with(mock: Arc<MockLlmClient>, max_iterations: usize) -> GuardComponents {
    let mut cfg = AppConfig::default();
    cfg.agent.max_iterations = max_iterations;
    create_guard_components_with_llm(&cfg, mock)
}

async fn collect(mut rx: tokio::sync::mpsc::UnboundedReceiver<GuardEvent>) -> Vec<GuardEvent> {
    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    events
}

#[tokio::test]
async fn test_ssn_scenario_redacts_in_four_turns() {
    let mock = Arc::new(MockLlmClient::scripted(ssn_script()));
    let components = components_with(mock.clone(), 5);

    let mut session = Session::new("Review this email", SSN_DRAFT);
    let answer = components
        .orchestrator
        .run(&mut session, |_| {})
        .await
        .unwrap();

    assert_eq!(session.iteration(), 4);
    assert_eq!(mock.call_count(), 4);
    assert!(answer.contains("[REDACTED_SSN]"));
    assert!(!answer.contains("452-33-8891"));
    assert!(answer.starts_with("Dear Mr. Smith,"));
    // 2 条/工具 * 3 + 1 条 final
    assert_eq!(session.history().len(), 7);
}

#[tokio::test]
async fn test_ssn_scenario_sync_report() {
    let mock = Arc::new(MockLlmClient::scripted(ssn_script()));
    let report = review(&components_with(mock, 5), "Review this email", SSN_DRAFT).await;

    assert!(report.passed);
    assert_eq!(report.total_iterations, 4);
    assert_eq!(report.final_email, REDACTED_DRAFT);
    let iterations: Vec<usize> = report.iterations.iter().map(|r| r.iteration).collect();
    assert_eq!(iterations, vec![1, 2, 3, 4]);
    let tools: Vec<Option<&str>> = report
        .iterations
        .iter()
        .map(|r| r.tool_name.as_deref())
        .collect();
    assert_eq!(
        tools,
        vec![
            Some("check_compliance"),
            Some("redact_pii"),
            Some("check_compliance"),
            None
        ]
    );
}

#[tokio::test]
async fn test_ssn_scenario_stream_events() {
    let mock = Arc::new(MockLlmClient::scripted(ssn_script()));
    let events = collect(review_stream(
        Arc::new(components_with(mock, 5)),
        "Review this email".into(),
        SSN_DRAFT.into(),
    ))
    .await;

    assert_eq!(events.first().map(GuardEvent::kind), Some("start"));
    assert_eq!(events.last().map(GuardEvent::kind), Some("done"));
    assert!(events.iter().all(|e| e.kind() != "error"));

    let results: Vec<bool> = events
        .iter()
        .filter_map(|e| match e {
            GuardEvent::ComplianceResult { pass, .. } => Some(*pass),
            _ => None,
        })
        .collect();
    assert_eq!(results, vec![false, true]);

    let cycles: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            GuardEvent::IterationStart { progress } => Some(progress.iteration),
            _ => None,
        })
        .collect();
    assert_eq!(cycles, vec![1, 2]);

    let issue = events.iter().find_map(|e| match e {
        GuardEvent::Issue { issue, .. } => Some(issue.clone()),
        _ => None,
    });
    let issue = issue.expect("one issue reported");
    assert_eq!(issue.kind, "pii");
    assert_eq!(issue.severity, "critical");

    assert!(events.iter().any(|e| matches!(
        e,
        GuardEvent::RedactionItem { item, .. } if item == "SSN: ***-**-8891"
    )));

    let complete = events.iter().find_map(|e| match e {
        GuardEvent::Complete {
            progress,
            final_email,
        } => Some((progress.iteration, progress.oracle_turn, final_email.clone())),
        _ => None,
    });
    assert_eq!(complete, Some((2, 4, REDACTED_DRAFT.to_string())));
}

#[tokio::test]
async fn test_stream_and_sync_share_trajectory() {
    let script = vec![
        tool("check_compliance", json!({"email_text": SSN_DRAFT})),
        tool("get_policy", json!({"category": "pii"})),
        json!({"type": "rewrite", "thought_summary": "drop the SSN", "email": "Dear Mr. Smith,\n\nVerified.\n"}).to_string(),
        "not json at all".to_string(),
    ];

    let sync_mock = Arc::new(MockLlmClient::scripted(script.clone()));
    let report = review(&components_with(sync_mock.clone(), 5), "goal", SSN_DRAFT).await;

    let stream_mock = Arc::new(MockLlmClient::scripted(script));
    let events = collect(review_stream(
        Arc::new(components_with(stream_mock.clone(), 5)),
        "goal".into(),
        SSN_DRAFT.into(),
    ))
    .await;

    let streamed_final = events.iter().find_map(|e| match e {
        GuardEvent::Complete { final_email, .. } => Some(final_email.clone()),
        _ => None,
    });
    assert_eq!(streamed_final.as_deref(), Some(report.final_email.as_str()));
    assert!(report.final_email.starts_with("ERROR: Model returned non-JSON:"));

    let sync_calls = sync_mock.calls();
    let stream_calls = stream_mock.calls();
    assert_eq!(sync_calls.len(), 4);
    assert_eq!(sync_calls, stream_calls);

    let thoughts: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            GuardEvent::Thinking { thought, .. } => Some(thought.clone()),
            _ => None,
        })
        .collect();
    let reported: Vec<String> = report.iterations.iter().map(|r| r.thought.clone()).collect();
    assert_eq!(thoughts, reported);
}

#[tokio::test]
async fn test_ceiling_returns_last_rewrite() {
    let script = vec![
        json!({"type": "rewrite", "thought_summary": "first", "email": "v1"}).to_string(),
        tool("check_compliance", json!({"email_text": "v1"})),
        json!({"type": "rewrite", "thought_summary": "second", "email": "v2"}).to_string(),
        tool("check_compliance", json!({"email_text": "v2"})),
        tool("check_compliance", json!({"email_text": "v2"})),
        tool("check_compliance", json!({"email_text": "v2"})),
    ];
    let mock = Arc::new(MockLlmClient::scripted(script));
    let report = review(&components_with(mock.clone(), 4), "goal", "v0").await;

    assert_eq!(report.final_email, "v2");
    assert_eq!(mock.call_count(), 4);
    // 4 次 LLM 决策 + 1 次合成的 final
    assert_eq!(report.total_iterations, 5);
    let last = report.iterations.last().unwrap();
    // 合成的 final 不占用 Oracle 轮次编号
    assert_eq!(last.iteration, 0);
    assert_eq!(last.thought, "Reached maximum iterations (4). Returning best effort.");
}

#[tokio::test]
async fn test_unknown_tool_feeds_error_back() {
    let script = vec![
        tool("erase_everything", json!({})),
        json!({"type": "final", "thought_summary": "give up", "answer": "kept"}).to_string(),
    ];
    let mock = Arc::new(MockLlmClient::scripted(script));
    let events = collect(review_stream(
        Arc::new(components_with(mock.clone(), 5)),
        "goal".into(),
        "draft".into(),
    ))
    .await;

    let result = events.iter().find_map(|e| match e {
        GuardEvent::ToolResult { tool_name, result, .. } => Some((tool_name.clone(), result.clone())),
        _ => None,
    });
    let (name, text) = result.expect("tool_result event");
    assert_eq!(name, "erase_everything");
    assert!(text.starts_with("ERROR: unknown tool 'erase_everything'"));

    // 第二次调用能看到错误结果
    let calls = mock.calls();
    assert!(calls[1]
        .iter()
        .any(|m| m.content.contains("erase_everything returned:\nERROR: unknown tool")));
    assert!(events.iter().any(|e| matches!(
        e,
        GuardEvent::Complete { final_email, .. } if final_email == "kept"
    )));
}

#[tokio::test]
async fn test_prose_response_finalizes_immediately() {
    let mock = Arc::new(MockLlmClient::scripted(["Sure! The email looks fine."]));
    let report = review(&components_with(mock, 5), "goal", "Hello there").await;

    assert_eq!(report.total_iterations, 1);
    assert_eq!(report.iterations[0].action_type, "final");
    assert!(report.final_email.starts_with("ERROR: Model returned non-JSON:"));
    assert!(report.final_email.contains("Sure! The email looks fine."));
}

#[tokio::test]
async fn test_session_completes_without_listener() {
    let mock = Arc::new(MockLlmClient::scripted(vec![
        tool("get_policy", json!({"category": "legal"})),
        json!({"type": "final", "thought_summary": "ok"}).to_string(),
    ]));
    let rx = review_stream(
        Arc::new(components_with(mock.clone(), 5)),
        "goal".into(),
        "draft".into(),
    );
    drop(rx);

    tokio::time::timeout(Duration::from_secs(5), async {
        while mock.call_count() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session keeps running after the receiver is dropped");
}
