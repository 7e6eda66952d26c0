//! 过程事件：把编排器的状态迁移投影为可序列化的事件流（SSE / CLI 展示）
//!
//! 翻译器只观察 Transition，不接触会话状态。工具结果按结构识别：
//! 带 `pass` 的 JSON 视为合规报告，带 `redacted_text` 的 JSON 视为脱敏结果，
//! 带 `# ` 标题的纯文本视为政策文档，其余一律降级为 tool_result 预览。

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::react::action::Action;
use crate::react::loop_::Transition;
use crate::tools::{policy_title, IssueCategory, ToolKind};

const RESULT_PREVIEW_CHARS: usize = 300;
const POLICY_PREVIEW_CHARS: usize = 400;
const REDACTION_PREVIEW_CHARS: usize = 200;
const REWRITE_PREVIEW_CHARS: usize = 300;

/// 两种进度：`iteration` 为合规检查轮次（未检查前为 1），`oracle_turn` 为 LLM 决策次数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub iteration: usize,
    pub oracle_turn: usize,
}

/// 前端展示用的问题卡片
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueCard {
    #[serde(rename = "type")]
    pub kind: String,
    /// critical（critical/high）或 warning
    pub severity: String,
    pub title: String,
    pub description: String,
    pub category: String,
}

/// 单个过程事件（序列化为 `{"type": "...", ...}`）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuardEvent {
    Start {
        goal: String,
    },
    /// 新一轮合规检查开始
    IterationStart {
        #[serde(flatten)]
        progress: Progress,
    },
    Thinking {
        #[serde(flatten)]
        progress: Progress,
        thought: String,
    },
    ToolSelected {
        #[serde(flatten)]
        progress: Progress,
        tool_name: String,
        tool_input: Value,
    },
    ToolExecuting {
        #[serde(flatten)]
        progress: Progress,
        tool_name: String,
    },
    /// 无法识别结构的工具结果（预览）
    ToolResult {
        #[serde(flatten)]
        progress: Progress,
        tool_name: String,
        result: String,
    },
    PolicyLoaded {
        #[serde(flatten)]
        progress: Progress,
        category: Option<String>,
        title: Option<String>,
        preview: String,
    },
    ComplianceCheckStarted {
        #[serde(flatten)]
        progress: Progress,
    },
    IssuesFound {
        #[serde(flatten)]
        progress: Progress,
        total_count: usize,
    },
    Issue {
        #[serde(flatten)]
        progress: Progress,
        issue: IssueCard,
        index: usize,
        total: usize,
    },
    ComplianceResult {
        #[serde(flatten)]
        progress: Progress,
        pass: bool,
        issues_count: usize,
        summary: String,
    },
    /// 按未通过类别给出的修改建议
    Feedback {
        #[serde(flatten)]
        progress: Progress,
        categories: Vec<String>,
        text: String,
    },
    RedactionStarted {
        #[serde(flatten)]
        progress: Progress,
    },
    RedactionItem {
        #[serde(flatten)]
        progress: Progress,
        item: String,
        index: usize,
        total: usize,
    },
    RedactionComplete {
        #[serde(flatten)]
        progress: Progress,
        count: usize,
        redacted_text: String,
    },
    Rewriting {
        #[serde(flatten)]
        progress: Progress,
    },
    RewriteComplete {
        #[serde(flatten)]
        progress: Progress,
        preview: String,
        full_text: String,
    },
    Finalizing {
        #[serde(flatten)]
        progress: Progress,
    },
    FinalCheck {
        #[serde(flatten)]
        progress: Progress,
    },
    Complete {
        #[serde(flatten)]
        progress: Progress,
        final_email: String,
    },
    Error {
        message: String,
    },
    /// 流结束（总是最后一个）
    Done,
}

impl GuardEvent {
    /// 事件类型名（与序列化后的 `type` 一致）
    pub fn kind(&self) -> &'static str {
        match self {
            GuardEvent::Start { .. } => "start",
            GuardEvent::IterationStart { .. } => "iteration_start",
            GuardEvent::Thinking { .. } => "thinking",
            GuardEvent::ToolSelected { .. } => "tool_selected",
            GuardEvent::ToolExecuting { .. } => "tool_executing",
            GuardEvent::ToolResult { .. } => "tool_result",
            GuardEvent::PolicyLoaded { .. } => "policy_loaded",
            GuardEvent::ComplianceCheckStarted { .. } => "compliance_check_started",
            GuardEvent::IssuesFound { .. } => "issues_found",
            GuardEvent::Issue { .. } => "issue",
            GuardEvent::ComplianceResult { .. } => "compliance_result",
            GuardEvent::Feedback { .. } => "feedback",
            GuardEvent::RedactionStarted { .. } => "redaction_started",
            GuardEvent::RedactionItem { .. } => "redaction_item",
            GuardEvent::RedactionComplete { .. } => "redaction_complete",
            GuardEvent::Rewriting { .. } => "rewriting",
            GuardEvent::RewriteComplete { .. } => "rewrite_complete",
            GuardEvent::Finalizing { .. } => "finalizing",
            GuardEvent::FinalCheck { .. } => "final_check",
            GuardEvent::Complete { .. } => "complete",
            GuardEvent::Error { .. } => "error",
            GuardEvent::Done => "done",
        }
    }
}

/// 未通过类别对应的修改建议
pub fn feedback_hint(category: IssueCategory) -> &'static str {
    match category {
        IssueCategory::Pii => {
            "Remove/redact any third-party PII (emails, phones, SSNs, account numbers)."
        }
        IssueCategory::Marketing => {
            "Add clear unsubscribe instructions and avoid pressure tactics or misleading urgency."
        }
        IssueCategory::Legal => {
            "Soften absolute claims/guarantees and add appropriate disclaimers for advice."
        }
        IssueCategory::Confidentiality => {
            "Remove internal-only markers and references to internal tools/projects."
        }
    }
}

/// Transition -> 事件序列；每个会话一个实例，自行维护两个计数器
#[derive(Debug, Default)]
pub struct EventTranslator {
    compliance_cycles: usize,
    oracle_turn: usize,
}

impl EventTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(goal: &str) -> GuardEvent {
        GuardEvent::Start {
            goal: goal.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> GuardEvent {
        GuardEvent::Error {
            message: message.into(),
        }
    }

    pub fn done() -> GuardEvent {
        GuardEvent::Done
    }

    /// 已开始的合规检查轮数
    pub fn compliance_cycles(&self) -> usize {
        self.compliance_cycles
    }

    fn progress(&self) -> Progress {
        Progress {
            iteration: self.compliance_cycles.max(1),
            oracle_turn: self.oracle_turn,
        }
    }

    pub fn translate(&mut self, transition: &Transition) -> Vec<GuardEvent> {
        match transition {
            Transition::Decided {
                iteration, action, ..
            } => self.on_decided(*iteration, action),
            Transition::ToolExecuted {
                iteration,
                tool,
                input,
                result,
                ..
            } => {
                self.oracle_turn = *iteration;
                let mut events = vec![GuardEvent::ToolExecuting {
                    progress: self.progress(),
                    tool_name: tool.clone(),
                }];
                events.extend(self.on_tool_result(tool, input, result));
                events
            }
            Transition::Rewritten {
                iteration, draft, ..
            } => {
                self.oracle_turn = *iteration;
                vec![
                    GuardEvent::Rewriting {
                        progress: self.progress(),
                    },
                    GuardEvent::RewriteComplete {
                        progress: self.progress(),
                        preview: preview(draft, REWRITE_PREVIEW_CHARS),
                        full_text: draft.clone(),
                    },
                ]
            }
            Transition::Finalized { iteration, answer } => {
                self.oracle_turn = *iteration;
                vec![
                    GuardEvent::FinalCheck {
                        progress: self.progress(),
                    },
                    GuardEvent::Complete {
                        progress: self.progress(),
                        final_email: answer.clone(),
                    },
                ]
            }
        }
    }

    fn on_decided(&mut self, iteration: usize, action: &Action) -> Vec<GuardEvent> {
        self.oracle_turn = iteration;
        let mut events = Vec::with_capacity(3);

        if action.tool_name() == Some(ToolKind::CheckCompliance.name()) {
            self.compliance_cycles += 1;
            events.push(GuardEvent::IterationStart {
                progress: self.progress(),
            });
        }
        events.push(GuardEvent::Thinking {
            progress: self.progress(),
            thought: action.thought_summary().to_string(),
        });
        match action {
            Action::Tool { name, input, .. } => events.push(GuardEvent::ToolSelected {
                progress: self.progress(),
                tool_name: name.clone(),
                tool_input: input.clone(),
            }),
            Action::Rewrite { .. } => {}
            Action::Final { .. } => events.push(GuardEvent::Finalizing {
                progress: self.progress(),
            }),
        }
        events
    }

    fn on_tool_result(&self, tool: &str, input: &Value, result: &str) -> Vec<GuardEvent> {
        if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(result) {
            if obj.contains_key("pass") {
                return self.compliance_events(&obj);
            }
            if obj.contains_key("redacted_text") {
                return self.redaction_events(&obj);
            }
        } else if !result.starts_with("ERROR") {
            if let Some(title) = policy_title(result) {
                return vec![GuardEvent::PolicyLoaded {
                    progress: self.progress(),
                    category: input
                        .get("category")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    title: Some(title.to_string()),
                    preview: preview(result, POLICY_PREVIEW_CHARS),
                }];
            }
        }

        vec![GuardEvent::ToolResult {
            progress: self.progress(),
            tool_name: tool.to_string(),
            result: preview(result, RESULT_PREVIEW_CHARS),
        }]
    }

    fn compliance_events(&self, report: &Map<String, Value>) -> Vec<GuardEvent> {
        let progress = self.progress();
        let issues = report
            .get("issues")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let passed = report.get("pass").and_then(Value::as_bool).unwrap_or(false);
        let total = issues.len();

        let mut events = vec![GuardEvent::ComplianceCheckStarted { progress }];
        if total > 0 {
            events.push(GuardEvent::IssuesFound {
                progress,
                total_count: total,
            });
        }
        for (index, issue) in issues.iter().enumerate() {
            let Some(issue) = issue.as_object() else {
                continue;
            };
            events.push(GuardEvent::Issue {
                progress,
                issue: issue_card(issue),
                index,
                total,
            });
        }
        events.push(GuardEvent::ComplianceResult {
            progress,
            pass: passed,
            issues_count: total,
            summary: report
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });

        if !passed && total > 0 {
            let categories: BTreeSet<String> = issues
                .iter()
                .filter_map(|i| i.get("type").and_then(Value::as_str))
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            let hints: Vec<&str> = categories
                .iter()
                .filter_map(|c| IssueCategory::parse(c))
                .map(feedback_hint)
                .collect();
            if !hints.is_empty() {
                events.push(GuardEvent::Feedback {
                    progress,
                    categories: categories.into_iter().collect(),
                    text: hints.join(" "),
                });
            }
        }
        events
    }

    fn redaction_events(&self, report: &Map<String, Value>) -> Vec<GuardEvent> {
        let progress = self.progress();
        let items: Vec<String> = report
            .get("redactions_made")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let total = items.len();

        let mut events = vec![GuardEvent::RedactionStarted { progress }];
        events.extend(
            items
                .into_iter()
                .enumerate()
                .map(|(index, item)| GuardEvent::RedactionItem {
                    progress,
                    item,
                    index,
                    total,
                }),
        );
        events.push(GuardEvent::RedactionComplete {
            progress,
            count: total,
            redacted_text: preview(
                report
                    .get("redacted_text")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
                REDACTION_PREVIEW_CHARS,
            ),
        });
        events
    }
}

fn issue_card(issue: &Map<String, Value>) -> IssueCard {
    let kind = issue
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let severity = match issue.get("severity").and_then(Value::as_str) {
        Some("critical") | Some("high") => "critical",
        _ => "warning",
    };
    IssueCard {
        title: format!("{} Issue", kind.to_uppercase()),
        severity: severity.to_string(),
        description: issue
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        category: kind.clone(),
        kind,
    }
}

/// 按字符截断（不会切断 UTF-8）
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
