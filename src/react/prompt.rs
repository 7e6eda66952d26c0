//! Prompt 组装：固定 system 指令 + 历史回放 + 当前草稿
//!
//! 每轮 DECIDE 产出的消息列表为：1 条 system、每条历史 1 条、末尾 1 条任务/草稿。

use crate::memory::{HistoryLog, Message, TurnRole};
use crate::tools::{action_schema_json, ToolRegistry};

/// 生成 system 指令（工具描述与动作 Schema 来自注册表与 schemars）
pub fn build_system_prompt(registry: &ToolRegistry, max_iterations: usize) -> String {
    let tool_list = registry
        .tool_descriptions()
        .iter()
        .enumerate()
        .map(|(i, (name, desc))| format!("{}. {}\n   - {}", i + 1, name, desc))
        .collect::<Vec<_>>()
        .join("\n\n");
    let tool_params = registry.to_schema_json();
    let action_schema = action_schema_json();

    format!(
        r#"You are the Outbound Email Guard, a compliance agent that reviews emails before they are sent externally.

Your job:
1. Check the email for compliance issues using the check_compliance tool
2. If issues are found, fetch the relevant policy to understand how to fix them
3. Rewrite the email to fix the issues
4. Use redact_pii if PII needs to be removed
5. Re-check the rewritten email
6. Repeat until the email passes OR you've tried {max_iterations} times

Available tools:

{tool_list}

Tool parameters:
{tool_params}

You MUST return ONLY valid JSON with one of these schemas:

1) Use a tool:
{{"type": "tool", "thought_summary": "one short sentence about why", "name": "<tool_name>", "input": {{"<param>": "<value>"}}}}

2) Propose a rewritten version of the email (use this when you need to fix issues):
{{"type": "rewrite", "thought_summary": "one short sentence about what you're fixing", "email": "<the complete rewritten email text>"}}

3) Finalize and approve the email (use when email passes compliance):
{{"type": "final", "thought_summary": "one short sentence summarizing the outcome", "answer": "<the final approved email>"}}

JSON Schema of a valid response:
{action_schema}

Rules:
- ALWAYS start by checking compliance on the original email
- Fetch relevant policies BEFORE attempting to rewrite
- Use "rewrite" type to propose a fixed version, then re-check compliance
- When rewriting, preserve the email's intent while fixing ALL identified issues
- Use "final" type ONLY when compliance check passes
- If the email is already compliant, return it unchanged with "final" type
- Keep JSON strictly valid (no extra text outside the JSON)

IMPORTANT - What to preserve vs. remove:
- KEEP the recipient's name in greetings (e.g., "Dear Mr. John Smith" - this is who you're writing TO)
- REMOVE/REDACT other people's PII mentioned in the body (e.g., "Account holder: Mr. James Wilson")
- REMOVE confidentiality markers like "INTERNAL ONLY", "CONFIDENTIAL"
- REMOVE internal system references (Jira, Confluence, Slack channels, project codenames)
- ADD unsubscribe link for marketing/promotional emails
- SOFTEN guarantee language ("guaranteed" -> "we aim to")
- ADD appropriate disclaimers for financial/legal advice
"#
    )
}

/// 拼出本轮发给 LLM 的完整消息列表
pub fn compose_messages(
    system_prompt: &str,
    goal: &str,
    draft: &str,
    history: &HistoryLog,
    iteration: usize,
    max_iterations: usize,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system_prompt));

    for turn in history.turns() {
        let content = match turn.role {
            TurnRole::User => turn.content.clone(),
            TurnRole::Assistant => format!("(previous action): {}", turn.content),
            TurnRole::Tool => format!("TOOL_RESULT:\n{}", turn.content),
        };
        messages.push(Message::user(content));
    }

    let marker = if iteration > 0 {
        format!("[Iteration {iteration}/{max_iterations}]\n")
    } else {
        String::new()
    };
    messages.push(Message::user(format!(
        "{marker}TASK: {goal}\n\nCURRENT EMAIL DRAFT:\n---\n{draft}\n---\n\nAnalyze this email and take the next appropriate action."
    )));
    messages
}
