//! 动作 JSON Schema 生成（schemars）
//!
//! 将三种合法动作的 JSON 结构注入 system prompt，减少 LLM 输出格式错误。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};

/// LLM 每轮只能输出下面三种动作之一（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ActionFormat {
    /// 调用工具
    Tool {
        /// 一句话说明原因
        thought_summary: String,
        /// check_compliance / get_policy / redact_pii
        name: String,
        /// 工具参数，如 {"email_text": "..."}、{"category": "pii"}、{"text": "..."}
        input: HashMap<String, String>,
    },
    /// 提出改写后的完整邮件
    Rewrite {
        thought_summary: String,
        /// 完整的改写后邮件正文
        email: String,
    },
    /// 结束并给出最终邮件
    Final {
        thought_summary: String,
        /// 最终通过的邮件
        answer: String,
    },
}

/// 返回动作的 JSON Schema 字符串，可拼入 system prompt
pub fn action_schema_json() -> String {
    let schema = schema_for!(ActionFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
