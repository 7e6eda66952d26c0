//! ActionParser：把 LLM 原始输出解析为三种动作之一
//!
//! 去掉一层 ``` 围栏后严格按 JSON 解析；解析失败、非对象、未知 type 都降级为 final，
//! 保证循环总能走向终止。不校验工具 input 的形状（由 ToolRegistry 在执行时负责）。

use serde::Serialize;
use serde_json::{Map, Value};

/// 解析后的动作（序列化结果即写回历史的 "action-as-issued" 记录）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Tool {
        thought_summary: String,
        name: String,
        input: Value,
    },
    Rewrite {
        thought_summary: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
    Final {
        thought_summary: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        answer: Option<String>,
    },
}

impl Action {
    pub fn thought_summary(&self) -> &str {
        match self {
            Action::Tool { thought_summary, .. }
            | Action::Rewrite { thought_summary, .. }
            | Action::Final { thought_summary, .. } => thought_summary,
        }
    }

    /// "tool" / "rewrite" / "final"
    pub fn action_type(&self) -> &'static str {
        match self {
            Action::Tool { .. } => "tool",
            Action::Rewrite { .. } => "rewrite",
            Action::Final { .. } => "final",
        }
    }

    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Action::Tool { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// 解析降级原因；降级后的动作一律是 final
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// 不是合法 JSON
    NotJson(String),
    /// 是 JSON 但不是对象
    NotAnObject,
    /// type 缺失或不是 tool / rewrite / final
    UnknownType(Option<String>),
}

/// 一次解析的结果：动作 + 可选的降级原因
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: Action,
    pub failure: Option<ParseFailure>,
}

/// 去掉一层 Markdown 代码围栏（首行以 ``` 开头；末行恰为 ``` 时一并去掉）
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let Some((_, body)) = trimmed.split_once('\n') else {
        return "";
    };
    match body.rsplit_once('\n') {
        Some((inner, last)) if last.trim() == "```" => inner,
        None if body.trim() == "```" => "",
        _ => body,
    }
}

/// 解析 LLM 输出；永不失败
pub fn parse_action(raw: &str) -> Decision {
    let body = strip_code_fence(raw);
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            return Decision {
                action: Action::Final {
                    thought_summary: "Model returned invalid JSON; stopping.".to_string(),
                    answer: Some(format!("ERROR: Model returned non-JSON:\n{raw}")),
                },
                failure: Some(ParseFailure::NotJson(e.to_string())),
            };
        }
    };

    let Value::Object(obj) = value else {
        return Decision {
            action: Action::Final {
                thought_summary: "Model returned JSON that is not an object; stopping."
                    .to_string(),
                answer: None,
            },
            failure: Some(ParseFailure::NotAnObject),
        };
    };

    let thought_summary = str_field(&obj, "thought_summary").unwrap_or_default();
    match obj.get("type").and_then(Value::as_str) {
        Some("tool") => Decision {
            action: Action::Tool {
                thought_summary,
                name: str_field(&obj, "name").unwrap_or_default(),
                input: match obj.get("input") {
                    None | Some(Value::Null) => Value::Object(Map::new()),
                    Some(v) => v.clone(),
                },
            },
            failure: None,
        },
        Some("rewrite") => Decision {
            action: Action::Rewrite {
                thought_summary,
                email: str_field(&obj, "email"),
            },
            failure: None,
        },
        Some("final") => Decision {
            action: Action::Final {
                thought_summary,
                answer: str_field(&obj, "answer"),
            },
            failure: None,
        },
        other => Decision {
            // 未知 type 走向终止；若恰好带了 answer 仍然采用
            action: Action::Final {
                thought_summary,
                answer: str_field(&obj, "answer"),
            },
            failure: Some(ParseFailure::UnknownType(other.map(str::to_string))),
        },
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}
