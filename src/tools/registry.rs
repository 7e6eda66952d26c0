//! 工具注册表
//!
//! 工具集合是封闭的（ToolKind），注册表按名称查找对应处理器。
//! 未知名称、参数错误、工具 panic 都映射为 ToolError，由编排器转成错误文本写回历史，不会中断循环。

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use thiserror::Error;

/// 已知工具种类
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolKind {
    CheckCompliance,
    GetPolicy,
    RedactPii,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [
        ToolKind::CheckCompliance,
        ToolKind::GetPolicy,
        ToolKind::RedactPii,
    ];

    /// 工具名称（即 LLM 输出 JSON 中的 "name" 字段）
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::CheckCompliance => "check_compliance",
            ToolKind::GetPolicy => "get_policy",
            ToolKind::RedactPii => "redact_pii",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 工具结果：结构化 JSON 或纯文本（如 Markdown 政策文档）
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Json(Value),
    Text(String),
}

impl ToolOutput {
    /// 写入历史的文本形式（JSON 缩进输出）
    pub fn render(&self) -> String {
        match self {
            ToolOutput::Json(v) => {
                serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
            }
            ToolOutput::Text(s) => s.clone(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool '{name}'. Available tools: [{}]", available.join(", "))]
    Unknown { name: String, available: Vec<String> },

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Failed(String),

    #[error("tool panicked: {0}")]
    Panicked(String),
}

/// 工具 trait：纯函数、同步执行（args 为 JSON 对象）
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    fn execute(&self, args: &Value) -> Result<ToolOutput, ToolError>;
}

/// 从参数对象中取必填的字符串字段
pub fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key).and_then(Value::as_str).ok_or_else(|| {
        ToolError::InvalidArgs(format!("missing required string argument '{key}'"))
    })
}

/// 工具注册表：ToolKind -> Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<ToolKind, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.kind(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        ToolKind::from_name(name).and_then(|k| self.tools.get(&k).cloned())
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().map(|k| k.name().to_string()).collect()
    }

    /// 返回 (name, description) 列表，用于生成 prompt 中的 Available tools 段落
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.tools
            .iter()
            .map(|(kind, tool)| (kind.name().to_string(), tool.description().to_string()))
            .collect()
    }

    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|(kind, tool)| {
                serde_json::json!({
                    "name": kind.name(),
                    "description": tool.description(),
                    "parameters": tool.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }

    /// 按名称执行工具；每次调用输出结构化审计日志（JSON）
    pub fn execute(&self, name: &str, args: &Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let result = match self.get(name) {
            None => Err(ToolError::Unknown {
                name: name.to_string(),
                available: self.tool_names(),
            }),
            Some(tool) => catch_unwind(AssertUnwindSafe(|| tool.execute(args)))
                .unwrap_or_else(|panic| Err(ToolError::Panicked(panic_message(panic.as_ref())))),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ToolError::Unknown { .. }) => "unknown",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(args),
        });
        tracing::info!(audit = %audit, "tool");

        result
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Boom;

    impl Tool for Boom {
        fn kind(&self) -> ToolKind {
            ToolKind::GetPolicy
        }

        fn description(&self) -> &str {
            "always panics"
        }

        fn execute(&self, _args: &Value) -> Result<ToolOutput, ToolError> {
            panic!("kaboom")
        }
    }

    struct Upper;

    impl Tool for Upper {
        fn kind(&self) -> ToolKind {
            ToolKind::CheckCompliance
        }

        fn description(&self) -> &str {
            "uppercases email_text"
        }

        fn execute(&self, args: &Value) -> Result<ToolOutput, ToolError> {
            let text = required_str(args, "email_text")?;
            Ok(ToolOutput::Text(text.to_uppercase()))
        }
    }

    #[test]
    fn test_kind_name_roundtrip() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ToolKind::from_name("erase_everything"), None);
    }

    #[test]
    fn test_unknown_tool_lists_available() {
        let mut registry = ToolRegistry::new();
        registry.register(Upper);
        let err = registry
            .execute("erase_everything", &serde_json::json!({}))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("erase_everything"));
        assert!(msg.contains("check_compliance"));
    }

    #[test]
    fn test_known_but_unregistered_is_unknown() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("redact_pii", &serde_json::json!({"text": "x"}))
            .unwrap_err();
        assert!(matches!(err, ToolError::Unknown { .. }));
    }

    #[test]
    fn test_panic_is_caught() {
        let mut registry = ToolRegistry::new();
        registry.register(Boom);
        let err = registry
            .execute("get_policy", &serde_json::json!({}))
            .unwrap_err();
        assert_eq!(err, ToolError::Panicked("kaboom".to_string()));
    }

    #[test]
    fn test_missing_argument() {
        let mut registry = ToolRegistry::new();
        registry.register(Upper);
        let err = registry
            .execute("check_compliance", &serde_json::json!({"text": "hi"}))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));

        let ok = registry
            .execute("check_compliance", &serde_json::json!({"email_text": "hi"}))
            .unwrap();
        assert_eq!(ok.render(), "HI");
    }

    #[test]
    fn test_render_json_is_pretty() {
        let out = ToolOutput::Json(serde_json::json!({"pass": true}));
        assert_eq!(out.render(), "{\n  \"pass\": true\n}");
    }
}
