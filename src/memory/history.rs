//! 会话历史：只追加的 Turn 序列
//!
//! 每轮 DECIDE 把整段历史回放给 LLM；不剪枝、不改写、不重排。

use serde::{Deserialize, Serialize};

/// Turn 的角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    Tool,
}

/// 历史中的一条记录
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

/// 只追加的历史日志；只暴露 append 与只读访问
#[derive(Clone, Debug, Default)]
pub struct HistoryLog {
    turns: Vec<Turn>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, role: TurnRole, content: impl Into<String>) {
        self.turns.push(Turn {
            role,
            content: content.into(),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
