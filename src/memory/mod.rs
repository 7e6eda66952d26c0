//! 记忆层：会话历史（只追加）与发给 LLM 的消息格式

pub mod conversation;
pub mod history;

pub use conversation::{Message, Role};
pub use history::{HistoryLog, Turn, TurnRole};
