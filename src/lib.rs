//! MailGuard - 出站邮件合规守卫
//!
//! 模块划分：
//! - **agent**: 无头运行时（同步汇总 review / 流式 review_stream）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 消息与只追加的会话历史
//! - **react**: 动作解析、Prompt 组装、有界编排循环、过程事件
//! - **tools**: 合规检查、政策查询、PII 脱敏与工具注册表

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use agent::{review, review_stream, GuardComponents, SyncReport};
pub use react::{GuardEvent, Orchestrator, Session};
