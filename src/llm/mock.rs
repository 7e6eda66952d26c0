//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预置的回复；脚本耗尽后返回一个不带 answer 的 final 动作，让循环以当前草稿收尾。
//! 每次调用收到的完整消息列表都会记录下来，便于断言回放内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;

/// 脚本耗尽时的默认回复
const EXHAUSTED_RESPONSE: &str =
    r#"{"type": "final", "thought_summary": "Mock oracle has no scripted responses left."}"#;

/// Mock 客户端：预置回复队列 + 调用记录
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以一组文本回复构造
    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let script = responses.into_iter().map(|r| Ok(r.into())).collect();
        Self {
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 追加一次调用失败
    pub fn push_error(&self, err: LlmError) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(err));
        }
    }

    /// 已被调用的次数
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// 每次调用收到的消息列表
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let next = self
            .script
            .lock()
            .map_err(|e| LlmError::ApiError(format!("mock script poisoned: {e}")))?
            .pop_front();
        next.unwrap_or_else(|| Ok(EXHAUSTED_RESPONSE.to_string()))
    }
}
