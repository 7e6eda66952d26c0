//! 编排错误类型
//!
//! 解析失败、工具失败、达到迭代上限都在循环内部以带内方式表示；能逃出循环的只有 Oracle 调用失败。

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum GuardError {
    /// Oracle 调用本身失败（网络、鉴权、空响应）
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}
