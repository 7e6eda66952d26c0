//! 决策层：动作解析、Prompt 组装、有界编排循环与过程事件

pub mod action;
pub mod events;
pub mod loop_;
pub mod prompt;

pub use action::{parse_action, strip_code_fence, Action, Decision, ParseFailure};
pub use events::{feedback_hint, preview, EventTranslator, GuardEvent, IssueCard, Progress};
pub use loop_::{
    GuardSettings, Orchestrator, Phase, Session, Transition, DEFAULT_MAX_ITERATIONS,
};
pub use prompt::{build_system_prompt, compose_messages};
