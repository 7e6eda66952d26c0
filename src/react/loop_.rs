//! 编排主循环（有界状态机）
//!
//! DECIDE -> {EXECUTE_TOOL, APPLY_REWRITE, FINALIZE}；EXECUTE_TOOL / APPLY_REWRITE 回到 DECIDE，FINALIZE 终止。
//! 每次状态迁移产出一个 Transition，交给观察者（事件翻译器、同步汇总等）；观察者不影响控制流。
//! 达到迭代上限时不再调用 LLM，直接以当前草稿合成 final。

use std::sync::Arc;

use serde_json::Value;

use crate::core::GuardError;
use crate::llm::LlmClient;
use crate::memory::{HistoryLog, TurnRole};
use crate::react::action::{parse_action, Action, ParseFailure};
use crate::react::prompt::{build_system_prompt, compose_messages};
use crate::tools::{ToolError, ToolKind, ToolOutput, ToolRegistry};

/// 单次会话内最大 DECIDE 轮数，防止死循环
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// 编排参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardSettings {
    pub max_iterations: usize,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// 状态机当前所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Decide,
    ExecuteTool,
    ApplyRewrite,
    Finalize,
    Done,
}

impl Phase {
    fn route(action: &Action) -> Self {
        match action {
            Action::Tool { .. } => Phase::ExecuteTool,
            Action::Rewrite { .. } => Phase::ApplyRewrite,
            Action::Final { .. } => Phase::Finalize,
        }
    }
}

/// 一次文档修订会话：草稿、历史、计数器都归会话独占
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    goal: String,
    draft: String,
    history: HistoryLog,
    iteration: usize,
    action: Option<Action>,
    final_answer: Option<String>,
    phase: Phase,
}

impl Session {
    pub fn new(goal: impl Into<String>, draft: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            goal: goal.into(),
            draft: draft.into(),
            history: HistoryLog::new(),
            iteration: 0,
            action: None,
            final_answer: None,
            phase: Phase::Decide,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// 最近一次解析出的动作（每轮覆盖）
    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_final(&self) -> bool {
        self.final_answer.is_some()
    }
}

/// 状态迁移记录（供事件翻译与同步汇总使用）
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// DECIDE 完成：LLM 给出（或上限合成）一个动作
    Decided {
        iteration: usize,
        action: Action,
        failure: Option<ParseFailure>,
        ceiling_reached: bool,
    },
    /// EXECUTE_TOOL 完成；result 为写入历史的结果文本（不含 "<name> returned:" 前缀）
    ToolExecuted {
        iteration: usize,
        tool: String,
        input: Value,
        result: String,
        is_error: bool,
        draft_updated: bool,
    },
    /// APPLY_REWRITE 完成
    Rewritten {
        iteration: usize,
        thought_summary: String,
        draft: String,
    },
    /// FINALIZE 完成（终态）
    Finalized { iteration: usize, answer: String },
}

/// 编排器：持有 Oracle、工具注册表与参数，可服务多个互不相干的会话
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    settings: GuardSettings,
    system_prompt: String,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, tools: ToolRegistry, settings: GuardSettings) -> Self {
        let system_prompt = build_system_prompt(&tools, settings.max_iterations);
        Self {
            llm,
            tools,
            settings,
            system_prompt,
        }
    }

    /// 跑完整个循环直到 FINALIZE；每次迁移后回调 observe 并让出一次调度
    pub async fn run<F>(&self, session: &mut Session, mut observe: F) -> Result<String, GuardError>
    where
        F: FnMut(&Transition),
    {
        tracing::info!(session = %session.id, max_iterations = self.settings.max_iterations, "session started");
        while let Some(transition) = self.step(session).await? {
            observe(&transition);
            tokio::task::yield_now().await;
        }
        Ok(session.final_answer.clone().unwrap_or_default())
    }

    /// 执行一次状态迁移；会话已终止时返回 None
    pub async fn step(&self, session: &mut Session) -> Result<Option<Transition>, GuardError> {
        let transition = match session.phase {
            Phase::Done => return Ok(None),
            Phase::Decide => self.decide(session).await?,
            Phase::ExecuteTool => match session.action.clone() {
                Some(Action::Tool { name, input, .. }) => self.execute_tool(session, name, input),
                _ => self.finalize(session),
            },
            Phase::ApplyRewrite => match session.action.clone() {
                Some(Action::Rewrite {
                    thought_summary,
                    email,
                }) => self.apply_rewrite(session, thought_summary, email),
                _ => self.finalize(session),
            },
            Phase::Finalize => self.finalize(session),
        };
        Ok(Some(transition))
    }

    async fn decide(&self, session: &mut Session) -> Result<Transition, GuardError> {
        let max = self.settings.max_iterations;
        if session.iteration >= max {
            tracing::warn!(session = %session.id, iteration = session.iteration, "iteration ceiling reached");
            let action = Action::Final {
                thought_summary: format!(
                    "Reached maximum iterations ({max}). Returning best effort."
                ),
                answer: Some(session.draft.clone()),
            };
            session.phase = Phase::Finalize;
            session.action = Some(action.clone());
            return Ok(Transition::Decided {
                iteration: session.iteration,
                action,
                failure: None,
                ceiling_reached: true,
            });
        }

        let messages = compose_messages(
            &self.system_prompt,
            &session.goal,
            &session.draft,
            &session.history,
            session.iteration,
            max,
        );
        let raw = self.llm.complete(&messages).await?;
        let decision = parse_action(&raw);
        session.iteration += 1;

        let (prompt_tokens, completion_tokens, total_tokens) = self.llm.token_usage();
        tracing::debug!(prompt_tokens, completion_tokens, total_tokens, "cumulative token usage");

        if let Some(failure) = &decision.failure {
            tracing::warn!(session = %session.id, iteration = session.iteration, ?failure, "unusable model output, finalizing");
        }
        tracing::info!(
            session = %session.id,
            iteration = session.iteration,
            action = decision.action.action_type(),
            tool = decision.action.tool_name().unwrap_or(""),
            "decided"
        );

        session.phase = Phase::route(&decision.action);
        session.action = Some(decision.action.clone());
        Ok(Transition::Decided {
            iteration: session.iteration,
            action: decision.action,
            failure: decision.failure,
            ceiling_reached: false,
        })
    }

    fn execute_tool(&self, session: &mut Session, name: String, input: Value) -> Transition {
        let (result, is_error, output) = match self.tools.execute(&name, &input) {
            Ok(out) => (out.render(), false, Some(out)),
            Err(e @ ToolError::Unknown { .. }) => (format!("ERROR: {e}"), true, None),
            Err(e) => (format!("ERROR: tool crashed: {e}"), true, None),
        };

        // 只有脱敏工具的结果会回写草稿
        let mut draft_updated = false;
        if ToolKind::from_name(&name) == Some(ToolKind::RedactPii) {
            if let Some(ToolOutput::Json(v)) = &output {
                if let Some(text) = v.get("redacted_text").and_then(Value::as_str) {
                    session.draft = text.to_string();
                    draft_updated = true;
                }
            }
        }

        let issued = session
            .action
            .as_ref()
            .and_then(|a| serde_json::to_string(a).ok())
            .unwrap_or_default();
        session.history.append(TurnRole::Assistant, issued);
        session
            .history
            .append(TurnRole::Tool, format!("{name} returned:\n{result}"));
        session.phase = Phase::Decide;

        Transition::ToolExecuted {
            iteration: session.iteration,
            tool: name,
            input,
            result,
            is_error,
            draft_updated,
        }
    }

    fn apply_rewrite(
        &self,
        session: &mut Session,
        thought_summary: String,
        email: Option<String>,
    ) -> Transition {
        if let Some(email) = email {
            session.draft = email;
        }
        session.history.append(
            TurnRole::Assistant,
            format!(
                "REWRITE: {thought_summary}\n\nProposed new version:\n{}",
                session.draft
            ),
        );
        session.phase = Phase::Decide;

        Transition::Rewritten {
            iteration: session.iteration,
            thought_summary,
            draft: session.draft.clone(),
        }
    }

    fn finalize(&self, session: &mut Session) -> Transition {
        let (thought, answer) = match &session.action {
            Some(Action::Final {
                thought_summary,
                answer,
            }) => (thought_summary.clone(), answer.clone()),
            Some(other) => (other.thought_summary().to_string(), None),
            None => (String::new(), None),
        };
        let answer = answer.unwrap_or_else(|| session.draft.clone());

        session
            .history
            .append(TurnRole::Assistant, format!("FINAL: {thought}\n\n{answer}"));
        session.final_answer = Some(answer.clone());
        session.phase = Phase::Done;
        tracing::info!(session = %session.id, iteration = session.iteration, "session finalized");

        Transition::Finalized {
            iteration: session.iteration,
            answer,
        }
    }
}
