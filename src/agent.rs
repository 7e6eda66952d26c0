//! Headless 审查运行时
//!
//! 供 CLI 与 HTTP 前端调用：
//! create_guard_components 从配置构建 LLM / 工具注册表 / 编排器，
//! review 同步跑完一次会话并汇总，review_stream 在后台任务中跑会话并通过无界通道推送事件。
//! 两者共用 Orchestrator::run，事件流只是观察者，不改变会话轨迹。

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::core::GuardError;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::react::{Action, EventTranslator, GuardEvent, Orchestrator, Session, Transition};
use crate::tools::{default_registry, ComplianceChecker, PolicyStore, Redactor};

/// 预构建的组件，可被多个会话共享（会话状态各自独立）
pub struct GuardComponents {
    pub orchestrator: Orchestrator,
    /// 同步汇总里的最终复检、以及 HTTP 直连接口使用
    pub checker: ComplianceChecker,
    pub redactor: Redactor,
    pub policies: PolicyStore,
}

/// 按配置选择 LLM：provider = mock 或缺少 API Key 时使用 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "mock" {
        tracing::info!("Using Mock LLM (provider = mock)");
        return Arc::new(MockLlmClient::new());
    }
    match cfg.llm.resolve_api_key() {
        Some(key) => {
            tracing::info!("Using OpenAI-compatible LLM ({} @ {})", cfg.llm.model, cfg.llm.base_url);
            Arc::new(OpenAiClient::new(
                Some(&cfg.llm.base_url),
                &cfg.llm.model,
                Some(&key),
            ))
        }
        None => {
            tracing::warn!("No API key set, using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
    }
}

/// 从配置创建组件（LLM 由配置决定）
pub fn create_guard_components(cfg: &AppConfig) -> GuardComponents {
    create_guard_components_with_llm(cfg, create_llm_from_config(cfg))
}

/// 从配置创建组件，LLM 由调用方提供（测试中注入 MockLlmClient）
pub fn create_guard_components_with_llm(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
) -> GuardComponents {
    let domains = cfg.tools.corporate_domains.clone();
    let policies = PolicyStore::new(cfg.tools.policies_dir.clone());
    let registry = default_registry(domains.clone(), policies.clone());

    GuardComponents {
        orchestrator: Orchestrator::new(llm, registry, cfg.agent.settings()),
        checker: ComplianceChecker::new(domains.clone()),
        redactor: Redactor::new(domains),
        policies,
    }
}

/// 同步汇总中的单轮决策记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    /// Oracle 轮次；达到上限后合成的 final 记为 0
    pub iteration: usize,
    pub thought: String,
    pub action_type: String,
    pub tool_name: Option<String>,
}

impl IterationRecord {
    fn from_decision(iteration: usize, action: &Action) -> Self {
        Self {
            iteration,
            thought: action.thought_summary().to_string(),
            action_type: action.action_type().to_string(),
            tool_name: action.tool_name().map(str::to_string),
        }
    }
}

/// 同步接口的返回值
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub final_email: String,
    /// 对最终邮件再跑一次合规检查的结果
    pub passed: bool,
    pub iterations: Vec<IterationRecord>,
    pub total_iterations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 同步跑完一次会话
pub async fn review(components: &GuardComponents, goal: &str, draft: &str) -> SyncReport {
    let mut session = Session::new(goal, draft);
    let mut iterations = Vec::new();

    let result = components
        .orchestrator
        .run(&mut session, |t| {
            if let Transition::Decided {
                iteration,
                action,
                ceiling_reached,
                ..
            } = t
            {
                let iteration = if *ceiling_reached { 0 } else { *iteration };
                iterations.push(IterationRecord::from_decision(iteration, action));
            }
        })
        .await;

    match result {
        Ok(final_email) => {
            let passed = components.checker.check(&final_email).pass;
            SyncReport {
                total_iterations: iterations.len(),
                final_email,
                passed,
                iterations,
                error: None,
            }
        }
        Err(e) => {
            tracing::error!(session = %session.id(), "review failed: {}", e);
            SyncReport {
                final_email: draft.to_string(),
                passed: false,
                total_iterations: iterations.len(),
                iterations,
                error: Some(e.to_string()),
            }
        }
    }
}

fn send_event(tx: &mpsc::UnboundedSender<GuardEvent>, ev: GuardEvent) {
    let _ = tx.send(ev);
}

/// 跑一次会话并把每个迁移翻译成事件推送出去；返回最终邮件
pub async fn run_observed(
    components: &GuardComponents,
    goal: &str,
    draft: &str,
    tx: &mpsc::UnboundedSender<GuardEvent>,
) -> Result<String, GuardError> {
    let mut session = Session::new(goal, draft);
    let mut translator = EventTranslator::new();
    components
        .orchestrator
        .run(&mut session, |t| {
            for ev in translator.translate(t) {
                send_event(tx, ev);
            }
        })
        .await
}

/// 流式审查：start -> 过程事件 -> [error] -> done
///
/// 会话在独立任务中运行；接收端被丢弃不会中断会话。会话任务 panic 或 LLM 失败都会转成一个 error 事件，
/// done 总是最后一个事件。
pub fn review_stream(
    components: Arc<GuardComponents>,
    goal: String,
    draft: String,
) -> mpsc::UnboundedReceiver<GuardEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        send_event(&tx, EventTranslator::start(&goal));

        let session_tx = tx.clone();
        let handle = tokio::spawn(async move {
            run_observed(&components, &goal, &draft, &session_tx).await
        });
        match handle.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::warn!("stream session failed: {}", e);
                send_event(&tx, EventTranslator::error(e.to_string()));
            }
            Err(e) => {
                tracing::error!("stream session task aborted: {}", e);
                send_event(&tx, EventTranslator::error(format!("session task failed: {e}")));
            }
        }
        send_event(&tx, EventTranslator::done());
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    fn components(mock: MockLlmClient) -> GuardComponents {
        create_guard_components_with_llm(&AppConfig::default(), Arc::new(mock))
    }

    async fn collect(mut rx: mpsc::UnboundedReceiver<GuardEvent>) -> Vec<GuardEvent> {
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        events
    }

    #[tokio::test]
    async fn test_review_reports_each_decision() {
        let mock = MockLlmClient::scripted([
            r#"{"type": "tool", "thought_summary": "check", "name": "check_compliance", "input": {"email_text": "Hello"}}"#,
            r#"{"type": "final", "thought_summary": "clean", "answer": "Hello"}"#,
        ]);
        let report = review(&components(mock), "goal", "Hello").await;

        assert_eq!(report.final_email, "Hello");
        assert!(report.passed);
        assert_eq!(report.total_iterations, 2);
        assert_eq!(report.iterations[0].tool_name.as_deref(), Some("check_compliance"));
        assert_eq!(report.iterations[1].action_type, "final");
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_ceiling_record_is_not_numbered_as_oracle_turn() {
        let check = r#"{"type": "tool", "thought_summary": "check", "name": "check_compliance", "input": {"email_text": "Hello"}}"#;
        let mut cfg = AppConfig::default();
        cfg.agent.max_iterations = 3;
        let c = create_guard_components_with_llm(
            &cfg,
            Arc::new(MockLlmClient::scripted([check, check, check])),
        );
        let report = review(&c, "goal", "Hello").await;

        let numbers: Vec<usize> = report.iterations.iter().map(|r| r.iteration).collect();
        assert_eq!(numbers, vec![1, 2, 3, 0]);
        assert_eq!(report.total_iterations, 4);
        assert_eq!(report.iterations[3].action_type, "final");
        assert_eq!(report.final_email, "Hello");
    }

    #[tokio::test]
    async fn test_review_error_keeps_original_draft() {
        let mock = MockLlmClient::new();
        mock.push_error(LlmError::ApiError("unauthorized".into()));
        let report = review(&components(mock), "goal", "original").await;

        assert_eq!(report.final_email, "original");
        assert!(!report.passed);
        assert_eq!(report.total_iterations, 0);
        assert!(report.error.unwrap().contains("unauthorized"));
    }

    #[tokio::test]
    async fn test_stream_error_then_done() {
        let mock = MockLlmClient::new();
        mock.push_error(LlmError::EmptyResponse);
        let events = collect(review_stream(
            Arc::new(components(mock)),
            "goal".into(),
            "draft".into(),
        ))
        .await;

        let kinds: Vec<_> = events.iter().map(GuardEvent::kind).collect();
        assert_eq!(kinds, vec!["start", "error", "done"]);
    }

    #[tokio::test]
    async fn test_mock_provider_from_config() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        let c = create_guard_components(&cfg);
        let report = review(&c, "goal", "Hi team, see you Monday.").await;
        assert_eq!(report.final_email, "Hi team, see you Monday.");
        assert_eq!(report.total_iterations, 1);
    }
}
