//! MailGuard Web API
//!
//! 启动: cargo run --bin mailguard-web --features web
//! 默认监听 http://0.0.0.0:8000

#![cfg(feature = "web")]

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream;
use serde::{Deserialize, Serialize};
use serde_json::json;

use mailguard::agent::{create_guard_components, review, review_stream, GuardComponents, SyncReport};
use mailguard::config::{load_config, AppConfig};
use mailguard::react::{EventTranslator, IssueCard};
use mailguard::tools::{policy_title, Issue, Severity};

struct AppState {
    components: Arc<GuardComponents>,
    default_goal: String,
}

#[derive(Deserialize)]
struct EmailCheckRequest {
    email_text: String,
}

#[derive(Deserialize)]
struct RedactRequest {
    text: String,
}

#[derive(Deserialize)]
struct AgentRunRequest {
    email_text: String,
    goal: Option<String>,
}

#[derive(Serialize)]
struct CheckResponse {
    issues: Vec<IssueCard>,
    pass: bool,
    summary: String,
}

#[derive(Serialize)]
struct PolicyResponse {
    category: String,
    title: String,
    content: String,
}

#[derive(Serialize)]
struct RedactionEntry {
    #[serde(rename = "type")]
    kind: String,
    original: String,
    replacement: String,
}

#[derive(Serialize)]
struct RedactResponse {
    original: String,
    redacted: String,
    redactions: Vec<RedactionEntry>,
}

#[derive(Serialize)]
struct RewriteChange {
    original: String,
    replacement: String,
    reason: String,
}

#[derive(Serialize)]
struct RewriteResponse {
    rewritten: String,
    changes: Vec<RewriteChange>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mailguard::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let state = Arc::new(AppState {
        components: Arc::new(create_guard_components(&cfg)),
        default_goal: cfg.app.default_goal.clone(),
    });

    let app = Router::new()
        .route("/api/check-compliance", post(api_check_compliance))
        .route("/api/policy/:category", get(api_get_policy))
        .route("/api/redact-pii", post(api_redact_pii))
        .route("/api/rewrite", post(api_rewrite))
        .route("/api/run-agent", post(api_run_agent_stream))
        .route("/api/run-agent-sync", post(api_run_agent_sync))
        .route(
            "/api/health",
            get(|| async { Json(json!({"status": "healthy", "version": "1.0.0"})) }),
        )
        .with_state(state);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(cfg.web.port);
    let addr = format!("{}:{}", cfg.web.host, port);
    tracing::info!("MailGuard Web API: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// 直连接口只区分 critical 与 warning
fn issue_card(issue: &Issue) -> IssueCard {
    let kind = issue.category.as_str().to_string();
    IssueCard {
        severity: if issue.severity == Severity::Critical {
            "critical"
        } else {
            "warning"
        }
        .to_string(),
        title: format!("{} Issue", kind.to_uppercase()),
        description: issue.description.clone(),
        category: kind.clone(),
        kind,
    }
}

/// redactions_made 条目形如 "SSN: ***-**-8891"，冒号前为类型
fn redaction_kind(item: &str) -> String {
    item.split_once(':')
        .map(|(kind, _)| kind.to_string())
        .unwrap_or_else(|| "PII".to_string())
}

/// POST /api/check-compliance
async fn api_check_compliance(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailCheckRequest>,
) -> Json<CheckResponse> {
    let report = state.components.checker.check(&req.email_text);
    Json(CheckResponse {
        issues: report.issues.iter().map(issue_card).collect(),
        pass: report.pass,
        summary: report.summary,
    })
}

/// GET /api/policy/:category；未知类别 404
async fn api_get_policy(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> Result<Json<PolicyResponse>, (StatusCode, String)> {
    let content = state
        .components
        .policies
        .lookup(&category)
        .map_err(|e| (StatusCode::NOT_FOUND, e))?;
    let title = policy_title(&content)
        .map(str::to_string)
        .unwrap_or_else(|| category.to_uppercase());
    Ok(Json(PolicyResponse {
        category,
        title,
        content,
    }))
}

/// POST /api/redact-pii
async fn api_redact_pii(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RedactRequest>,
) -> Json<RedactResponse> {
    let report = state.components.redactor.redact(&req.text);
    Json(RedactResponse {
        redactions: report
            .redactions_made
            .iter()
            .map(|r| RedactionEntry {
                kind: redaction_kind(r),
                original: r.clone(),
                replacement: "[REDACTED]".to_string(),
            })
            .collect(),
        original: req.text,
        redacted: report.redacted_text,
    })
}

/// POST /api/rewrite：只做 PII 脱敏的快速改写
async fn api_rewrite(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailCheckRequest>,
) -> Json<RewriteResponse> {
    let report = state.components.redactor.redact(&req.email_text);
    Json(RewriteResponse {
        rewritten: report.redacted_text,
        changes: report
            .redactions_made
            .into_iter()
            .map(|r| RewriteChange {
                original: r,
                replacement: "[REDACTED]".to_string(),
                reason: "PII redaction".to_string(),
            })
            .collect(),
    })
}

/// POST /api/run-agent：SSE，每条消息一个 JSON 事件，以 done 结束
async fn api_run_agent_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AgentRunRequest>,
) -> Sse<impl futures_util::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let goal = req.goal.unwrap_or_else(|| state.default_goal.clone());
    let rx = review_stream(Arc::clone(&state.components), goal, req.email_text);

    let event_stream = stream::unfold(rx, |mut rx| async move {
        let ev = rx.recv().await?;
        let data = serde_json::to_string(&ev).unwrap_or_else(|e| {
            serde_json::to_string(&EventTranslator::error(format!("event encoding failed: {e}")))
                .unwrap_or_default()
        });
        Some((Ok(Event::default().data(data)), rx))
    });
    Sse::new(event_stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("keepalive"),
    )
}

/// POST /api/run-agent-sync
async fn api_run_agent_sync(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AgentRunRequest>,
) -> Json<SyncReport> {
    let goal = req.goal.unwrap_or_else(|| state.default_goal.clone());
    Json(review(&state.components, &goal, &req.email_text).await)
}
