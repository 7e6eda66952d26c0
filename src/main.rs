//! MailGuard CLI
//!
//! 入口：初始化日志、加载配置、对一封邮件跑审查循环，并把过程事件渲染到终端。
//! 未指定文件时审查内置的演示邮件。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mailguard::agent::{create_guard_components, review_stream};
use mailguard::config::{load_config, AppConfig};
use mailguard::react::GuardEvent;

const DEMO_EMAIL: &str = "Subject: Your Account Issue

Dear Mr. John Smith,

Thank you for contacting us about your account. I've looked into the issue and found
that your account (john.smith@gmail.com) was flagged due to unusual activity.

Your phone number (555) 123-4567 and SSN 452-33-8891 have been verified.

We guarantee this will be resolved within 24 hours. You should definitely upgrade
to our premium plan for better protection.

Best regards,
Support Team";

/// mailguard - 出站邮件合规守卫
#[derive(Parser, Debug)]
#[command(name = "mailguard")]
#[command(version, about, long_about = None)]
struct Cli {
    /// 待审查的邮件文件（缺省时使用内置演示邮件）
    file: Option<PathBuf>,

    /// 审查目标
    #[arg(short, long)]
    goal: Option<String>,

    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 覆盖 [agent].max_iterations
    #[arg(long)]
    max_iterations: Option<usize>,

    /// 以 JSON Lines 输出原始事件
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mailguard::observability::init();
    let cli = Cli::parse();

    let mut cfg = load_config(cli.config.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    if let Some(n) = cli.max_iterations {
        cfg.agent.max_iterations = n;
    }

    let draft = match &cli.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read email file {}", path.display()))?,
        None => DEMO_EMAIL.to_string(),
    };
    let goal = cli.goal.clone().unwrap_or_else(|| cfg.app.default_goal.clone());

    let components = Arc::new(create_guard_components(&cfg));
    let mut rx = review_stream(components, goal, draft);

    let mut final_email = None;
    while let Some(ev) = rx.recv().await {
        if cli.json {
            println!("{}", serde_json::to_string(&ev).context("Failed to encode event")?);
        } else if let Some(line) = render(&ev) {
            println!("{line}");
        }
        if let GuardEvent::Complete { final_email: text, .. } = ev {
            final_email = Some(text);
        }
    }

    if !cli.json {
        match final_email {
            Some(text) => println!("\n===== FINAL EMAIL =====\n{text}"),
            None => anyhow::bail!("review did not complete"),
        }
    }
    Ok(())
}

/// 终端展示；不需要单独成行的事件返回 None
fn render(ev: &GuardEvent) -> Option<String> {
    let line = match ev {
        GuardEvent::Start { goal } => format!("▶ {goal}"),
        GuardEvent::IterationStart { progress } => {
            format!("\n── compliance cycle {} ──", progress.iteration)
        }
        GuardEvent::Thinking { progress, thought } => {
            format!("[turn {}] 💭 {thought}", progress.oracle_turn)
        }
        GuardEvent::ToolSelected { tool_name, .. } => format!("  🔧 {tool_name}"),
        GuardEvent::ToolResult { tool_name, result, .. } => {
            format!("  ↳ {tool_name}: {result}")
        }
        GuardEvent::PolicyLoaded { title, category, .. } => format!(
            "  📄 policy loaded: {}",
            title.as_deref().or(category.as_deref()).unwrap_or("?")
        ),
        GuardEvent::Issue { issue, .. } => {
            format!("  ⚠ [{}] {}: {}", issue.severity, issue.title, issue.description)
        }
        GuardEvent::ComplianceResult { pass, summary, .. } => {
            format!("  {} {summary}", if *pass { "✅" } else { "❌" })
        }
        GuardEvent::Feedback { text, .. } => format!("  💡 {text}"),
        GuardEvent::RedactionItem { item, .. } => format!("  ✂ {item}"),
        GuardEvent::RedactionComplete { count, .. } => format!("  {count} redaction(s) applied"),
        GuardEvent::RewriteComplete { preview, .. } => format!("  ✏ rewrite:\n{preview}"),
        GuardEvent::Finalizing { .. } => "  finalizing".to_string(),
        GuardEvent::Error { message } => format!("ERROR: {message}"),
        _ => return None,
    };
    Some(line)
}
