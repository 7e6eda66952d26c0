//! 政策查询工具（get_policy）
//!
//! 按类别返回 Markdown 政策文档；优先读 policies_dir/<category>.md，缺失时用内置文档。
//! 未知类别返回以 "ERROR:" 开头的文本，而不是工具失败。

use std::path::PathBuf;

use serde_json::Value;

use crate::tools::compliance::IssueCategory;
use crate::tools::registry::{required_str, Tool, ToolError, ToolKind, ToolOutput};

const PII_POLICY: &str = r#"# PII (Personal Identifiable Information) Policy

## Overview
All outbound communications must protect personal identifiable information (PII) of customers, employees, and partners.

## What Constitutes PII
- Full names (when combined with other data)
- Email addresses (external/personal)
- Phone numbers
- Social Security Numbers (SSN)
- Credit card numbers
- Physical addresses
- Date of birth
- Account numbers

## Requirements
1. **Never include raw PII** in external emails
2. **Redact or mask** sensitive information: use [REDACTED] or partial masking (e.g., ***-**-1234)
3. **Reference by ID** instead of name when possible
4. **Encrypt attachments** containing PII

## Exceptions
- The recipient's own information (when sending to that person)
- Information already publicly available
- Information with explicit written consent to share

## Remediation
If PII is detected, either:
- Remove the PII entirely
- Replace with redacted placeholders
- Reference ticket/case ID instead of personal details"#;

const MARKETING_POLICY: &str = r#"# Marketing Communications Policy

## Overview
All promotional and marketing emails must comply with CAN-SPAM Act and company guidelines.

## Required Elements
1. **Clear identification** as promotional content (if applicable)
2. **Unsubscribe mechanism** - Every marketing email MUST include:
   - "Unsubscribe" link or instructions
   - Format: "To unsubscribe, click here: [link]" or "Reply with UNSUBSCRIBE"
3. **Physical address** of the company
4. **Accurate subject line** - No deceptive subjects

## Prohibited Content
- False or misleading header information
- Deceptive subject lines
- Hidden promotional intent
- Pressure tactics without proper disclosure

## Promotional Language Guidelines
Words like "discount", "offer", "deal", "limited time", "act now" trigger marketing compliance requirements.

## Remediation
If marketing content lacks unsubscribe:
- Add: "To unsubscribe from these communications, please reply with 'UNSUBSCRIBE' or click here: [unsubscribe_link]"
- Place at the bottom of the email"#;

const LEGAL_POLICY: &str = r#"# Legal Language Policy

## Overview
Outbound communications must not create unintended legal obligations or liability.

## Prohibited Language
1. **Absolute guarantees**: Avoid "guarantee", "guaranteed", "100%", "promise", "assured"
2. **Binding commitments** without legal review
3. **Unauthorized disclaimers** or liability waivers

## Required Disclaimers
When providing advice or recommendations, include appropriate disclaimers:
- Financial advice: "This is not financial advice. Please consult a qualified financial advisor."
- Legal topics: "This information is for general purposes only and does not constitute legal advice."
- Technical recommendations: "Results may vary. This suggestion is based on general best practices."

## Advisory Language
Phrases like "we recommend", "you should", "our advice", "suggested action" require:
- Appropriate disclaimer
- Qualification of the advice
- Reference to professional consultation if applicable

## Remediation
- Replace "guarantee" with "we aim to" or "our goal is"
- Add appropriate disclaimers for advisory content
- Soften absolute language to qualified statements"#;

const CONFIDENTIALITY_POLICY: &str = r#"# Confidentiality Policy

## Overview
Outbound emails must not contain internal-only or confidential information.

## Confidentiality Markers (NEVER in outbound emails)
- "INTERNAL ONLY"
- "CONFIDENTIAL"
- "DO NOT DISTRIBUTE"
- "NOT FOR EXTERNAL"
- "RESTRICTED"
- "PRIVATE"

If these markers appear, the content should NOT be sent externally.

## Protected Information Categories
1. **Project codenames** - Internal project names like "Project Phoenix" should not be disclosed
2. **Internal systems** - References to Jira, Confluence, internal Slack channels, SharePoint, intranet
3. **Unreleased features** - Product roadmap items not yet public
4. **Internal metrics** - Non-public performance data
5. **Employee information** - Internal org details, salary info, etc.

## Remediation
- Remove confidentiality markers entirely
- Replace project codenames with generic descriptions
- Remove references to internal tools (or replace with "our team" / "we discussed")
- Ensure content is appropriate for external audience

## When in Doubt
If unsure whether content is appropriate for external sharing, remove it or seek approval."#;

fn builtin_policy(category: IssueCategory) -> &'static str {
    match category {
        IssueCategory::Pii => PII_POLICY,
        IssueCategory::Marketing => MARKETING_POLICY,
        IssueCategory::Legal => LEGAL_POLICY,
        IssueCategory::Confidentiality => CONFIDENTIALITY_POLICY,
    }
}

/// 政策文档来源：可选的覆盖目录 + 内置文档
#[derive(Clone, Debug, Default)]
pub struct PolicyStore {
    dir: Option<PathBuf>,
}

impl PolicyStore {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// 查询政策；未知类别返回 Err(错误文本)
    pub fn lookup(&self, category: &str) -> Result<String, String> {
        let cat = IssueCategory::parse(category).ok_or_else(|| {
            let valid: Vec<&str> = IssueCategory::ALL.iter().map(|c| c.as_str()).collect();
            format!(
                "ERROR: Unknown policy category '{}'. Valid categories: {}",
                category.trim().to_lowercase(),
                valid.join(", ")
            )
        })?;

        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{}.md", cat.as_str()));
            match std::fs::read_to_string(&path) {
                Ok(content) => return Ok(content),
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    tracing::warn!(path = %path.display(), error = %e, "policy file unreadable, using builtin");
                }
                Err(_) => {}
            }
        }
        Ok(builtin_policy(cat).to_string())
    }
}

/// 取 Markdown 文档的第一个一级标题
pub fn policy_title(markdown: &str) -> Option<&str> {
    markdown
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(str::trim)
}

/// get_policy 工具
#[derive(Clone, Debug, Default)]
pub struct GetPolicyTool {
    store: PolicyStore,
}

impl GetPolicyTool {
    pub fn new(store: PolicyStore) -> Self {
        Self { store }
    }
}

impl Tool for GetPolicyTool {
    fn kind(&self) -> ToolKind {
        ToolKind::GetPolicy
    }

    fn description(&self) -> &str {
        "Retrieves policy guidelines for a specific category. \
         Categories: \"pii\", \"marketing\", \"legal\", \"confidentiality\". \
         Use this to understand HOW to fix identified issues."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "category": {
                    "type": "string",
                    "enum": ["pii", "marketing", "legal", "confidentiality"]
                }
            },
            "required": ["category"]
        })
    }

    fn execute(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let category = required_str(args, "category")?;
        // 未知类别也作为正常结果返回，交给 LLM 看到并纠正
        let text = self.store.lookup(category).unwrap_or_else(|err| err);
        Ok(ToolOutput::Text(text))
    }
}
