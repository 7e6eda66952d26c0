//! 合规检查工具（check_compliance）
//!
//! 基于正则与关键词对邮件做 PII / 营销 / 法务 / 保密四类检查，返回 issues 列表与 pass 标志。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::registry::{required_str, Tool, ToolError, ToolKind, ToolOutput};

pub(crate) static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b").expect("valid email regex")
});
pub(crate) static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+1[-.\s]?|\b1[-.\s]?)?(?:\([0-9]{3}\)|\b[0-9]{3})[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}\b")
        .expect("valid phone regex")
});
static SSN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{3}[-.\s]?\d{2}[-.\s]?\d{4}\b").expect("valid ssn regex"));
static CARD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{4}[-.\s]?){3}\d{4}\b").expect("valid card regex"));
static CODENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:Project|Operation)\s+([A-Z][a-z]+)\b").expect("valid codename regex")
});

const PROMO_KEYWORDS: &[&str] = &[
    "discount",
    "offer",
    "deal",
    "promotion",
    "limited time",
    "act now",
    "special price",
    "sale",
    "buy now",
    "free trial",
];
const GUARANTEE_KEYWORDS: &[&str] = &["guarantee", "guaranteed", "100%", "promise", "assured"];
const ADVICE_KEYWORDS: &[&str] = &["we recommend", "you should", "our advice", "suggested action"];
const CONFIDENTIAL_MARKERS: &[&str] = &[
    "INTERNAL ONLY",
    "CONFIDENTIAL",
    "DO NOT DISTRIBUTE",
    "NOT FOR EXTERNAL",
    "RESTRICTED",
    "PRIVATE",
];
const GENERIC_CODENAME_WORDS: &[&str] = &[
    "update", "status", "report", "plan", "summary", "overview", "meeting", "review", "proposal",
    "timeline", "progress",
];
const INTERNAL_SYSTEMS: &[&str] = &[
    "jira",
    "confluence",
    "slack channel",
    "internal wiki",
    "sharepoint",
    "intranet",
];

/// 问题类别（同时也是 get_policy 的类别）
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Pii,
    Marketing,
    Legal,
    Confidentiality,
}

impl IssueCategory {
    pub const ALL: [IssueCategory; 4] = [
        IssueCategory::Pii,
        IssueCategory::Marketing,
        IssueCategory::Legal,
        IssueCategory::Confidentiality,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IssueCategory::Pii => "pii",
            IssueCategory::Marketing => "marketing",
            IssueCategory::Legal => "legal",
            IssueCategory::Confidentiality => "confidentiality",
        }
    }

    /// 大小写、首尾空白不敏感
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub category: IssueCategory,
    pub description: String,
    pub severity: Severity,
}

/// check_compliance 的结构化结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub issues: Vec<Issue>,
    pub pass: bool,
    pub total_issues: usize,
    pub summary: String,
}

/// 合规检查器：corporate_domains 下的邮箱视为公司内部地址，不算 PII
#[derive(Clone, Debug)]
pub struct ComplianceChecker {
    corporate_domains: Vec<String>,
}

impl Default for ComplianceChecker {
    fn default() -> Self {
        Self::new(vec!["company.com".to_string(), "example.com".to_string()])
    }
}

impl ComplianceChecker {
    pub fn new(corporate_domains: Vec<String>) -> Self {
        Self { corporate_domains }
    }

    pub(crate) fn is_corporate(&self, email: &str) -> bool {
        is_corporate_email(&self.corporate_domains, email)
    }

    pub fn check(&self, email_text: &str) -> ComplianceReport {
        let mut issues = Vec::new();
        let lower = email_text.to_lowercase();
        let contains_any = |words: &[&str]| words.iter().any(|w| lower.contains(&w.to_lowercase()));

        // PII
        let external: Vec<&str> = EMAIL_RE
            .find_iter(email_text)
            .map(|m| m.as_str())
            .filter(|e| !self.is_corporate(e))
            .collect();
        if !external.is_empty() {
            let shown: Vec<&str> = external.iter().take(3).copied().collect();
            issues.push(Issue {
                category: IssueCategory::Pii,
                description: format!("External email addresses found: {}", shown.join(", ")),
                severity: Severity::High,
            });
        }
        if PHONE_RE.is_match(email_text) {
            issues.push(Issue {
                category: IssueCategory::Pii,
                description: "Phone number detected in email body".to_string(),
                severity: Severity::High,
            });
        }
        if SSN_RE.is_match(email_text) {
            issues.push(Issue {
                category: IssueCategory::Pii,
                description: "Possible SSN pattern detected".to_string(),
                severity: Severity::Critical,
            });
        }
        if CARD_RE.is_match(email_text) {
            issues.push(Issue {
                category: IssueCategory::Pii,
                description: "Possible credit card number detected".to_string(),
                severity: Severity::Critical,
            });
        }

        // 营销
        if contains_any(PROMO_KEYWORDS) && !lower.contains("unsubscribe") {
            issues.push(Issue {
                category: IssueCategory::Marketing,
                description: "Promotional content detected without unsubscribe option".to_string(),
                severity: Severity::High,
            });
        }

        // 法务
        if contains_any(GUARANTEE_KEYWORDS) {
            issues.push(Issue {
                category: IssueCategory::Legal,
                description: "Unapproved guarantee or promise language detected".to_string(),
                severity: Severity::Medium,
            });
        }
        if contains_any(ADVICE_KEYWORDS)
            && !lower.contains("disclaimer")
            && !lower.contains("not financial advice")
        {
            issues.push(Issue {
                category: IssueCategory::Legal,
                description: "Advisory language detected without appropriate disclaimer"
                    .to_string(),
                severity: Severity::Medium,
            });
        }

        // 保密：标记与内部系统各只报第一个
        if let Some(marker) = CONFIDENTIAL_MARKERS
            .iter()
            .find(|m| lower.contains(&m.to_lowercase()))
        {
            issues.push(Issue {
                category: IssueCategory::Confidentiality,
                description: format!(
                    "Confidentiality marker '{marker}' found - should not be in outbound email"
                ),
                severity: Severity::Critical,
            });
        }
        let codenames: Vec<&str> = CODENAME_RE
            .captures_iter(email_text)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .filter(|c| !GENERIC_CODENAME_WORDS.contains(&c.to_lowercase().as_str()))
            .collect();
        if !codenames.is_empty() {
            issues.push(Issue {
                category: IssueCategory::Confidentiality,
                description: format!(
                    "Possible internal project codename detected: {}",
                    codenames.join(", ")
                ),
                severity: Severity::Medium,
            });
        }
        if let Some(system) = INTERNAL_SYSTEMS.iter().find(|s| lower.contains(*s)) {
            issues.push(Issue {
                category: IssueCategory::Confidentiality,
                description: format!("Reference to internal system '{system}' detected"),
                severity: Severity::Low,
            });
        }

        let total = issues.len();
        ComplianceReport {
            pass: total == 0,
            total_issues: total,
            summary: if total == 0 {
                "Email passed compliance check".to_string()
            } else {
                format!("Found {total} compliance issue(s)")
            },
            issues,
        }
    }
}

pub(crate) fn is_corporate_email(domains: &[String], email: &str) -> bool {
    domains
        .iter()
        .any(|d| email.ends_with(&format!("@{}", d.trim_start_matches('@'))))
}

/// check_compliance 工具
#[derive(Clone, Debug, Default)]
pub struct CheckComplianceTool {
    checker: ComplianceChecker,
}

impl CheckComplianceTool {
    pub fn new(checker: ComplianceChecker) -> Self {
        Self { checker }
    }
}

impl Tool for CheckComplianceTool {
    fn kind(&self) -> ToolKind {
        ToolKind::CheckCompliance
    }

    fn description(&self) -> &str {
        "Checks email for compliance issues (PII, marketing, legal, confidentiality). \
         Returns {\"issues\": [...], \"pass\": bool, \"summary\": str}. \
         Use this FIRST to identify problems, and AFTER each rewrite to verify fixes."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "email_text": { "type": "string" } },
            "required": ["email_text"]
        })
    }

    fn execute(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let text = required_str(args, "email_text")?;
        let report = self.checker.check(text);
        serde_json::to_value(report)
            .map(ToolOutput::Json)
            .map_err(|e| ToolError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories(report: &ComplianceReport) -> Vec<IssueCategory> {
        report.issues.iter().map(|i| i.category).collect()
    }

    #[test]
    fn test_clean_email_passes() {
        let report = ComplianceChecker::default()
            .check("Hello team,\n\nThanks for the call today.\n\nBest,\nAnna");
        assert!(report.pass);
        assert_eq!(report.total_issues, 0);
        assert_eq!(report.summary, "Email passed compliance check");
    }

    #[test]
    fn test_ssn_is_critical_pii() {
        let report = ComplianceChecker::default()
            .check("Dear Mr. Smith,\n\nThe SSN 452-33-8891 was verified.\n\nRegards");
        assert!(!report.pass);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].category, IssueCategory::Pii);
        assert_eq!(report.issues[0].severity, Severity::Critical);
    }

    #[test]
    fn test_corporate_email_is_allowed() {
        let checker = ComplianceChecker::default();
        assert!(checker.check("Reach me at help@company.com").pass);
        let report = checker.check("Reach john at john.smith@gmail.com");
        assert_eq!(categories(&report), vec![IssueCategory::Pii]);
        assert!(report.issues[0].description.contains("john.smith@gmail.com"));
    }

    #[test]
    fn test_marketing_needs_unsubscribe() {
        let checker = ComplianceChecker::default();
        let report = checker.check("Huge discount this week only!");
        assert_eq!(categories(&report), vec![IssueCategory::Marketing]);
        assert!(checker
            .check("Huge discount this week only! Reply UNSUBSCRIBE to opt out.")
            .pass);
    }

    #[test]
    fn test_legal_and_confidentiality() {
        let report = ComplianceChecker::default().check(
            "INTERNAL ONLY\nWe guarantee results. Project Phoenix is tracked in Jira. \
             CONFIDENTIAL notes attached.",
        );
        assert_eq!(
            categories(&report),
            vec![
                IssueCategory::Legal,
                IssueCategory::Confidentiality,
                IssueCategory::Confidentiality,
                IssueCategory::Confidentiality,
            ]
        );
        // 保密标记只报第一个
        assert!(report.issues[1].description.contains("INTERNAL ONLY"));
        assert!(report.issues[2].description.contains("Phoenix"));
        assert_eq!(report.issues[3].severity, Severity::Low);
    }

    #[test]
    fn test_generic_project_words_ignored() {
        let report = ComplianceChecker::default().check("Here is the Project Update for you.");
        assert!(report.pass);
    }

    #[test]
    fn test_advice_with_disclaimer() {
        let checker = ComplianceChecker::default();
        assert!(!checker.check("We recommend you refinance.").pass);
        assert!(checker
            .check("We recommend you refinance. Disclaimer: this is general information.")
            .pass);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(IssueCategory::parse("  PII "), Some(IssueCategory::Pii));
        assert_eq!(IssueCategory::parse("finance"), None);
    }

    #[test]
    fn test_tool_output_shape() {
        let out = CheckComplianceTool::default()
            .execute(&serde_json::json!({"email_text": "SSN 452-33-8891"}))
            .unwrap();
        let ToolOutput::Json(v) = out else {
            panic!("expected json output");
        };
        assert_eq!(v["pass"], false);
        assert_eq!(v["issues"][0]["type"], "pii");
        assert_eq!(v["issues"][0]["severity"], "critical");
    }
}
