//! PII 脱敏工具（redact_pii）
//!
//! 顺序：外部邮箱 -> 电话 -> SSN -> 信用卡 -> 带称谓的人名。
//! 称呼行里的收件人姓名（如 "Dear Mr. Smith,"、"Good morning Mr. Smith and Mrs. Jones,"）保留；
//! 正文中第三方姓名替换为 [REDACTED_NAME]。称谓与姓名之间不跨行匹配。
//! 对已脱敏文本再次脱敏不会产生新的替换。

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::compliance::{is_corporate_email, EMAIL_RE, PHONE_RE};
use crate::tools::registry::{required_str, Tool, ToolError, ToolKind, ToolOutput};

static SSN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{3})[-.\s]?(\d{2})[-.\s]?(\d{4})\b").expect("valid ssn regex")
});
static CARD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{4})[-.\s]?(\d{4})[-.\s]?(\d{4})[-.\s]?(\d{4})\b").expect("valid card regex")
});
static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(Mr\.|Ms\.|Mrs\.|Dr\.)[ \t]+([A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+)?)\b")
        .expect("valid name regex")
});
/// 邮件头行，如 "Subject: ..."
static HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z-]*:\s").expect("valid header regex"));

/// 行首出现这些词时，紧随其后的称谓姓名视为收件人
const GREETINGS: &[&str] = &["dear", "hi", "hello", "hey", "greetings", "to", "attn:"];
/// 称呼行最多的词数
const GREETING_MAX_WORDS: usize = 10;

/// redact_pii 的结构化结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionReport {
    pub redacted_text: String,
    pub redactions_made: Vec<String>,
    pub count: usize,
    pub summary: String,
}

#[derive(Clone, Debug)]
pub struct Redactor {
    corporate_domains: Vec<String>,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(vec!["company.com".to_string(), "example.com".to_string()])
    }
}

impl Redactor {
    pub fn new(corporate_domains: Vec<String>) -> Self {
        Self { corporate_domains }
    }

    pub fn redact(&self, text: &str) -> RedactionReport {
        let mut redactions = Vec::new();

        let redacted = EMAIL_RE.replace_all(text, |caps: &Captures| {
            let email = &caps[0];
            if is_corporate_email(&self.corporate_domains, email) {
                email.to_string()
            } else {
                redactions.push(format!("Email: {email}"));
                "[REDACTED_EMAIL]".to_string()
            }
        });

        let redacted = PHONE_RE.replace_all(&redacted, |caps: &Captures| {
            redactions.push(format!("Phone: {}", &caps[0]));
            "[REDACTED_PHONE]"
        });

        let redacted = SSN_RE.replace_all(&redacted, |caps: &Captures| {
            let area = &caps[1];
            // 000 / 666 / 9xx 不是合法的 SSN 区号
            if area == "000" || area == "666" || area.starts_with('9') {
                caps[0].to_string()
            } else {
                redactions.push(format!("SSN: ***-**-{}", &caps[3]));
                "[REDACTED_SSN]".to_string()
            }
        });

        let redacted = CARD_RE.replace_all(&redacted, |caps: &Captures| {
            let last_four = &caps[4];
            redactions.push(format!("Credit Card: ****-****-****-{last_four}"));
            format!("[REDACTED_CC_****{last_four}]")
        });

        let source: &str = &redacted;
        let greeting = greeting_line(source);
        let redacted = NAME_RE.replace_all(source, |caps: &Captures| {
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            if greeting.as_ref().is_some_and(|r| r.contains(&start)) || is_salutation(source, start)
            {
                caps[0].to_string()
            } else {
                redactions.push(format!("Name with title: {}", &caps[0]));
                format!("{} [REDACTED_NAME]", &caps[1])
            }
        });

        let count = redactions.len();
        RedactionReport {
            redacted_text: redacted.into_owned(),
            summary: if count == 0 {
                "No PII found to redact".to_string()
            } else {
                format!("Redacted {count} PII item(s)")
            },
            redactions_made: redactions,
            count,
        }
    }
}

/// 称呼行：跳过空行与邮件头后的第一行，且以逗号结尾、足够短；该行内所有称谓姓名都是收件人
fn greeting_line(text: &str) -> Option<Range<usize>> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let trimmed = line.trim();
        if trimmed.is_empty() || HEADER_RE.is_match(trimmed) {
            continue;
        }
        let is_greeting = trimmed.ends_with(',')
            && trimmed.split_whitespace().count() <= GREETING_MAX_WORDS;
        return is_greeting.then_some(start..offset);
    }
    None
}

/// 匹配位置之前、同一行内只有问候词时，视为收件人称呼
fn is_salutation(text: &str, match_start: usize) -> bool {
    let line_start = text[..match_start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let prefix = text[line_start..match_start]
        .trim()
        .trim_end_matches(',')
        .to_lowercase();
    GREETINGS.contains(&prefix.as_str())
}

/// redact_pii 工具；成功时编排器会用 redacted_text 替换当前草稿
#[derive(Clone, Debug, Default)]
pub struct RedactPiiTool {
    redactor: Redactor,
}

impl RedactPiiTool {
    pub fn new(redactor: Redactor) -> Self {
        Self { redactor }
    }
}

impl Tool for RedactPiiTool {
    fn kind(&self) -> ToolKind {
        ToolKind::RedactPii
    }

    fn description(&self) -> &str {
        "Automatically redacts PII (emails, phones, SSN, etc.) from text. \
         Returns {\"redacted_text\": str, \"redactions_made\": [...], \"summary\": str}. \
         Does NOT redact recipient names in greetings (e.g., \"Dear Mr. Smith\" stays intact). \
         Use this for OTHER people's PII mentioned in the email body."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    fn execute(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let text = required_str(args, "text")?;
        serde_json::to_value(self.redactor.redact(text))
            .map(ToolOutput::Json)
            .map_err(|e| ToolError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT_EMAIL: &str = "Dear Mr. Smith,\n\n\
        I reviewed the account for john.smith@gmail.com.\n\
        - Account holder: Mr. James Wilson\n\
        - Phone on file: (555) 123-4567\n\
        - The full SSN 452-33-8891 was used for verification\n\
        - Card: 4111 1111 1111 1234\n\n\
        Contact support@company.com with questions.";

    #[test]
    fn test_redacts_each_kind() {
        let report = Redactor::default().redact(ACCOUNT_EMAIL);
        let text = &report.redacted_text;
        assert!(text.starts_with("Dear Mr. Smith,"));
        assert!(text.contains("[REDACTED_EMAIL]"));
        assert!(text.contains("Mr. [REDACTED_NAME]"));
        assert!(text.contains("[REDACTED_PHONE]"));
        assert!(text.contains("[REDACTED_SSN]"));
        assert!(text.contains("[REDACTED_CC_****1234]"));
        assert!(text.contains("support@company.com"));
        assert!(!text.contains("452-33-8891"));
        assert!(!text.contains("James Wilson"));
        assert_eq!(report.count, 5);
        assert_eq!(report.count, report.redactions_made.len());
        assert!(report.redactions_made.contains(&"SSN: ***-**-8891".to_string()));
    }

    #[test]
    fn test_idempotent() {
        let redactor = Redactor::default();
        let first = redactor.redact(ACCOUNT_EMAIL);
        let second = redactor.redact(&first.redacted_text);
        assert_eq!(second.count, 0);
        assert_eq!(second.redacted_text, first.redacted_text);
        assert_eq!(second.summary, "No PII found to redact");
    }

    #[test]
    fn test_salutation_name_kept_but_body_name_redacted() {
        let report = Redactor::default()
            .redact("Hi Dr. Jane Doe,\n\nDr. Jane Doe asked me to forward this.");
        assert_eq!(
            report.redacted_text,
            "Hi Dr. Jane Doe,\n\nDr. [REDACTED_NAME] asked me to forward this."
        );
        assert_eq!(report.count, 1);
    }

    #[test]
    fn test_name_at_line_end_does_not_swallow_next_line() {
        let report = Redactor::default()
            .redact("Dear Mr. Smith\nThanks for writing.\nCc Mr. Wilson\nRegards");
        assert_eq!(
            report.redacted_text,
            "Dear Mr. Smith\nThanks for writing.\nCc Mr. [REDACTED_NAME]\nRegards"
        );
        assert_eq!(report.redactions_made, vec!["Name with title: Mr. Wilson".to_string()]);
    }

    #[test]
    fn test_every_recipient_on_greeting_line_kept() {
        let report = Redactor::default().redact(
            "Subject: Renewal\n\nGood morning Mr. Smith and Mrs. Jones,\n\nMrs. Jones asked about the renewal.",
        );
        assert_eq!(
            report.redacted_text,
            "Subject: Renewal\n\nGood morning Mr. Smith and Mrs. Jones,\n\nMrs. [REDACTED_NAME] asked about the renewal."
        );
        assert_eq!(report.count, 1);
    }

    #[test]
    fn test_body_line_ending_in_comma_is_not_greeting() {
        let report = Redactor::default()
            .redact("Hello team,\nAs discussed with Mr. Brown,\nthe plan stands.");
        assert_eq!(
            report.redacted_text,
            "Hello team,\nAs discussed with Mr. [REDACTED_NAME],\nthe plan stands."
        );
    }

    #[test]
    fn test_invalid_ssn_area_kept() {
        let report = Redactor::default().redact("Ref 912-34-5678");
        assert_eq!(report.redacted_text, "Ref 912-34-5678");
        assert_eq!(report.count, 0);
    }

    #[test]
    fn test_tool_requires_text() {
        let err = RedactPiiTool::default()
            .execute(&serde_json::json!({"email_text": "x"}))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }
}
