//! 工具箱：合规检查、政策查询、PII 脱敏，以及按名称分发的注册表

pub mod compliance;
pub mod policy;
pub mod redaction;
pub mod registry;
pub mod schema;

pub use compliance::{
    CheckComplianceTool, ComplianceChecker, ComplianceReport, Issue, IssueCategory, Severity,
};
pub use policy::{policy_title, GetPolicyTool, PolicyStore};
pub use redaction::{RedactPiiTool, RedactionReport, Redactor};
pub use registry::{Tool, ToolError, ToolKind, ToolOutput, ToolRegistry};
pub use schema::action_schema_json;

/// 用同一组公司域名构建包含三个内置工具的注册表
pub fn default_registry(corporate_domains: Vec<String>, policies: PolicyStore) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(CheckComplianceTool::new(ComplianceChecker::new(
        corporate_domains.clone(),
    )));
    registry.register(GetPolicyTool::new(policies));
    registry.register(RedactPiiTool::new(Redactor::new(corporate_domains)));
    registry
}
