//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MAILGUARD__*` 覆盖（双下划线表示嵌套，如 `MAILGUARD__LLM__PROVIDER=mock`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::react::{GuardSettings, DEFAULT_MAX_ITERATIONS};

/// 未指定时使用的审查目标
pub const DEFAULT_GOAL: &str =
    "Review this email for compliance issues and rewrite it to be compliant.";

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub agent: AgentSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub web: WebSection,
}

/// [app] 段：应用名、默认审查目标
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    #[serde(default = "default_goal")]
    pub default_goal: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            default_goal: default_goal(),
        }
    }
}

fn default_goal() -> String {
    DEFAULT_GOAL.to_string()
}

/// [agent] 段：循环上限
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

impl AgentSection {
    pub fn settings(&self) -> GuardSettings {
        GuardSettings {
            max_iterations: self.max_iterations,
        }
    }
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai（任意 OpenAI 兼容端点）/ mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 未配置时依次读取 OPENROUTER_API_KEY、OPENAI_API_KEY
    pub api_key: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            api_key: None,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

impl LlmSection {
    /// 配置优先，其次环境变量
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// [tools] 段：政策文档目录、公司域名
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 存放 `<category>.md` 的目录；缺失的类别回退到内置文档
    pub policies_dir: Option<PathBuf>,
    /// 这些域名下的邮箱地址不算外部 PII
    #[serde(default = "default_corporate_domains")]
    pub corporate_domains: Vec<String>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            policies_dir: None,
            corporate_domains: default_corporate_domains(),
        }
    }
}

fn default_corporate_domains() -> Vec<String> {
    vec!["company.com".into(), "example.com".into()]
}

/// [web] 段：HTTP 服务监听地址
#[derive(Debug, Clone, Deserialize)]
pub struct WebSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

/// 从 config 目录加载配置，环境变量 MAILGUARD__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MAILGUARD__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MAILGUARD")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
