//! 模型策略表
//!
//! 按模型名查找工具调用上限、校验严格度等参数。
//! 查找是纯函数：未知模型返回默认策略，从不报错。
//!
//! 匹配顺序：
//! 1. 配置文件中的规则（精确匹配优先，然后按 priority）
//! 2. 内置规则（同样排序）
//! 3. 默认策略

mod rules;

pub use rules::{normalize_model_name, PolicyRule};

use serde::{Deserialize, Serialize};

/// 单个模型的转换策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPolicy {
    /// 单轮 assistant 消息允许的最大工具调用数
    pub max_tool_calls: usize,
    /// 严格模式：超限直接报错而不是截断
    pub strict_validation: bool,
    /// 请求未指定 max_tokens 时使用的值
    pub default_max_tokens: u32,
    /// 后端是否支持并行工具调用
    pub supports_parallel_tools: bool,
}

impl Default for ModelPolicy {
    fn default() -> Self {
        Self {
            max_tool_calls: 5,
            strict_validation: false,
            default_max_tokens: 4096,
            supports_parallel_tools: true,
        }
    }
}

/// 内置策略规则
fn builtin_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule::new("devstral-*", 10, ModelPolicy::default()),
        PolicyRule::new(
            "mistral-large-*",
            10,
            ModelPolicy {
                max_tool_calls: 10,
                default_max_tokens: 8192,
                ..ModelPolicy::default()
            },
        ),
        PolicyRule::new("mistral-small-*", 10, ModelPolicy::default()),
        PolicyRule::new(
            "codestral-*",
            10,
            ModelPolicy {
                max_tool_calls: 3,
                supports_parallel_tools: false,
                ..ModelPolicy::default()
            },
        ),
        PolicyRule::new(
            "*7b-instruct*",
            20,
            ModelPolicy {
                max_tool_calls: 1,
                strict_validation: true,
                default_max_tokens: 2048,
                supports_parallel_tools: false,
            },
        ),
    ]
}

/// 模型策略表（构建后只读，可在请求间共享）
#[derive(Debug, Clone)]
pub struct ModelPolicyTable {
    configured: Vec<PolicyRule>,
    builtin: Vec<PolicyRule>,
    default: ModelPolicy,
}

impl Default for ModelPolicyTable {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ModelPolicyTable {
    /// 内置规则 + 配置规则
    pub fn new(mut configured: Vec<PolicyRule>) -> Self {
        configured.sort();
        let mut builtin = builtin_rules();
        builtin.sort();
        Self {
            configured,
            builtin,
            default: ModelPolicy::default(),
        }
    }

    /// 查找模型策略
    pub fn policy(&self, model: &str) -> ModelPolicy {
        self.matched_rule(model)
            .map(|rule| rule.policy)
            .unwrap_or(self.default)
    }

    /// 命中的规则（未命中时为 `None`）
    pub fn matched_rule(&self, model: &str) -> Option<&PolicyRule> {
        self.configured
            .iter()
            .chain(self.builtin.iter())
            .find(|rule| rule.matches(model))
    }

    pub fn default_policy(&self) -> ModelPolicy {
        self.default
    }

    /// 所有已知的模型模式（用于健康检查展示）
    pub fn supported_models(&self) -> Vec<String> {
        self.configured
            .iter()
            .chain(self.builtin.iter())
            .map(|rule| rule.pattern.clone())
            .collect()
    }
}
