//! 模型策略规则
//!
//! 提供模型名模式匹配与规则排序

use super::ModelPolicy;
use serde::{Deserialize, Serialize};

/// 策略规则 - 将模型名模式映射到 ModelPolicy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyRule {
    /// 模型模式（支持通配符）
    pub pattern: String,
    /// 优先级（数字越小优先级越高）
    #[serde(default)]
    pub priority: i32,
    #[serde(flatten)]
    pub policy: ModelPolicy,
}

impl PolicyRule {
    pub fn new(pattern: &str, priority: i32, policy: ModelPolicy) -> Self {
        Self {
            pattern: pattern.to_string(),
            priority,
            policy,
        }
    }

    /// 检查模型是否匹配此规则
    ///
    /// 支持的通配符模式：
    /// - 精确匹配: `devstral-small-2505`
    /// - 前缀匹配: `devstral-*`
    /// - 后缀匹配: `*-instruct`
    /// - 包含匹配: `*devstral*`
    /// - 前缀+后缀匹配: `mistral-*-latest`
    ///
    /// 比较时忽略大小写以及 `org/` 前缀。
    pub fn matches(&self, model: &str) -> bool {
        let model = normalize_model_name(model);
        let pattern = self.pattern.to_lowercase();

        if !pattern.contains('*') {
            return pattern == model;
        }

        let parts: Vec<&str> = pattern.split('*').collect();
        match parts.as_slice() {
            [prefix, ""] => model.starts_with(prefix),
            ["", suffix] => model.ends_with(suffix),
            ["", middle, ""] => model.contains(middle),
            [prefix, suffix] => {
                model.len() >= prefix.len() + suffix.len()
                    && model.starts_with(prefix)
                    && model.ends_with(suffix)
            }
            // 其他复杂模式暂不支持
            _ => false,
        }
    }

    /// 检查是否为精确匹配规则
    pub fn is_exact(&self) -> bool {
        !self.pattern.contains('*')
    }
}

/// 小写并去掉 `org/` 前缀
pub fn normalize_model_name(model: &str) -> String {
    let name = model.rsplit('/').next().unwrap_or(model);
    name.trim().to_lowercase()
}

/// 精确匹配优先，然后按优先级排序
impl Ord for PolicyRule {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self.is_exact(), other.is_exact()) {
            (true, false) => return std::cmp::Ordering::Less,
            (false, true) => return std::cmp::Ordering::Greater,
            _ => {}
        }
        self.priority.cmp(&other.priority)
    }
}

impl PartialOrd for PolicyRule {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for PolicyRule {}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str) -> PolicyRule {
        PolicyRule::new(pattern, 0, ModelPolicy::default())
    }

    #[test]
    fn test_wildcard_forms() {
        assert!(rule("devstral-small-2505").matches("devstral-small-2505"));
        assert!(!rule("devstral-small-2505").matches("devstral-small-2507"));
        assert!(rule("devstral-*").matches("devstral-small-2"));
        assert!(rule("*-instruct").matches("mistral-7b-instruct"));
        assert!(rule("*stral*").matches("codestral-22b"));
        assert!(rule("mistral-*-latest").matches("mistral-large-latest"));
        assert!(!rule("mistral-*-latest").matches("mistral-large-2411"));
        assert!(!rule("a*b*c*d").matches("abcd"));
    }

    #[test]
    fn test_case_and_org_prefix_are_ignored() {
        assert!(rule("devstral-*").matches("mistralai/Devstral-Small-2505"));
        assert!(rule("DEVSTRAL-SMALL-2505").matches("devstral-small-2505"));
        assert_eq!(normalize_model_name("mistralai/Devstral"), "devstral");
    }

    #[test]
    fn test_prefix_suffix_do_not_overlap() {
        // "ab-*-ab" 不应匹配 "ab"
        assert!(!rule("ab*ab").matches("ab"));
        assert!(rule("ab*ab").matches("abab"));
    }

    #[test]
    fn test_exact_rules_sort_first() {
        let mut rules = vec![
            PolicyRule::new("devstral-*", 0, ModelPolicy::default()),
            PolicyRule::new("devstral-small", 10, ModelPolicy::default()),
            PolicyRule::new("*stral*", -5, ModelPolicy::default()),
        ];
        rules.sort();
        assert_eq!(rules[0].pattern, "devstral-small");
        assert_eq!(rules[1].pattern, "*stral*");
        assert_eq!(rules[2].pattern, "devstral-*");
    }
}
