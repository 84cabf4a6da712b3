//! 规则结构校验
//!
//! 在构造组件之前检查原始结构的形状，错误信息带有出错位置的路径（如 `root.if.and[1]`）。

use crate::error::{Result, RuleError};
use serde_json::Value;
use tracing::warn;

/// 规则结构校验器
pub struct RuleValidator;

impl RuleValidator {
    /// 校验一条规则的结构
    pub fn validate(structure: &Value) -> Result<()> {
        Self::validate_rule(structure, "root").inspect_err(|e| {
            warn!(error = %e, code = e.code(), "规则结构校验失败");
        })
    }

    fn validate_rule(rule: &Value, path: &str) -> Result<()> {
        let Value::Object(map) = rule else {
            return Err(RuleError::InvalidStructure(format!("'{}' 必须是对象", path)));
        };

        if let Some(metadata) = map.get("metadata")
            && !metadata.is_null()
            && !metadata.is_object()
        {
            return Err(RuleError::InvalidStructure(format!(
                "'{}.metadata' 必须是对象",
                path
            )));
        }

        match map.get("if") {
            Some(condition) if !condition.is_null() => {
                Self::validate_condition(condition, &format!("{}.if", path))?;
            }
            _ => return Err(RuleError::MissingIfCondition(path.to_string())),
        }

        for branch in ["then", "else"] {
            if let Some(action) = map.get(branch)
                && !action.is_null()
            {
                Self::validate_action(action, &format!("{}.{}", path, branch))?;
            }
        }

        Ok(())
    }

    fn validate_condition(condition: &Value, path: &str) -> Result<()> {
        let Value::Object(map) = condition else {
            return Err(RuleError::InvalidStructure(format!("条件 '{}' 必须是对象", path)));
        };

        for key in ["and", "or"] {
            if let Some(children) = map.get(key) {
                let Value::Array(children) = children else {
                    return Err(RuleError::InvalidStructure(format!(
                        "'{}.{}' 必须是数组",
                        path, key
                    )));
                };
                if children.len() < 2 {
                    return Err(RuleError::InsufficientChildren(children.len()));
                }
                for (i, child) in children.iter().enumerate() {
                    Self::validate_condition(child, &format!("{}.{}[{}]", path, key, i))?;
                }
                return Ok(());
            }
        }

        let Some(leaf) = map.get("condition") else {
            return Err(RuleError::UnknownComponentType(path.to_string()));
        };
        let Value::Object(leaf) = leaf else {
            return Err(RuleError::InvalidStructure(format!(
                "'{}.condition' 必须是对象",
                path
            )));
        };

        for field in ["variable", "operator", "value"] {
            if leaf.get(field).is_none_or(Value::is_null) {
                return Err(RuleError::MissingConditionField(format!(
                    "{}.condition.{}",
                    path, field
                )));
            }
        }

        Ok(())
    }

    fn validate_action(action: &Value, path: &str) -> Result<()> {
        let Value::Object(map) = action else {
            return Err(RuleError::InvalidStructure(format!("分支 '{}' 必须是对象", path)));
        };

        if let Some(result) = map.get("result") {
            return match result {
                Value::Object(_) => Ok(()),
                _ => Err(RuleError::InvalidStructure(format!(
                    "'{}.result' 必须是对象",
                    path
                ))),
            };
        }

        if map.contains_key("if") {
            return Self::validate_rule(action, path);
        }

        Err(RuleError::UnknownComponentType(path.to_string()))
    }
}
