//! 规则引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("值描述缺少类型标签")]
    MissingValueType,

    #[error("未知的值类型: {0}")]
    UnknownValueType(String),

    #[error("无效的值: 无法将 {raw} 解析为 {value_type}")]
    InvalidValue { value_type: String, raw: String },

    #[error("无效的操作符: {0}")]
    InvalidOperator(String),

    #[error("无效的操作数: {operator} 需要 {expected}, 实际 {actual}")]
    InvalidOperand {
        operator: String,
        expected: String,
        actual: String,
    },

    #[error("类型不可比较: {left} {operator} {right}")]
    IncomparableTypes {
        operator: String,
        left: String,
        right: String,
    },

    #[error("条件缺少字段: {0}")]
    MissingConditionField(String),

    #[error("组合条件至少需要两个子条件, 实际 {0} 个")]
    InsufficientChildren(usize),

    #[error("上下文缺少必需参数: {0}")]
    MissingContextParameter(String),

    #[error("无效的上下文: 期望键值映射, 实际 {0}")]
    InvalidContext(String),

    #[error("规则缺少 if 条件: {0}")]
    MissingIfCondition(String),

    #[error("未知的组件类型: {0}")]
    UnknownComponentType(String),

    #[error("无效的规则结构: {0}")]
    InvalidStructure(String),

    #[error("版本不匹配: 期望 {expected}, 实际 {actual}")]
    VersionMismatch { expected: String, actual: String },

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuleError>;

impl RuleError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingValueType => "MISSING_VALUE_TYPE",
            Self::UnknownValueType(_) => "UNKNOWN_VALUE_TYPE",
            Self::InvalidValue { .. } => "INVALID_VALUE",
            Self::InvalidOperator(_) => "INVALID_OPERATOR",
            Self::InvalidOperand { .. } => "INVALID_OPERAND",
            Self::IncomparableTypes { .. } => "INCOMPARABLE_TYPES",
            Self::MissingConditionField(_) => "MISSING_CONDITION_FIELD",
            Self::InsufficientChildren(_) => "INSUFFICIENT_CHILDREN",
            Self::MissingContextParameter(_) => "MISSING_CONTEXT_PARAMETER",
            Self::InvalidContext(_) => "INVALID_CONTEXT",
            Self::MissingIfCondition(_) => "MISSING_IF_CONDITION",
            Self::UnknownComponentType(_) => "UNKNOWN_COMPONENT_TYPE",
            Self::InvalidStructure(_) => "INVALID_STRUCTURE",
            Self::VersionMismatch { .. } => "VERSION_MISMATCH",
            Self::JsonError(_) => "JSON_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = RuleError::MissingContextParameter("number".to_string());
        assert_eq!(err.code(), "MISSING_CONTEXT_PARAMETER");
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn test_json_error_conversion() {
        let err: RuleError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.code(), "JSON_ERROR");
    }
}
