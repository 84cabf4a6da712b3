//! 规则操作符定义

use crate::error::{Result, RuleError};
use std::fmt;
use std::str::FromStr;

/// 条件操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    // 相等比较（`=` 与 `==` 两种拼写语义相同）
    Eq,
    DoubleEq,
    Neq,

    // 有序比较
    Gt,
    Gte,
    Lt,
    Lte,
    Between,

    // 包含检查
    In,
    NotIn,
}

impl Operator {
    pub const ALL: [Operator; 10] = [
        Self::Eq,
        Self::DoubleEq,
        Self::Neq,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::Between,
        Self::In,
        Self::NotIn,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::DoubleEq => "==",
            Self::Neq => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Between => "between",
            Self::In => "in",
            Self::NotIn => "not in",
        }
    }

    /// 是否要求两侧操作数为同一运行时类型
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Self::Gt | Self::Gte | Self::Lt | Self::Lte | Self::Between
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.symbol() == s)
            .ok_or_else(|| RuleError::InvalidOperator(s.to_string()))
    }
}

/// 逻辑操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    /// 结构中使用的键名
    pub fn key(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_symbols() {
        for op in Operator::ALL {
            assert_eq!(op.symbol().parse::<Operator>().unwrap(), op);
        }
        assert_eq!("not in".parse::<Operator>().unwrap(), Operator::NotIn);
    }

    #[test]
    fn test_invalid_operator() {
        let err = "~=".parse::<Operator>().unwrap_err();
        assert!(matches!(err, RuleError::InvalidOperator(op) if op == "~="));
    }
}
