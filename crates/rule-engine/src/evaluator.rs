//! 表达式评估器
//!
//! 对两个已解析的操作数应用比较操作符。
//!
//! 相等、不等与包含检查不要求两侧类型一致，类型不同即视为不相等；
//! 有序比较要求两侧为同一运行时类型，否则返回 `IncomparableTypes`。

use crate::error::{Result, RuleError};
use crate::operators::Operator;
use crate::value::NativeValue;
use std::cmp::Ordering;

/// 表达式评估器
pub struct ExpressionEvaluator;

impl ExpressionEvaluator {
    /// 评估表达式
    ///
    /// # Arguments
    /// * `operator` - 操作符
    /// * `left` - 左操作数（上下文中的变量值）
    /// * `right` - 右操作数（条件中的值）
    pub fn evaluate(operator: Operator, left: &NativeValue, right: &NativeValue) -> Result<bool> {
        match operator {
            Operator::Eq | Operator::DoubleEq => Ok(Self::eq(left, right)),
            Operator::Neq => Ok(!Self::eq(left, right)),
            Operator::Gt => Self::compare(operator, left, right, Ordering::is_gt),
            Operator::Gte => Self::compare(operator, left, right, Ordering::is_ge),
            Operator::Lt => Self::compare(operator, left, right, Ordering::is_lt),
            Operator::Lte => Self::compare(operator, left, right, Ordering::is_le),
            Operator::Between => Self::between(left, right),
            Operator::In => Self::in_list(operator, left, right),
            Operator::NotIn => Self::in_list(operator, left, right).map(|r| !r),
        }
    }

    /// 相等比较，整数与浮点数按数值比较
    fn eq(left: &NativeValue, right: &NativeValue) -> bool {
        match (left, right) {
            (NativeValue::Integer(i), NativeValue::Float(f))
            | (NativeValue::Float(f), NativeValue::Integer(i)) => (*i as f64) == *f,
            (NativeValue::List(a), NativeValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Self::eq(x, y))
            }
            (NativeValue::Map(a), NativeValue::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, x)| b.get(k).is_some_and(|y| Self::eq(x, y)))
            }
            _ => left == right,
        }
    }

    /// 有序比较；NaN 参与的比较结果为 false
    fn compare<F>(operator: Operator, left: &NativeValue, right: &NativeValue, cmp: F) -> Result<bool>
    where
        F: Fn(Ordering) -> bool,
    {
        Ok(Self::ordering(operator, left, right)?.is_some_and(cmp))
    }

    fn ordering(
        operator: Operator,
        left: &NativeValue,
        right: &NativeValue,
    ) -> Result<Option<Ordering>> {
        let ordering = match (left, right) {
            (NativeValue::Boolean(a), NativeValue::Boolean(b)) => Some(a.cmp(b)),
            (NativeValue::Integer(a), NativeValue::Integer(b)) => Some(a.cmp(b)),
            (NativeValue::Float(a), NativeValue::Float(b)) => a.partial_cmp(b),
            (NativeValue::String(a), NativeValue::String(b)) => Some(a.cmp(b)),
            (NativeValue::Date(a), NativeValue::Date(b)) => Some(a.cmp(b)),
            (NativeValue::DateTime(a), NativeValue::DateTime(b)) => Some(a.cmp(b)),
            (NativeValue::List(a), NativeValue::List(b)) => {
                // 逐元素的字典序比较
                for (x, y) in a.iter().zip(b) {
                    match Self::ordering(operator, x, y)? {
                        Some(Ordering::Equal) => continue,
                        other => return Ok(other),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => {
                return Err(RuleError::IncomparableTypes {
                    operator: operator.to_string(),
                    left: left.type_name().to_string(),
                    right: right.type_name().to_string(),
                });
            }
        };
        Ok(ordering)
    }

    /// 范围比较 (between)
    /// right 应为 [low, high] 列表，low <= left <= high
    fn between(left: &NativeValue, right: &NativeValue) -> Result<bool> {
        let bounds = match right {
            NativeValue::List(items) if items.len() == 2 => items,
            other => {
                return Err(RuleError::InvalidOperand {
                    operator: Operator::Between.to_string(),
                    expected: "list [low, high]".to_string(),
                    actual: other.type_name().to_string(),
                });
            }
        };

        let above_low =
            Self::ordering(Operator::Between, &bounds[0], left)?.is_some_and(Ordering::is_le);
        let below_high =
            Self::ordering(Operator::Between, left, &bounds[1])?.is_some_and(Ordering::is_le);
        Ok(above_low && below_high)
    }

    /// 列表包含检查 (in / not in)
    fn in_list(operator: Operator, left: &NativeValue, right: &NativeValue) -> Result<bool> {
        let NativeValue::List(items) = right else {
            return Err(RuleError::InvalidOperand {
                operator: operator.to_string(),
                expected: "list".to_string(),
                actual: right.type_name().to_string(),
            });
        };

        Ok(items.iter().any(|item| Self::eq(left, item)))
    }
}
