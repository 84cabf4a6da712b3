//! 条件树
//!
//! 叶子条件比较一个上下文变量与一个值描述；组合条件以 and / or 连接两个及以上的子节点。
//! 必需参数在构造时计算并缓存，求值时不再重复计算。

use crate::context::EvaluationContext;
use crate::error::{Result, RuleError};
use crate::evaluator::ExpressionEvaluator;
use crate::factory::ComponentFactory;
use crate::models::{ComponentKind, Metadata};
use crate::operators::{LogicalOperator, Operator};
use crate::value::{NativeValue, ValueDescriptor};
use std::collections::BTreeSet;
use std::ops::{BitAnd, BitOr};

/// 叶子条件
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    metadata: Metadata,
    variable: String,
    operator: Operator,
    value: ValueDescriptor,
}

impl Condition {
    pub fn new(variable: impl Into<String>, operator: Operator, value: impl Into<NativeValue>) -> Self {
        ComponentFactory::default().condition(variable, operator, value)
    }

    /// 以文本操作符构造，操作符不在支持集合内时返回 `InvalidOperator`
    pub fn try_new(
        variable: impl Into<String>,
        operator: &str,
        value: impl Into<NativeValue>,
    ) -> Result<Self> {
        let variable = variable.into();
        if variable.is_empty() {
            return Err(RuleError::MissingConditionField("variable".to_string()));
        }
        let operator: Operator = operator.parse()?;
        Ok(Self::new(variable, operator, value))
    }

    pub fn from_parts(
        metadata: Metadata,
        variable: String,
        operator: Operator,
        value: ValueDescriptor,
    ) -> Self {
        Self {
            metadata,
            variable,
            operator,
            value,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &ValueDescriptor {
        &self.value
    }

    /// 左侧取上下文中的变量值，右侧解析值描述
    pub fn evaluate(&self, context: &EvaluationContext) -> Result<bool> {
        let left = context.get(&self.variable).cloned().unwrap_or_default();
        let right = self.value.resolve(context)?;
        ExpressionEvaluator::evaluate(self.operator, &left, &right)
    }
}

/// 组合条件（And / Or）
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeCondition {
    metadata: Metadata,
    operator: LogicalOperator,
    children: Vec<ConditionNode>,
    required_params: BTreeSet<String>,
}

impl CompositeCondition {
    pub fn and(children: Vec<ConditionNode>) -> Result<Self> {
        Self::with_default_metadata(LogicalOperator::And, children)
    }

    pub fn or(children: Vec<ConditionNode>) -> Result<Self> {
        Self::with_default_metadata(LogicalOperator::Or, children)
    }

    fn with_default_metadata(operator: LogicalOperator, children: Vec<ConditionNode>) -> Result<Self> {
        let metadata = ComponentFactory::default().metadata(ComponentKind::composite(operator));
        Self::from_parts(metadata, operator, children)
    }

    pub fn from_parts(
        metadata: Metadata,
        operator: LogicalOperator,
        children: Vec<ConditionNode>,
    ) -> Result<Self> {
        if children.len() < 2 {
            return Err(RuleError::InsufficientChildren(children.len()));
        }

        let required_params = children
            .iter()
            .flat_map(ConditionNode::required_params)
            .collect();

        Ok(Self {
            metadata,
            operator,
            children,
            required_params,
        })
    }

    fn pair(operator: LogicalOperator, left: ConditionNode, right: ConditionNode) -> Self {
        let metadata = ComponentFactory::default().metadata(ComponentKind::composite(operator));
        let required_params = left
            .required_params()
            .into_iter()
            .chain(right.required_params())
            .collect();

        Self {
            metadata,
            operator,
            children: vec![left, right],
            required_params,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn operator(&self) -> LogicalOperator {
        self.operator
    }

    pub fn children(&self) -> &[ConditionNode] {
        &self.children
    }

    pub fn required_params(&self) -> &BTreeSet<String> {
        &self.required_params
    }

    /// 短路求值：AND 遇到 false 立即返回，OR 遇到 true 立即返回
    pub fn evaluate(&self, context: &EvaluationContext) -> Result<bool> {
        match self.operator {
            LogicalOperator::And => {
                for child in &self.children {
                    if !child.evaluate(context)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            LogicalOperator::Or => {
                for child in &self.children {
                    if child.evaluate(context)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

/// 条件树节点
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    Condition(Condition),
    Composite(CompositeCondition),
}

impl ConditionNode {
    pub fn evaluate(&self, context: &EvaluationContext) -> Result<bool> {
        match self {
            Self::Condition(cond) => cond.evaluate(context),
            Self::Composite(group) => group.evaluate(context),
        }
    }

    /// 所有叶子条件变量的并集
    pub fn required_params(&self) -> BTreeSet<String> {
        match self {
            Self::Condition(cond) => BTreeSet::from([cond.variable.clone()]),
            Self::Composite(group) => group.required_params.clone(),
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Self::Condition(cond) => &cond.metadata,
            Self::Composite(group) => &group.metadata,
        }
    }
}

impl From<Condition> for ConditionNode {
    fn from(cond: Condition) -> Self {
        Self::Condition(cond)
    }
}

impl From<CompositeCondition> for ConditionNode {
    fn from(group: CompositeCondition) -> Self {
        Self::Composite(group)
    }
}

macro_rules! impl_combinators {
    ($($ty:ty),*) => {$(
        impl<R: Into<ConditionNode>> BitAnd<R> for $ty {
            type Output = ConditionNode;

            fn bitand(self, rhs: R) -> ConditionNode {
                CompositeCondition::pair(LogicalOperator::And, self.into(), rhs.into()).into()
            }
        }

        impl<R: Into<ConditionNode>> BitOr<R> for $ty {
            type Output = ConditionNode;

            fn bitor(self, rhs: R) -> ConditionNode {
                CompositeCondition::pair(LogicalOperator::Or, self.into(), rhs.into()).into()
            }
        }
    )*};
}

impl_combinators!(Condition, CompositeCondition, ConditionNode);

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> EvaluationContext {
        EvaluationContext::new()
            .with("number", 5)
            .with("str_var", "py_rules")
    }

    #[test]
    fn test_leaf_condition() {
        let ctx = context();
        assert!(Condition::new("number", Operator::Eq, 5).evaluate(&ctx).unwrap());
        assert!(!Condition::new("number", Operator::Gt, 10).evaluate(&ctx).unwrap());
        assert!(
            Condition::new("number", Operator::In, vec![1, 5, 3])
                .evaluate(&ctx)
                .unwrap()
        );
    }

    #[test]
    fn test_leaf_variable_operand() {
        let ctx = context().with("threshold", 3);
        let cond = Condition::from_parts(
            ComponentFactory::default().metadata(ComponentKind::Condition),
            "number".to_string(),
            Operator::Gt,
            ValueDescriptor::variable("threshold"),
        );
        assert!(cond.evaluate(&ctx).unwrap());
    }

    #[test]
    fn test_try_new_rejects_unknown_operator() {
        let err = Condition::try_new("number", "is_in", vec![1, 2]).unwrap_err();
        assert!(matches!(err, RuleError::InvalidOperator(op) if op == "is_in"));

        let err = Condition::try_new("", "=", 1).unwrap_err();
        assert_eq!(err.code(), "MISSING_CONDITION_FIELD");
    }

    #[test]
    fn test_and_or_combinators() {
        let ctx = context();
        let cond = Condition::new("number", Operator::In, vec![1, 5, 3])
            & Condition::new("number", Operator::Eq, 5)
            & Condition::new("number", Operator::Gt, 1)
            | Condition::new("number", Operator::Eq, 2);
        assert!(cond.evaluate(&ctx).unwrap());

        let cond = Condition::new("number", Operator::Eq, 5) & Condition::new("number", Operator::Lt, 1);
        assert!(!cond.evaluate(&ctx).unwrap());

        let cond = Condition::new("number", Operator::Eq, 6) | Condition::new("number", Operator::Eq, 5);
        assert!(cond.evaluate(&ctx).unwrap());
    }

    #[test]
    fn test_and_short_circuits_before_error() {
        // 第二个子条件会因类型不可比较而失败，但 AND 在第一个 false 处已返回
        let ctx = context();
        let cond = Condition::new("number", Operator::Eq, 6)
            & Condition::new("str_var", Operator::Gt, 1);
        assert!(!cond.evaluate(&ctx).unwrap());

        let cond = Condition::new("number", Operator::Eq, 5)
            & Condition::new("str_var", Operator::Gt, 1);
        assert!(cond.evaluate(&ctx).is_err());
    }

    #[test]
    fn test_required_params_closure() {
        let cond = Condition::new("a", Operator::Eq, 2)
            & (Condition::new("b", Operator::Eq, 5) | Condition::new("a", Operator::Gt, 0))
            & Condition::new("c", Operator::Gt, 1);

        let params = cond.required_params();
        assert_eq!(params.len(), 3);
        assert_eq!(
            params.into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn test_n_ary_composite() {
        let ctx = context();
        let group = CompositeCondition::and(vec![
            Condition::new("number", Operator::Gte, 5).into(),
            Condition::new("number", Operator::Lte, 5).into(),
            Condition::new("str_var", Operator::Eq, "py_rules").into(),
        ])
        .unwrap();
        assert_eq!(group.children().len(), 3);
        assert!(group.evaluate(&ctx).unwrap());

        let err = CompositeCondition::or(vec![]).unwrap_err();
        assert!(matches!(err, RuleError::InsufficientChildren(0)));
    }
}
