//! 规则引擎领域模型

use crate::condition::ConditionNode;
use crate::error::{Result, RuleError};
use crate::factory::ComponentFactory;
use crate::operators::LogicalOperator;
use crate::result::RuleResult;
use crate::value::NativeValue;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

pub use rules_shared::config::SCHEMA_VERSION;

/// 组件类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Condition,
    AndCondition,
    OrCondition,
    Rule,
}

impl ComponentKind {
    pub fn composite(operator: LogicalOperator) -> Self {
        match operator {
            LogicalOperator::And => Self::AndCondition,
            LogicalOperator::Or => Self::OrCondition,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Condition => "Condition",
            Self::AndCondition => "AndCondition",
            Self::OrCondition => "OrCondition",
            Self::Rule => "Rule",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Condition" => Ok(Self::Condition),
            "AndCondition" => Ok(Self::AndCondition),
            "OrCondition" => Ok(Self::OrCondition),
            "Rule" => Ok(Self::Rule),
            other => Err(RuleError::UnknownComponentType(other.to_string())),
        }
    }
}

/// 组件元数据，标识与创建时间在构造时生成一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub version: String,
    pub kind: ComponentKind,
    pub id: String,
    pub created: DateTime<Utc>,
}

/// then / else 分支
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Result(RuleResult),
    Rule(Box<Rule>),
}

impl Action {
    pub fn required_params(&self) -> BTreeSet<String> {
        match self {
            Self::Result(result) => result.required_params(),
            Self::Rule(rule) => rule.required_params.clone(),
        }
    }
}

impl From<RuleResult> for Action {
    fn from(result: RuleResult) -> Self {
        Self::Result(result)
    }
}

impl From<Rule> for Action {
    fn from(rule: Rule) -> Self {
        Self::Rule(Box::new(rule))
    }
}

/// 规则求值结果：布尔判定或物化后的输出映射
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Verdict(bool),
    Result(BTreeMap<String, NativeValue>),
}

impl Evaluation {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Verdict(v) => Some(*v),
            Self::Result(_) => None,
        }
    }

    pub fn as_result(&self) -> Option<&BTreeMap<String, NativeValue>> {
        match self {
            Self::Verdict(_) => None,
            Self::Result(map) => Some(map),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Verdict(v) => Value::Bool(*v),
            Self::Result(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// 规则
///
/// 由 [`RuleBuilder`] 按 `if_condition` → `then_action` → `else_action` 的顺序构建，
/// 构建完成后除元数据隐藏开关外不可变。
/// 嵌套规则挂到 then / else 上时，其 `parent_id` 被设置为外层规则的标识。
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    metadata: Metadata,
    name: String,
    parent_id: Option<String>,
    condition: ConditionNode,
    then_branch: Option<Action>,
    else_branch: Option<Action>,
    /// 解析时从元数据恢复的必需参数
    recorded_params: BTreeSet<String>,
    required_params: BTreeSet<String>,
    hide_metadata: bool,
}

impl Rule {
    /// 开始构建一条规则
    pub fn new(name: impl Into<String>) -> RuleBuilder {
        ComponentFactory::default().rule(name)
    }

    pub(crate) fn assemble(
        head: RuleHead,
        condition: ConditionNode,
        then_branch: Option<Action>,
        else_branch: Option<Action>,
    ) -> Self {
        let mut rule = Self {
            metadata: head.metadata,
            name: head.name,
            parent_id: head.parent_id,
            condition,
            then_branch,
            else_branch,
            recorded_params: BTreeSet::new(),
            required_params: BTreeSet::new(),
            hide_metadata: false,
        };

        let id = rule.metadata.id.clone();
        for branch in [&mut rule.then_branch, &mut rule.else_branch] {
            if let Some(Action::Rule(nested)) = branch {
                nested.parent_id = Some(id.clone());
            }
        }
        rule.refresh_required_params();
        rule
    }

    /// 必需参数为 if / then / else 当前内容的并集，再加上元数据中记录的参数
    fn refresh_required_params(&mut self) {
        let mut params = self.condition.required_params();
        for action in [&self.then_branch, &self.else_branch].into_iter().flatten() {
            params.extend(action.required_params());
        }
        params.extend(self.recorded_params.iter().cloned());
        self.required_params = params;
    }

    /// 合并元数据中记录的必需参数
    pub(crate) fn record_params<I>(&mut self, params: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.recorded_params.extend(params);
        self.refresh_required_params();
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn condition(&self) -> &ConditionNode {
        &self.condition
    }

    pub fn then_branch(&self) -> Option<&Action> {
        self.then_branch.as_ref()
    }

    pub fn else_branch(&self) -> Option<&Action> {
        self.else_branch.as_ref()
    }

    /// if / then / else 中引用的全部上下文键（含嵌套规则）
    pub fn required_params(&self) -> &BTreeSet<String> {
        &self.required_params
    }

    pub fn hide_metadata(&self) -> bool {
        self.hide_metadata
    }

    /// 只影响序列化与内容相等比较，不影响求值
    pub fn set_hide_metadata(&mut self, hide: bool) {
        self.hide_metadata = hide;
    }

    pub fn with_hidden_metadata(mut self) -> Self {
        self.hide_metadata = true;
        self
    }
}

// ============================================================================
// 构建器
// ============================================================================

/// 规则的标识部分，在构建开始时确定
#[derive(Debug, Clone)]
pub(crate) struct RuleHead {
    pub(crate) metadata: Metadata,
    pub(crate) name: String,
    pub(crate) parent_id: Option<String>,
}

/// 尚未设置 if 条件
#[derive(Debug)]
pub struct Start;

/// 已设置 if 条件
#[derive(Debug)]
pub struct Conditioned {
    condition: ConditionNode,
}

/// 已设置 then 分支
#[derive(Debug)]
pub struct Branched {
    condition: ConditionNode,
    then_branch: Action,
}

/// 规则构建器
///
/// 构建阶段编码在类型参数中：没有 if 条件时不能设置分支，
/// 设置 else 后构建即结束，因此不能再设置 then。
///
/// ```
/// use rule_engine::{Condition, Operator, Rule, RuleResult, ValueType};
///
/// let rule: Rule = Rule::new("adult")
///     .if_condition(Condition::new("age", Operator::Gte, 18))
///     .then_action(RuleResult::new().add("adult", ValueType::Boolean, true))
///     .build();
/// assert_eq!(rule.required_params().len(), 1);
/// ```
///
/// 未设置条件就设置分支无法通过编译：
///
/// ```compile_fail
/// use rule_engine::{Rule, RuleResult};
///
/// let _ = Rule::new("no if").then_action(RuleResult::new());
/// ```
///
/// 设置 else 之后再设置 then 同样无法通过编译：
///
/// ```compile_fail
/// use rule_engine::{Condition, Operator, Rule, RuleResult};
///
/// let _ = Rule::new("reversed")
///     .if_condition(Condition::new("n", Operator::Eq, 1))
///     .else_action(RuleResult::new())
///     .then_action(RuleResult::new());
/// ```
#[derive(Debug)]
pub struct RuleBuilder<S = Start> {
    head: RuleHead,
    state: S,
}

impl RuleBuilder<Start> {
    pub(crate) fn new(metadata: Metadata, name: String, parent_id: Option<String>) -> Self {
        Self {
            head: RuleHead {
                metadata,
                name,
                parent_id,
            },
            state: Start,
        }
    }

    pub fn if_condition(self, condition: impl Into<ConditionNode>) -> RuleBuilder<Conditioned> {
        RuleBuilder {
            head: self.head,
            state: Conditioned {
                condition: condition.into(),
            },
        }
    }
}

impl RuleBuilder<Conditioned> {
    pub fn then_action(self, action: impl Into<Action>) -> RuleBuilder<Branched> {
        RuleBuilder {
            head: self.head,
            state: Branched {
                condition: self.state.condition,
                then_branch: action.into(),
            },
        }
    }

    /// 没有 then 分支，只设置 else
    pub fn else_action(self, action: impl Into<Action>) -> Rule {
        Rule::assemble(self.head, self.state.condition, None, Some(action.into()))
    }

    pub fn build(self) -> Rule {
        Rule::assemble(self.head, self.state.condition, None, None)
    }
}

impl RuleBuilder<Branched> {
    pub fn else_action(self, action: impl Into<Action>) -> Rule {
        Rule::assemble(
            self.head,
            self.state.condition,
            Some(self.state.then_branch),
            Some(action.into()),
        )
    }

    pub fn build(self) -> Rule {
        Rule::assemble(
            self.head,
            self.state.condition,
            Some(self.state.then_branch),
            None,
        )
    }
}

impl From<RuleBuilder<Conditioned>> for Rule {
    fn from(builder: RuleBuilder<Conditioned>) -> Self {
        builder.build()
    }
}

impl From<RuleBuilder<Branched>> for Rule {
    fn from(builder: RuleBuilder<Branched>) -> Self {
        builder.build()
    }
}

impl From<RuleBuilder<Conditioned>> for Action {
    fn from(builder: RuleBuilder<Conditioned>) -> Self {
        Self::from(builder.build())
    }
}

impl From<RuleBuilder<Branched>> for Action {
    fn from(builder: RuleBuilder<Branched>) -> Self {
        Self::from(builder.build())
    }
}
