//! 决策规则引擎
//!
//! 以对象图描述业务判定逻辑，并针对运行时上下文求值：
//! - 带类型标签的值描述，求值时才解析
//! - 条件树（叶子条件 + and / or 组合），短路求值
//! - 规则的 then / else 分支可以是结果映射或嵌套规则
//! - 结构序列化与解析，以规范化形式定义内容相等

pub mod codec;
pub mod condition;
pub mod context;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod factory;
pub mod models;
pub mod operators;
pub mod result;
pub mod validator;
pub mod value;

pub use codec::{
    Component, ParserConfig, RuleParser, canonicalize, load_from_json, serialize, structures_eq,
};
pub use condition::{CompositeCondition, Condition, ConditionNode};
pub use context::EvaluationContext;
pub use engine::{EngineConfig, EvaluationReport, RuleEngine};
pub use error::{Result, RuleError};
pub use evaluator::ExpressionEvaluator;
pub use factory::{
    Clock, ComponentFactory, FixedClock, IdGenerator, SequentialIdGenerator, SystemClock,
    UuidGenerator,
};
pub use models::{
    Action, Branched, ComponentKind, Conditioned, Evaluation, Metadata, Rule, RuleBuilder,
    SCHEMA_VERSION, Start,
};
pub use operators::{LogicalOperator, Operator};
pub use result::RuleResult;
pub use validator::RuleValidator;
pub use value::{NativeValue, ValueDescriptor, ValueType};
