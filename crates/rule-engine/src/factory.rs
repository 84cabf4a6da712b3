//! 组件工厂
//!
//! 组件的标识与创建时间在构造时生成一次。标识生成器与时钟作为显式依赖注入，
//! 测试中可以替换为确定性的实现，得到可复现的结构。

use crate::condition::{CompositeCondition, Condition, ConditionNode};
use crate::error::Result;
use crate::models::{ComponentKind, Metadata, RuleBuilder, SCHEMA_VERSION};
use crate::operators::{LogicalOperator, Operator};
use crate::value::{NativeValue, ValueDescriptor};
use chrono::{DateTime, SubsecRound, Utc};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// 组件标识生成器
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// 时钟
#[cfg_attr(test, mockall::automock)]
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// UUID v4 标识
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// 带前缀的递增标识，如 `rule-1`, `rule-2`
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-{}", self.prefix, n)
    }
}

/// 系统时钟，精度截断到微秒以便文本往返
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }
}

/// 固定时钟
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// 组件工厂
#[derive(Clone)]
pub struct ComponentFactory {
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock + Send + Sync>,
    version: String,
}

impl ComponentFactory {
    pub fn new(
        ids: impl IdGenerator + 'static,
        clock: impl Clock + Send + Sync + 'static,
    ) -> Self {
        Self {
            ids: Arc::new(ids),
            clock: Arc::new(clock),
            version: SCHEMA_VERSION.to_string(),
        }
    }

    /// 指定写入元数据的结构版本
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// 生成新的元数据块
    pub fn metadata(&self, kind: ComponentKind) -> Metadata {
        Metadata {
            version: self.version.clone(),
            kind,
            id: self.ids.next_id(),
            created: self.clock.now(),
        }
    }

    pub fn condition(
        &self,
        variable: impl Into<String>,
        operator: Operator,
        value: impl Into<NativeValue>,
    ) -> Condition {
        Condition::from_parts(
            self.metadata(ComponentKind::Condition),
            variable.into(),
            operator,
            ValueDescriptor::from_native(value.into()),
        )
    }

    pub fn and(&self, children: Vec<ConditionNode>) -> Result<ConditionNode> {
        self.composite(LogicalOperator::And, children)
    }

    pub fn or(&self, children: Vec<ConditionNode>) -> Result<ConditionNode> {
        self.composite(LogicalOperator::Or, children)
    }

    fn composite(
        &self,
        operator: LogicalOperator,
        children: Vec<ConditionNode>,
    ) -> Result<ConditionNode> {
        let metadata = self.metadata(ComponentKind::composite(operator));
        CompositeCondition::from_parts(metadata, operator, children).map(ConditionNode::from)
    }

    pub fn rule(&self, name: impl Into<String>) -> RuleBuilder {
        RuleBuilder::new(self.metadata(ComponentKind::Rule), name.into(), None)
    }
}

impl Default for ComponentFactory {
    fn default() -> Self {
        Self::new(UuidGenerator, SystemClock)
    }
}

impl fmt::Debug for ComponentFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentFactory")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}
