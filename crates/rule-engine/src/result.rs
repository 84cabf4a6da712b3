//! 结果模型

use crate::context::EvaluationContext;
use crate::error::Result;
use crate::value::{NativeValue, ValueDescriptor, ValueType};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::BitAnd;

/// 规则命中后的输出映射，键按插入顺序保存
///
/// 字面量条目在物化时原样输出载荷，`variable` 条目从上下文复制对应的值。
#[derive(Debug, Clone, Default)]
pub struct RuleResult {
    entries: Vec<(String, ValueDescriptor)>,
}

impl RuleResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一个条目，键已存在时覆盖
    pub fn add(mut self, key: impl Into<String>, value_type: ValueType, raw: impl Into<Value>) -> Self {
        self.insert(key.into(), ValueDescriptor::new(value_type, raw));
        self
    }

    /// 以文本标签添加条目
    pub fn try_add(self, key: impl Into<String>, tag: &str, raw: impl Into<Value>) -> Result<Self> {
        let value_type: ValueType = tag.parse()?;
        Ok(self.add(key, value_type, raw))
    }

    /// 以原生值添加字面量条目
    pub fn value(self, key: impl Into<String>, value: impl Into<NativeValue>) -> Self {
        let value = value.into();
        let value_type = value.value_type();
        self.add(key, value_type, value.to_json())
    }

    /// 添加引用上下文变量的条目
    pub fn variable(self, key: impl Into<String>, name: impl Into<String>) -> Self {
        self.add(key, ValueType::Variable, Value::String(name.into()))
    }

    pub fn insert(&mut self, key: String, descriptor: ValueDescriptor) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = descriptor,
            None => self.entries.push((key, descriptor)),
        }
    }

    /// 合并两个结果，键冲突时后者覆盖前者
    pub fn merge(mut self, other: RuleResult) -> Self {
        for (key, descriptor) in other.entries {
            self.insert(key, descriptor);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&ValueDescriptor> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, descriptor)| descriptor)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ValueDescriptor)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `variable` 条目引用的上下文键
    pub fn required_params(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter_map(|(_, descriptor)| descriptor.variable_name())
            .map(str::to_string)
            .collect()
    }

    /// 针对上下文物化为输出映射
    pub fn materialize(&self, context: &EvaluationContext) -> BTreeMap<String, NativeValue> {
        self.entries
            .iter()
            .map(|(key, descriptor)| {
                let value = match descriptor.variable_name() {
                    Some(name) => context.get(name).cloned().unwrap_or_default(),
                    None => NativeValue::from_json(descriptor.raw()),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

/// 按映射语义比较，不考虑键的顺序
impl PartialEq for RuleResult {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(key, descriptor)| other.get(key) == Some(descriptor))
    }
}

impl BitAnd for RuleResult {
    type Output = RuleResult;

    fn bitand(self, rhs: RuleResult) -> RuleResult {
        self.merge(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize_literal_and_variable() {
        let result = RuleResult::new()
            .add("xyz", ValueType::String, "Condition met")
            .variable("result", "number");
        let ctx = EvaluationContext::new().with("number", 5);

        let output = result.materialize(&ctx);
        assert_eq!(output["xyz"], NativeValue::from("Condition met"));
        assert_eq!(output["result"], NativeValue::Integer(5));
    }

    #[test]
    fn test_merge_last_write_wins() {
        let merged = RuleResult::new().add("k", ValueType::String, "first").variable("a", "x")
            & RuleResult::new().add("k", ValueType::String, "second").variable("b", "y");

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get("k").unwrap().raw(), &Value::from("second"));
        assert_eq!(
            merged.required_params().into_iter().collect::<Vec<_>>(),
            vec!["x".to_string(), "y".to_string()]
        );
        // 覆盖不改变原有键的位置
        let keys: Vec<_> = merged.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["k", "a", "b"]);
    }

    #[test]
    fn test_try_add_rejects_unknown_tag() {
        let err = RuleResult::new().try_add("k", "decimal", 1).unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_VALUE_TYPE");

        let result = RuleResult::new().try_add("k", "integer", 1).unwrap();
        assert_eq!(result.get("k").unwrap().value_type(), ValueType::Integer);
    }

    #[test]
    fn test_empty_result_materializes_empty_map() {
        let output = RuleResult::new().materialize(&EvaluationContext::new());
        assert!(output.is_empty());
    }
}
