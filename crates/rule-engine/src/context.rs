//! 评估上下文

use crate::error::{Result, RuleError};
use crate::value::NativeValue;
use serde_json::Value;
use std::collections::BTreeMap;

/// 评估上下文 - 变量名到运行时值的映射
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationContext {
    data: BTreeMap<String, NativeValue>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 JSON 值创建，非对象时返回 `InvalidContext`
    pub fn from_value(data: Value) -> Result<Self> {
        match data {
            Value::Object(map) => Ok(Self {
                data: map
                    .into_iter()
                    .map(|(k, v)| (k, NativeValue::from_json(&v)))
                    .collect(),
            }),
            other => Err(RuleError::InvalidContext(
                NativeValue::from_json(&other).type_name().to_string(),
            )),
        }
    }

    /// 从 JSON 字符串创建
    pub fn from_json(json: &str) -> Result<Self> {
        let data: Value = serde_json::from_str(json)?;
        Self::from_value(data)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<NativeValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<NativeValue>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&NativeValue> {
        self.data.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 返回第一个不在上下文中的参数名
    pub fn first_missing<'a, I>(&self, required: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a String>,
    {
        required
            .into_iter()
            .find(|name| !self.data.contains_key(name.as_str()))
            .map(String::as_str)
    }
}

impl TryFrom<Value> for EvaluationContext {
    type Error = RuleError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

impl<K, V> FromIterator<(K, V)> for EvaluationContext
where
    K: Into<String>,
    V: Into<NativeValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            data: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value() {
        let ctx = EvaluationContext::from_value(json!({
            "number": 5,
            "ratio": 0.5,
            "name": "py_rules",
            "tags": ["a", "b"]
        }))
        .unwrap();

        assert_eq!(ctx.get("number"), Some(&NativeValue::Integer(5)));
        assert_eq!(ctx.get("ratio"), Some(&NativeValue::Float(0.5)));
        assert_eq!(ctx.get("name"), Some(&NativeValue::from("py_rules")));
        assert_eq!(ctx.get("tags"), Some(&NativeValue::from(vec!["a", "b"])));
        assert_eq!(ctx.get("nonexistent"), None);
    }

    #[test]
    fn test_non_object_is_invalid() {
        let err = EvaluationContext::from_value(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, RuleError::InvalidContext(t) if t == "list"));

        let err = EvaluationContext::from_json("\"text\"").unwrap_err();
        assert_eq!(err.code(), "INVALID_CONTEXT");
    }

    #[test]
    fn test_first_missing() {
        let ctx: EvaluationContext = [("a", 1), ("c", 3)].into_iter().collect();
        let required = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(ctx.first_missing(&required), Some("b"));
        assert_eq!(ctx.first_missing(&required[..1]), None);
    }
}
