//! 值描述与解析
//!
//! 值描述是带类型标签的 `{type, value}` 对。字面量在求值时才转换为原生值，
//! `variable` 类型的描述在求值时针对当前上下文查找，因此同一条规则可以
//! 在不同上下文中重复使用而无需重新解析。

use crate::context::EvaluationContext;
use crate::error::{Result, RuleError};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 日期的文本格式
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// 日期时间的文本格式（小数秒可选）
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// 值类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Boolean,
    Integer,
    Float,
    String,
    Date,
    DateTime,
    List,
    Map,
    Null,
    Variable,
}

impl ValueType {
    /// 结构中使用的标签拼写
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "bool",
            Self::Integer => "int",
            Self::Float => "float",
            Self::String => "str",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::List => "list",
            Self::Map => "dict",
            Self::Null => "NoneType",
            Self::Variable => "variable",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bool" | "boolean" => Ok(Self::Boolean),
            "int" | "integer" => Ok(Self::Integer),
            "float" => Ok(Self::Float),
            "str" | "string" => Ok(Self::String),
            "date" => Ok(Self::Date),
            "datetime" => Ok(Self::DateTime),
            "list" => Ok(Self::List),
            "dict" | "map" => Ok(Self::Map),
            "NoneType" | "null" => Ok(Self::Null),
            "variable" => Ok(Self::Variable),
            other => Err(RuleError::UnknownValueType(other.to_string())),
        }
    }
}

/// 解析后的原生值
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NativeValue {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    List(Vec<NativeValue>),
    Map(BTreeMap<String, NativeValue>),
}

impl NativeValue {
    /// 运行时类型
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Null => ValueType::Null,
            Self::Boolean(_) => ValueType::Boolean,
            Self::Integer(_) => ValueType::Integer,
            Self::Float(_) => ValueType::Float,
            Self::String(_) => ValueType::String,
            Self::Date(_) => ValueType::Date,
            Self::DateTime(_) => ValueType::DateTime,
            Self::List(_) => ValueType::List,
            Self::Map(_) => ValueType::Map,
        }
    }

    /// 运行时类型名称（用于错误信息）
    pub fn type_name(&self) -> &'static str {
        self.value_type().as_str()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// 从 JSON 值转换，整数优先保留为 `Integer`
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// 转换为 JSON 值，日期按文本格式输出
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Boolean(b) => Value::Bool(*b),
            Self::Integer(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::String(s) => Value::String(s.clone()),
            Self::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
            Self::DateTime(dt) => Value::String(dt.format(DATETIME_FORMAT).to_string()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

impl From<bool> for NativeValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for NativeValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for NativeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for NativeValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for NativeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for NativeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<NaiveDate> for NativeValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for NativeValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl<T: Into<NativeValue>> From<Vec<T>> for NativeValue {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<NativeValue>> From<BTreeMap<String, T>> for NativeValue {
    fn from(value: BTreeMap<String, T>) -> Self {
        Self::Map(value.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<NativeValue>> From<Option<T>> for NativeValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<Value> for NativeValue {
    fn from(value: Value) -> Self {
        Self::from_json(&value)
    }
}

/// 值描述：类型标签 + 原始载荷
///
/// `list` / `dict` 的载荷中嵌套的是值描述的结构形式，在求值时逐个解析。
#[derive(Debug, Clone, PartialEq)]
pub struct ValueDescriptor {
    value_type: ValueType,
    raw: Value,
}

impl ValueDescriptor {
    pub fn new(value_type: ValueType, raw: impl Into<Value>) -> Self {
        Self {
            value_type,
            raw: raw.into(),
        }
    }

    /// 引用上下文变量
    pub fn variable(name: impl Into<String>) -> Self {
        Self::new(ValueType::Variable, Value::String(name.into()))
    }

    pub fn null() -> Self {
        Self::new(ValueType::Null, Value::Null)
    }

    /// 按原生值自动打标签
    pub fn from_native(value: NativeValue) -> Self {
        let value_type = value.value_type();
        let raw = match value {
            NativeValue::List(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| Self::from_native(item).to_structure())
                    .collect(),
            ),
            NativeValue::Map(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_native(v).to_structure()))
                    .collect(),
            ),
            other => other.to_json(),
        };
        Self { value_type, raw }
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// 变量描述引用的上下文键
    pub fn variable_name(&self) -> Option<&str> {
        match self.value_type {
            ValueType::Variable => self.raw.as_str(),
            _ => None,
        }
    }

    /// 结构形式 `{"type": ..., "value": ...}`
    pub fn to_structure(&self) -> Value {
        let mut map = Map::new();
        map.insert(
            "type".to_string(),
            Value::String(self.value_type.as_str().to_string()),
        );
        map.insert("value".to_string(), self.raw.clone());
        Value::Object(map)
    }

    /// 从结构形式恢复，嵌套的 list / dict 元素同样校验
    pub fn from_structure(data: &Value) -> Result<Self> {
        let tag = data
            .get("type")
            .filter(|t| !t.is_null())
            .ok_or(RuleError::MissingValueType)?;
        let tag = tag
            .as_str()
            .ok_or_else(|| RuleError::UnknownValueType(tag.to_string()))?;
        let value_type: ValueType = tag.parse()?;
        let raw = data.get("value").cloned().unwrap_or(Value::Null);

        match (value_type, &raw) {
            (ValueType::List, Value::Array(items)) => {
                for item in items {
                    Self::from_structure(item)?;
                }
            }
            (ValueType::Map, Value::Object(map)) => {
                for item in map.values() {
                    Self::from_structure(item)?;
                }
            }
            (ValueType::List, other) | (ValueType::Map, other) => {
                return Err(invalid_value(value_type, other));
            }
            _ => {}
        }

        Ok(Self { value_type, raw })
    }

    /// 针对上下文解析为原生值
    ///
    /// 缺失的变量解析为 `Null`，不报错；必需参数的校验由引擎在求值前完成。
    pub fn resolve(&self, context: &EvaluationContext) -> Result<NativeValue> {
        let raw = &self.raw;
        match self.value_type {
            ValueType::Boolean => parse_boolean(raw),
            ValueType::Integer => parse_integer(raw),
            ValueType::Float => parse_float(raw),
            ValueType::String => Ok(NativeValue::String(match raw {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })),
            ValueType::Date => raw
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
                .map(NativeValue::Date)
                .ok_or_else(|| invalid_value(ValueType::Date, raw)),
            ValueType::DateTime => raw
                .as_str()
                .and_then(|s| NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).ok())
                .map(NativeValue::DateTime)
                .ok_or_else(|| invalid_value(ValueType::DateTime, raw)),
            ValueType::List => {
                let items = raw
                    .as_array()
                    .ok_or_else(|| invalid_value(ValueType::List, raw))?;
                items
                    .iter()
                    .map(|item| Self::from_structure(item)?.resolve(context))
                    .collect::<Result<Vec<_>>>()
                    .map(NativeValue::List)
            }
            ValueType::Map => {
                let map = raw
                    .as_object()
                    .ok_or_else(|| invalid_value(ValueType::Map, raw))?;
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), Self::from_structure(v)?.resolve(context)?)))
                    .collect::<Result<BTreeMap<_, _>>>()
                    .map(NativeValue::Map)
            }
            ValueType::Null => Ok(NativeValue::Null),
            ValueType::Variable => {
                let key = raw
                    .as_str()
                    .ok_or_else(|| invalid_value(ValueType::Variable, raw))?;
                Ok(context.get(key).cloned().unwrap_or_default())
            }
        }
    }
}

impl From<NativeValue> for ValueDescriptor {
    fn from(value: NativeValue) -> Self {
        Self::from_native(value)
    }
}

fn invalid_value(value_type: ValueType, raw: &Value) -> RuleError {
    RuleError::InvalidValue {
        value_type: value_type.to_string(),
        raw: raw.to_string(),
    }
}

fn parse_boolean(raw: &Value) -> Result<NativeValue> {
    let parsed = match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" | "" => Some(false),
            _ => None,
        },
        Value::Null => Some(false),
        _ => None,
    };
    parsed
        .map(NativeValue::Boolean)
        .ok_or_else(|| invalid_value(ValueType::Boolean, raw))
}

fn parse_integer(raw: &Value) -> Result<NativeValue> {
    let parsed = match raw {
        Value::Number(n) => n.as_i64().or_else(|| {
            // 二进制快照会把整数编码为浮点数
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    };
    parsed
        .map(NativeValue::Integer)
        .ok_or_else(|| invalid_value(ValueType::Integer, raw))
}

fn parse_float(raw: &Value) -> Result<NativeValue> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed
        .map(NativeValue::Float)
        .ok_or_else(|| invalid_value(ValueType::Float, raw))
}
