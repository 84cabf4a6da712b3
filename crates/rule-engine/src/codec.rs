//! 结构编解码
//!
//! 在组件对象图与嵌套映射结构之间转换，并定义规范化形式上的内容相等。
//!
//! 结构形状：
//! - 叶子条件 `{"condition": {"metadata", "variable", "operator", "value"}}`
//! - 组合条件 `{"and": [..], "metadata": {..}}` / `{"or": [..], "metadata": {..}}`
//! - 结果 `{"result": {key: {"type", "value"}}}`
//! - 规则 `{"metadata", "if", "then", "else"}`

use crate::condition::{CompositeCondition, Condition, ConditionNode};
use crate::error::{Result, RuleError};
use crate::factory::ComponentFactory;
use crate::models::{Action, ComponentKind, Metadata, Rule, RuleHead, SCHEMA_VERSION};
use crate::operators::{LogicalOperator, Operator};
use crate::result::RuleResult;
use crate::validator::RuleValidator;
use crate::value::{DATETIME_FORMAT, ValueDescriptor};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rules_shared::config::EngineSettings;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// 解析器配置
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// 新生成元数据写入的版本，严格模式下也是比较的基准
    pub schema_version: String,
    /// 元数据版本与 `schema_version` 不一致时返回 `VersionMismatch`
    pub strict_version: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            strict_version: false,
        }
    }
}

impl From<&EngineSettings> for ParserConfig {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            schema_version: settings.schema_version.clone(),
            strict_version: settings.strict_version,
        }
    }
}

/// 解析出的任意组件
#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    Condition(ConditionNode),
    Result(RuleResult),
    Rule(Rule),
}

// ============================================================================
// 序列化
// ============================================================================

/// 将规则序列化为结构；根规则隐藏元数据时整棵树都不输出元数据块
pub fn serialize(rule: &Rule) -> Result<Value> {
    rule_to_structure(rule, !rule.hide_metadata())
}

fn rule_to_structure(rule: &Rule, with_metadata: bool) -> Result<Value> {
    let condition = rule.condition();

    let mut map = Map::new();
    if with_metadata {
        let mut metadata = metadata_to_structure(rule.metadata(), rule.required_params());
        metadata.insert("name".to_string(), Value::String(rule.name().to_string()));
        metadata.insert(
            "parent_id".to_string(),
            rule.parent_id()
                .map_or(Value::Null, |id| Value::String(id.to_string())),
        );
        map.insert("metadata".to_string(), Value::Object(metadata));
    }
    map.insert("if".to_string(), condition_to_structure(condition, with_metadata));
    map.insert("then".to_string(), action_to_structure(rule.then_branch(), with_metadata)?);
    map.insert("else".to_string(), action_to_structure(rule.else_branch(), with_metadata)?);

    Ok(Value::Object(map))
}

fn metadata_to_structure(metadata: &Metadata, required: &BTreeSet<String>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("version".to_string(), Value::String(metadata.version.clone()));
    map.insert("type".to_string(), Value::String(metadata.kind.to_string()));
    map.insert("id".to_string(), Value::String(metadata.id.clone()));
    map.insert("created".to_string(), Value::String(format_created(&metadata.created)));
    map.insert(
        "required_context_parameters".to_string(),
        Value::Array(required.iter().cloned().map(Value::String).collect()),
    );
    map
}

fn condition_to_structure(node: &ConditionNode, with_metadata: bool) -> Value {
    let mut map = Map::new();
    match node {
        ConditionNode::Condition(cond) => {
            let mut body = Map::new();
            if with_metadata {
                let required = BTreeSet::from([cond.variable().to_string()]);
                body.insert(
                    "metadata".to_string(),
                    Value::Object(metadata_to_structure(cond.metadata(), &required)),
                );
            }
            body.insert("variable".to_string(), Value::String(cond.variable().to_string()));
            body.insert("operator".to_string(), Value::String(cond.operator().to_string()));
            body.insert("value".to_string(), cond.value().to_structure());
            map.insert("condition".to_string(), Value::Object(body));
        }
        ConditionNode::Composite(group) => {
            let children = group
                .children()
                .iter()
                .map(|child| condition_to_structure(child, with_metadata))
                .collect();
            map.insert(group.operator().key().to_string(), Value::Array(children));
            if with_metadata {
                map.insert(
                    "metadata".to_string(),
                    Value::Object(metadata_to_structure(group.metadata(), group.required_params())),
                );
            }
        }
    }
    Value::Object(map)
}

fn result_to_structure(result: &RuleResult) -> Value {
    let entries = result
        .entries()
        .map(|(key, descriptor)| (key.to_string(), descriptor.to_structure()))
        .collect::<Map<String, Value>>();

    let mut map = Map::new();
    map.insert("result".to_string(), Value::Object(entries));
    Value::Object(map)
}

fn action_to_structure(action: Option<&Action>, with_metadata: bool) -> Result<Value> {
    match action {
        None => Ok(Value::Null),
        Some(Action::Result(result)) => Ok(result_to_structure(result)),
        Some(Action::Rule(rule)) => rule_to_structure(rule, with_metadata),
    }
}

/// 创建时间统一输出为 UTC、微秒精度的 RFC 3339 文本
fn format_created(created: &DateTime<Utc>) -> String {
    created.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_created(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // 不带时区的文本按 UTC 处理
    ["%Y-%m-%d %H:%M:%S%.f", DATETIME_FORMAT]
        .into_iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

// ============================================================================
// 解析
// ============================================================================

/// 规则解析器
///
/// 元数据存在时恢复标识、创建时间与必需参数；缺失时（例如隐藏元数据导出的结构）
/// 由组件工厂重新生成。
#[derive(Debug)]
pub struct RuleParser {
    config: ParserConfig,
    factory: ComponentFactory,
    rule_counter: AtomicUsize,
}

impl Default for RuleParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

impl RuleParser {
    pub fn new(config: ParserConfig) -> Self {
        let factory = ComponentFactory::default().with_version(config.schema_version.clone());
        Self::with_factory(config, factory)
    }

    /// 指定组件工厂（确定性的标识与时钟）
    pub fn with_factory(config: ParserConfig, factory: ComponentFactory) -> Self {
        Self {
            config,
            factory,
            rule_counter: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// 解析一条规则
    pub fn parse(&self, structure: &Value) -> Result<Rule> {
        RuleValidator::validate(structure)?;
        let mut rule = self.parse_rule(structure)?;
        // 没有元数据块的结构来自隐藏元数据的导出，解析结果保持同样的视图
        if !structure.get("metadata").is_some_and(Value::is_object) {
            rule.set_hide_metadata(true);
        }
        debug!(rule_id = %rule.id(), rule_name = %rule.name(), "规则解析完成");
        Ok(rule)
    }

    /// 按出现的键分派解析任意组件
    pub fn parse_component(&self, structure: &Value) -> Result<Component> {
        let Value::Object(map) = structure else {
            return Err(RuleError::InvalidStructure("组件必须是对象".to_string()));
        };

        if map.contains_key("condition") || map.contains_key("and") || map.contains_key("or") {
            return self.parse_condition(structure).map(Component::Condition);
        }
        if let Some(result) = map.get("result") {
            return Self::parse_result(result).map(Component::Result);
        }
        if map.contains_key("if") {
            return self.parse(structure).map(Component::Rule);
        }

        Err(RuleError::UnknownComponentType(
            map.keys().cloned().collect::<Vec<_>>().join(","),
        ))
    }

    fn parse_rule(&self, data: &Value) -> Result<Rule> {
        let metadata_block = data.get("metadata").filter(|m| m.is_object());
        let metadata = self.restore_metadata(metadata_block, ComponentKind::Rule)?;

        let n = self.rule_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let name = metadata_block
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .map_or_else(|| format!("Unnamed Rule {}", n), str::to_string);
        let parent_id = metadata_block
            .and_then(|m| m.get("parent_id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let condition = match data.get("if") {
            Some(node) if !node.is_null() => self.parse_condition(node)?,
            _ => return Err(RuleError::MissingIfCondition(name)),
        };

        let then_branch = match data.get("then").filter(|a| !a.is_null()) {
            Some(action) => Some(self.parse_action(action)?),
            None => None,
        };
        let else_branch = match data.get("else").filter(|a| !a.is_null()) {
            Some(action) => Some(self.parse_action(action)?),
            None => None,
        };

        let head = RuleHead {
            metadata,
            name,
            parent_id,
        };
        let mut rule = Rule::assemble(head, condition, then_branch, else_branch);
        rule.record_params(required_from_metadata(metadata_block));
        Ok(rule)
    }

    fn parse_action(&self, data: &Value) -> Result<Action> {
        if let Some(result) = data.get("result") {
            return Self::parse_result(result).map(Action::Result);
        }
        if data.get("if").is_some() {
            return self.parse_rule(data).map(Action::from);
        }
        Err(RuleError::UnknownComponentType(data.to_string()))
    }

    fn parse_condition(&self, data: &Value) -> Result<ConditionNode> {
        let metadata_block = data.get("metadata").filter(|m| m.is_object());

        for operator in [LogicalOperator::And, LogicalOperator::Or] {
            if let Some(children) = data.get(operator.key()) {
                let Value::Array(children) = children else {
                    return Err(RuleError::InvalidStructure(format!(
                        "'{}' 必须是数组",
                        operator.key()
                    )));
                };
                let children = children
                    .iter()
                    .map(|child| self.parse_condition(child))
                    .collect::<Result<Vec<_>>>()?;
                let metadata =
                    self.restore_metadata(metadata_block, ComponentKind::composite(operator))?;
                return CompositeCondition::from_parts(metadata, operator, children)
                    .map(ConditionNode::from);
            }
        }

        let Some(body) = data.get("condition") else {
            return Err(RuleError::UnknownComponentType(data.to_string()));
        };

        let variable = body
            .get("variable")
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RuleError::MissingConditionField("variable".to_string()))?;
        let operator: Operator = body
            .get("operator")
            .and_then(Value::as_str)
            .ok_or_else(|| RuleError::MissingConditionField("operator".to_string()))?
            .parse()?;
        let value = body
            .get("value")
            .ok_or_else(|| RuleError::MissingConditionField("value".to_string()))?;
        let value = ValueDescriptor::from_structure(value)?;

        let metadata = self.restore_metadata(
            body.get("metadata").filter(|m| m.is_object()),
            ComponentKind::Condition,
        )?;

        Ok(Condition::from_parts(metadata, variable.to_string(), operator, value).into())
    }

    fn parse_result(data: &Value) -> Result<RuleResult> {
        let Value::Object(entries) = data else {
            return Err(RuleError::InvalidStructure("'result' 必须是对象".to_string()));
        };

        let mut result = RuleResult::new();
        for (key, descriptor) in entries {
            result.insert(key.clone(), ValueDescriptor::from_structure(descriptor)?);
        }
        Ok(result)
    }

    /// 从元数据块恢复，缺失的字段由工厂补全
    fn restore_metadata(&self, block: Option<&Value>, kind: ComponentKind) -> Result<Metadata> {
        let fresh = self.factory.metadata(kind);
        let Some(block) = block else {
            return Ok(fresh);
        };

        if let Some(tag) = block.get("type").and_then(Value::as_str) {
            tag.parse::<ComponentKind>()?;
        }

        let version = match block.get("version").and_then(Value::as_str) {
            Some(version) => version.to_string(),
            None => fresh.version,
        };
        if self.config.strict_version && version != self.config.schema_version {
            warn!(expected = %self.config.schema_version, actual = %version, "结构版本不匹配");
            return Err(RuleError::VersionMismatch {
                expected: self.config.schema_version.clone(),
                actual: version,
            });
        }

        let id = block
            .get("id")
            .and_then(Value::as_str)
            .map_or(fresh.id, str::to_string);

        let created = match block.get("created") {
            Some(Value::String(raw)) => parse_created(raw).ok_or_else(|| {
                RuleError::InvalidStructure(format!("无法解析创建时间: {}", raw))
            })?,
            _ => fresh.created,
        };

        Ok(Metadata {
            version,
            kind,
            id,
            created,
        })
    }
}

fn required_from_metadata(block: Option<&Value>) -> Vec<String> {
    block
        .and_then(|m| m.get("required_context_parameters"))
        .and_then(Value::as_array)
        .map(|params| {
            params
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// 以默认配置解析 JSON 文本
pub fn load_from_json(json: &str) -> Result<Rule> {
    let structure: Value = serde_json::from_str(json)?;
    RuleParser::default().parse(&structure)
}

// ============================================================================
// 规范化与内容相等
// ============================================================================

/// 语义上无序的数组所在的键
const UNORDERED_KEYS: [&str; 3] = ["and", "or", "required_context_parameters"];

/// 规范化结构
///
/// - 映射的键按字典序排列
/// - `and` / `or` / `required_context_parameters` 下的数组按元素的规范文本排序
/// - 不带元数据的同类组合条件被展开到外层
/// - 没有小数部分的浮点数归一为整数
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> = map
                .iter()
                .map(|(key, child)| {
                    let child = match (UNORDERED_KEYS.contains(&key.as_str()), child) {
                        (true, Value::Array(items)) => canonical_set(key, items),
                        _ => canonicalize(child),
                    };
                    (key, child)
                })
                .collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Number(n) => match n.as_f64() {
            Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                Value::from(f as i64)
            }
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}

fn canonical_set(key: &str, items: &[Value]) -> Value {
    let mut flattened = Vec::with_capacity(items.len());
    for item in items {
        let item = canonicalize(item);
        match item {
            Value::Object(ref map) if map.len() == 1 && map.contains_key(key) => {
                if let Some(Value::Array(inner)) = map.get(key) {
                    flattened.extend(inner.iter().cloned());
                }
            }
            other => flattened.push(other),
        }
    }
    flattened.sort_by_cached_key(Value::to_string);
    Value::Array(flattened)
}

/// 比较两个结构的规范化形式
pub fn structures_eq(a: &Value, b: &Value) -> bool {
    canonicalize(a) == canonicalize(b)
}

impl Rule {
    /// 序列化为结构
    pub fn to_structure(&self) -> Result<Value> {
        serialize(self)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&serialize(self)?)?)
    }

    /// 内容相等：两条规则的规范化结构一致
    pub fn content_eq(&self, other: &Rule) -> Result<bool> {
        Ok(structures_eq(&serialize(self)?, &serialize(other)?))
    }
}
