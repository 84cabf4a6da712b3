//! 规则引擎
//!
//! 求值分三步：先确认根规则带有 if 条件，再一次性校验上下文是否包含全部必需参数，
//! 最后沿 then / else 分支逐层派发。嵌套规则以循环而非递归派发，链的深度不受栈限制。

use crate::condition::{CompositeCondition, Condition, ConditionNode};
use crate::context::EvaluationContext;
use crate::error::{Result, RuleError};
use crate::models::{Action, Evaluation, Rule};
use crate::operators::LogicalOperator;
use rules_shared::config::EngineSettings;
use rules_shared::observability::metrics::record_rule_evaluation;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, debug_span, warn};

/// 引擎配置
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// 设置后，派发到的每条规则的元数据版本必须与之一致
    pub expected_version: Option<String>,
    /// 是否记录评估追踪
    pub trace: bool,
}

impl From<&EngineSettings> for EngineConfig {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            expected_version: settings
                .strict_version
                .then(|| settings.schema_version.clone()),
            trace: settings.trace,
        }
    }
}

/// 评估报告
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub outcome: Evaluation,
    pub rule_id: String,
    pub rule_name: String,
    /// 依次访问到的规则标识，首个为根规则
    pub dispatch_path: Vec<String>,
    pub evaluation_trace: Vec<String>,
    pub evaluation_time_ms: i64,
}

/// 规则引擎，不持有跨调用的状态
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    config: EngineConfig,
}

struct Trace {
    enabled: bool,
    lines: Vec<String>,
}

impl Trace {
    fn push(&mut self, line: impl FnOnce() -> String) {
        if self.enabled {
            self.lines.push(line());
        }
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self { config }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.config.trace = true;
        self
    }

    /// 严格版本模式
    pub fn with_expected_version(mut self, version: impl Into<String>) -> Self {
        self.config.expected_version = Some(version.into());
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 对规则求值
    pub fn evaluate(&self, rule: &Rule, context: &EvaluationContext) -> Result<Evaluation> {
        self.execute(rule, context).map(|report| report.outcome)
    }

    /// 以 JSON 值作为上下文求值，非对象时返回 `InvalidContext`
    pub fn evaluate_value(&self, rule: &Rule, context: Value) -> Result<Evaluation> {
        let context = EvaluationContext::from_value(context)?;
        self.evaluate(rule, &context)
    }

    /// 求值并返回带派发路径与追踪信息的报告
    pub fn execute(&self, rule: &Rule, context: &EvaluationContext) -> Result<EvaluationReport> {
        let start = Instant::now();
        let span = debug_span!("evaluate_rule", rule_id = %rule.id(), rule_name = %rule.name());
        let _guard = span.enter();

        let result = self.run(rule, context);
        let elapsed = start.elapsed();

        let outcome = match &result {
            Ok((Evaluation::Verdict(true), ..)) => "matched",
            Ok((Evaluation::Verdict(false), ..)) => "not_matched",
            Ok((Evaluation::Result(_), ..)) => "result",
            Err(_) => "error",
        };
        record_rule_evaluation(outcome, elapsed.as_secs_f64());

        let (outcome, dispatch_path, evaluation_trace) = result?;
        debug!(outcome = %outcome, depth = dispatch_path.len(), "规则评估完成");

        Ok(EvaluationReport {
            outcome,
            rule_id: rule.id().to_string(),
            rule_name: rule.name().to_string(),
            dispatch_path,
            evaluation_trace,
            evaluation_time_ms: elapsed.as_millis() as i64,
        })
    }

    fn run(
        &self,
        rule: &Rule,
        context: &EvaluationContext,
    ) -> Result<(Evaluation, Vec<String>, Vec<String>)> {
        if let Some(missing) = context.first_missing(rule.required_params()) {
            warn!(rule_id = %rule.id(), parameter = missing, "上下文缺少必需参数");
            return Err(RuleError::MissingContextParameter(missing.to_string()));
        }

        let mut trace = Trace {
            enabled: self.config.trace,
            lines: Vec::new(),
        };
        let mut dispatch_path = vec![rule.id().to_string()];
        let mut current = rule;

        loop {
            self.check_version(current)?;
            let condition = current.condition();

            let path = format!("{}.if", current.name());
            let verdict = Self::evaluate_node(condition, context, &mut trace, &path)?;
            debug!(rule_id = %current.id(), verdict, "条件求值完成");

            let (label, branch) = if verdict {
                ("then", current.then_branch())
            } else {
                ("else", current.else_branch())
            };

            match branch {
                Some(Action::Rule(nested)) => {
                    trace.push(|| format!("{}: 派发到 {} 分支的规则 {}", current.name(), label, nested.name()));
                    debug!(from = %current.id(), to = %nested.id(), branch = label, "派发嵌套规则");
                    dispatch_path.push(nested.id().to_string());
                    current = &**nested;
                }
                // 空结果集合没有可输出的内容，退化为分支对应的判定值
                Some(Action::Result(result)) if result.is_empty() => {
                    trace.push(|| format!("{}: {} 分支结果为空, 返回 {}", current.name(), label, verdict));
                    return Ok((Evaluation::Verdict(verdict), dispatch_path, trace.lines));
                }
                Some(Action::Result(result)) => {
                    trace.push(|| format!("{}: 物化 {} 分支结果 ({} 项)", current.name(), label, result.len()));
                    let output = result.materialize(context);
                    return Ok((Evaluation::Result(output), dispatch_path, trace.lines));
                }
                None => {
                    trace.push(|| format!("{}: {} 分支为空, 返回 {}", current.name(), label, verdict));
                    return Ok((Evaluation::Verdict(verdict), dispatch_path, trace.lines));
                }
            }
        }
    }

    fn check_version(&self, rule: &Rule) -> Result<()> {
        match &self.config.expected_version {
            Some(expected) if *expected != rule.metadata().version => {
                warn!(rule_id = %rule.id(), expected = %expected, actual = %rule.metadata().version, "规则版本不匹配");
                Err(RuleError::VersionMismatch {
                    expected: expected.clone(),
                    actual: rule.metadata().version.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// 递归评估条件节点
    fn evaluate_node(
        node: &ConditionNode,
        context: &EvaluationContext,
        trace: &mut Trace,
        path: &str,
    ) -> Result<bool> {
        match node {
            ConditionNode::Condition(cond) => Self::evaluate_condition(cond, context, trace, path),
            ConditionNode::Composite(group) => Self::evaluate_group(group, context, trace, path),
        }
    }

    fn evaluate_condition(
        cond: &Condition,
        context: &EvaluationContext,
        trace: &mut Trace,
        path: &str,
    ) -> Result<bool> {
        let matched = cond.evaluate(context)?;

        trace.push(|| {
            format!(
                "{}: {} {} {} => {}",
                path,
                cond.variable(),
                cond.operator(),
                cond.value().raw(),
                if matched { "MATCHED" } else { "NOT_MATCHED" }
            )
        });

        Ok(matched)
    }

    /// 评估逻辑组节点（短路求值）
    fn evaluate_group(
        group: &CompositeCondition,
        context: &EvaluationContext,
        trace: &mut Trace,
        path: &str,
    ) -> Result<bool> {
        trace.push(|| {
            format!(
                "{}: 开始评估 {} 组 (共 {} 个子节点)",
                path,
                group.operator(),
                group.children().len()
            )
        });

        // AND 遇到 false 即停止，OR 遇到 true 即停止
        let stop_on = group.operator() == LogicalOperator::Or;
        for (i, child) in group.children().iter().enumerate() {
            let child_path = format!("{}.children[{}]", path, i);
            if Self::evaluate_node(child, context, trace, &child_path)? == stop_on {
                trace.push(|| format!("{}: {} 短路 - 子节点 {}", path, group.operator(), i));
                return Ok(stop_on);
            }
        }

        Ok(!stop_on)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::Operator;
    use crate::result::RuleResult;
    use crate::value::{NativeValue, ValueType};
    use serde_json::json;

    fn number_context(n: i64) -> EvaluationContext {
        EvaluationContext::new().with("number", n)
    }

    #[test]
    fn test_then_result_is_materialized() {
        let rule = Rule::new("then")
            .if_condition(Condition::new("number", Operator::Eq, 5))
            .then_action(RuleResult::new().add("xyz", ValueType::String, "met"))
            .build();

        let outcome = RuleEngine::new().evaluate(&rule, &number_context(5)).unwrap();
        let Evaluation::Result(map) = outcome else {
            panic!("expected result");
        };
        assert_eq!(map["xyz"], NativeValue::from("met"));

        // 条件不满足且没有 else
        let outcome = RuleEngine::new().evaluate(&rule, &number_context(4)).unwrap();
        assert_eq!(outcome, Evaluation::Verdict(false));
    }

    #[test]
    fn test_without_branches_returns_verdict() {
        let rule = Rule::new("bare")
            .if_condition(Condition::new("number", Operator::Eq, 5))
            .build();
        let engine = RuleEngine::new();
        assert_eq!(engine.evaluate(&rule, &number_context(5)).unwrap(), Evaluation::Verdict(true));
        assert_eq!(engine.evaluate(&rule, &number_context(6)).unwrap(), Evaluation::Verdict(false));
    }

    #[test]
    fn test_else_rule_dispatch() {
        let fallback = Rule::new("fallback")
            .if_condition(Condition::new("number", Operator::Gt, 1))
            .then_action(RuleResult::new().add("k", ValueType::String, "v"))
            .build();
        let rule = Rule::new("primary")
            .if_condition(Condition::new("number", Operator::Eq, 100))
            .else_action(fallback);

        let report = RuleEngine::new().execute(&rule, &number_context(5)).unwrap();
        assert_eq!(report.outcome.to_json(), json!({"k": "v"}));
        assert_eq!(report.dispatch_path.len(), 2);
        assert_eq!(report.dispatch_path[0], rule.id());
    }

    #[test]
    fn test_missing_parameter_fails_before_evaluation() {
        let rule = Rule::new("needs number")
            .if_condition(Condition::new("number", Operator::Eq, 5))
            .build();
        let err = RuleEngine::new()
            .evaluate(&rule, &EvaluationContext::new())
            .unwrap_err();
        assert!(matches!(err, RuleError::MissingContextParameter(name) if name == "number"));
    }

    #[test]
    fn test_empty_result_falls_back_to_verdict() {
        let rule = Rule::new("empty")
            .if_condition(Condition::new("number", Operator::Eq, 5))
            .then_action(RuleResult::new())
            .else_action(RuleResult::new());

        let report = RuleEngine::new()
            .with_trace()
            .execute(&rule, &number_context(5))
            .unwrap();
        assert_eq!(report.outcome, Evaluation::Verdict(true));
        assert!(report.evaluation_trace.iter().any(|t| t.contains("结果为空")));

        let outcome = RuleEngine::new().evaluate(&rule, &number_context(4)).unwrap();
        assert_eq!(outcome, Evaluation::Verdict(false));
    }

    #[test]
    fn test_non_object_context() {
        let rule = Rule::new("r")
            .if_condition(Condition::new("number", Operator::Eq, 5))
            .build();
        let err = RuleEngine::new().evaluate_value(&rule, json!([5])).unwrap_err();
        assert_eq!(err.code(), "INVALID_CONTEXT");
    }

    #[test]
    fn test_strict_version() {
        let rule = Rule::new("r")
            .if_condition(Condition::new("number", Operator::Eq, 5))
            .build();
        let err = RuleEngine::new()
            .with_expected_version("0.0.0-other")
            .evaluate(&rule, &number_context(5))
            .unwrap_err();
        assert!(matches!(err, RuleError::VersionMismatch { .. }));

        let engine = RuleEngine::new().with_expected_version(rule.metadata().version.clone());
        assert!(engine.evaluate(&rule, &number_context(5)).is_ok());
    }

    #[test]
    fn test_trace_records_short_circuit() {
        let rule = Rule::new("traced")
            .if_condition(
                Condition::new("number", Operator::Eq, 1) & Condition::new("number", Operator::Gt, 0),
            )
            .build();

        let report = RuleEngine::new()
            .with_trace()
            .execute(&rule, &number_context(5))
            .unwrap();
        assert_eq!(report.outcome, Evaluation::Verdict(false));
        assert!(report.evaluation_trace.iter().any(|t| t.contains("短路")));

        let report = RuleEngine::new().execute(&rule, &number_context(5)).unwrap();
        assert!(report.evaluation_trace.is_empty());
    }

    #[test]
    fn test_config_from_settings() {
        let settings = EngineSettings {
            schema_version: "2.0.0".to_string(),
            strict_version: true,
            trace: false,
        };
        let config = EngineConfig::from(&settings);
        assert_eq!(config.expected_version.as_deref(), Some("2.0.0"));

        let lenient = EngineSettings {
            strict_version: false,
            ..settings
        };
        assert_eq!(EngineConfig::from(&lenient).expected_version, None);
    }

    #[test]
    fn test_strict_default_settings_accept_built_rules() {
        let settings = EngineSettings {
            strict_version: true,
            ..EngineSettings::default()
        };
        let engine = RuleEngine::with_config(EngineConfig::from(&settings));
        let rule = Rule::new("versioned")
            .if_condition(Condition::new("number", Operator::Eq, 5))
            .build();

        assert_eq!(rule.metadata().version, settings.schema_version);
        assert_eq!(engine.evaluate(&rule, &number_context(5)).unwrap(), Evaluation::Verdict(true));
    }
}
