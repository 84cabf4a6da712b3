//! 决策流程测试套件
//!
//! 验证从配置构建的引擎对多层决策树的分派、追踪与错误处理。

use crate::setup::TestEnvironment;
use rule_engine::{
    Condition, Evaluation, EvaluationContext, Operator, Rule, RuleError, RuleResult, ValueType,
};
use serde_json::json;

/// 根据订单金额与会员等级计算运费
pub fn shipping_rule() -> Rule {
    let member = Rule::new("member_shipping")
        .if_condition(Condition::new("tier", Operator::In, vec!["gold", "platinum"]))
        .then_action(
            RuleResult::new()
                .add("fee", ValueType::Float, 0.0)
                .variable("tier", "tier"),
        )
        .else_action(RuleResult::new().add("fee", ValueType::Float, 12.5));

    Rule::new("shipping")
        .if_condition(
            Condition::new("amount", Operator::Gte, 200)
                & Condition::new("country", Operator::NotIn, vec!["XX"]),
        )
        .then_action(RuleResult::new().add("fee", ValueType::Float, 0.0))
        .else_action(member)
}

fn order(amount: i64, tier: &str) -> EvaluationContext {
    EvaluationContext::new()
        .with("amount", amount)
        .with("country", "DE")
        .with("tier", tier)
}

#[test]
fn test_configured_engine_dispatch() {
    let env = TestEnvironment::new("json").unwrap();
    let engine = env.engine();
    assert!(engine.config().trace);
    assert!(engine.config().expected_version.is_some());

    let rule = shipping_rule();

    let free = engine.evaluate(&rule, &order(500, "basic")).unwrap();
    assert_eq!(free.to_json(), json!({"fee": 0.0}));

    let member = engine.evaluate(&rule, &order(50, "gold")).unwrap();
    assert_eq!(member.to_json(), json!({"fee": 0.0, "tier": "gold"}));

    let paid = engine.evaluate(&rule, &order(50, "basic")).unwrap();
    assert_eq!(paid.to_json(), json!({"fee": 12.5}));
}

#[test]
fn test_execution_report() {
    let env = TestEnvironment::new("json").unwrap();
    let rule = shipping_rule();

    let report = env.engine().execute(&rule, &order(50, "gold")).unwrap();
    assert_eq!(report.rule_id, rule.id());
    assert_eq!(report.dispatch_path.len(), 2);
    assert!(!report.evaluation_trace.is_empty());
    assert!(matches!(report.outcome, Evaluation::Result(_)));
}

#[test]
fn test_missing_parameter_is_reported() {
    let env = TestEnvironment::new("json").unwrap();
    let ctx = EvaluationContext::new().with("amount", 10).with("country", "DE");

    let err = env.engine().evaluate(&shipping_rule(), &ctx).unwrap_err();
    assert!(matches!(err, RuleError::MissingContextParameter(name) if name == "tier"));
}
